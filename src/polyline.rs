//! Decoder for the encoded polyline format used by the directions provider
//! for `overview_polyline`.

use thiserror::Error;

use crate::models::LatLng;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolylineError {
    #[error("invalid character {0:?} at byte {1}")]
    InvalidCharacter(char, usize),
    #[error("polyline ends in the middle of a coordinate")]
    Truncated,
}

/// Decode an encoded polyline with 5 decimal digits of precision
pub fn decode(encoded: &str) -> Result<Vec<LatLng>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        lat += next_delta(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(PolylineError::Truncated);
        }
        lng += next_delta(bytes, &mut index)?;
        points.push(LatLng::new(lat as f64 / 1e5, lng as f64 / 1e5));
    }

    Ok(points)
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*index).ok_or(PolylineError::Truncated)?;
        if !(63..127).contains(&byte) || shift > 60 {
            return Err(PolylineError::InvalidCharacter(byte as char, *index));
        }
        *index += 1;
        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}
