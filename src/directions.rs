//! Turn-by-turn presentation of the active route
//!
//! Only the first leg of the first route is presented.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::models::{Leg, RouteResponse, Step};
use crate::speech::{SpeechSession, strip_markup};

const MISSING_INSTRUCTION_HTML: &str = "<i>Instruction not available.</i>";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionsSummary {
    pub start_address: Option<String>,
    pub end_address: Option<String>,
    pub distance_text: String,
    pub duration_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepItem {
    pub index: usize,
    pub instruction_html: String,
    pub plain_text: String,
    pub distance_text: Option<String>,
    /// Accessible label, `"Step N: text. Distance: d"`
    pub label: String,
}

impl StepItem {
    fn new(index: usize, step: &Step) -> Self {
        let instruction_html = if step.html_instructions.trim().is_empty() {
            MISSING_INSTRUCTION_HTML.to_string()
        } else {
            step.html_instructions.clone()
        };
        let plain_text = strip_markup(&instruction_html);
        let distance_text = step
            .distance
            .as_ref()
            .map(|d| d.text.clone())
            .filter(|t| !t.is_empty());
        let label = format!(
            "Step {}: {}. Distance: {}",
            index + 1,
            plain_text.strip_suffix('.').unwrap_or(&plain_text),
            distance_text.as_deref().unwrap_or_default()
        );

        Self {
            index,
            instruction_html,
            plain_text,
            distance_text,
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DirectionsView {
    /// No route, or a route without legs or steps
    Unavailable,
    Steps {
        summary: DirectionsSummary,
        steps: Vec<StepItem>,
    },
}

impl DirectionsView {
    #[must_use]
    pub fn from_route(route: Option<&RouteResponse>) -> Self {
        let Some(leg) = route.and_then(RouteResponse::first_leg) else {
            return Self::Unavailable;
        };
        if leg.steps.is_empty() {
            return Self::Unavailable;
        }

        Self::Steps {
            summary: summarize(leg),
            steps: leg
                .steps
                .iter()
                .enumerate()
                .map(|(i, step)| StepItem::new(i, step))
                .collect(),
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[StepItem] {
        match self {
            Self::Unavailable => &[],
            Self::Steps { steps, .. } => steps,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Steps { .. })
    }
}

fn summarize(leg: &Leg) -> DirectionsSummary {
    let text = |value: &Option<crate::models::TextValue>| {
        value
            .as_ref()
            .map(|v| v.text.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };
    DirectionsSummary {
        start_address: leg.start_address.clone(),
        end_address: leg.end_address.clone(),
        distance_text: text(&leg.distance),
        duration_text: text(&leg.duration),
    }
}

/// Tracks the selected step of the active route and speaks it on demand
pub struct DirectionsPresenter {
    speech: Arc<SpeechSession>,
    voice_uri: Option<String>,
    route: Option<Arc<RouteResponse>>,
    view: DirectionsView,
    current: Option<usize>,
}

impl DirectionsPresenter {
    pub fn new(speech: Arc<SpeechSession>, voice_uri: Option<String>) -> Self {
        Self {
            speech,
            voice_uri,
            route: None,
            view: DirectionsView::Unavailable,
            current: None,
        }
    }

    pub fn set_voice(&mut self, voice_uri: Option<String>) {
        self.voice_uri = voice_uri;
    }

    /// Adopt `route` if its identity changed: speech stops and the first
    /// step becomes current. Returns whether the route changed.
    pub fn set_route(&mut self, route: Option<&Arc<RouteResponse>>) -> bool {
        let same = match (&self.route, route) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same {
            return false;
        }

        self.speech.stop();
        self.route = route.cloned();
        self.view = DirectionsView::from_route(route.map(|r| &**r));
        self.current = (!self.view.steps().is_empty()).then_some(0);
        debug!("Directions updated with {} steps", self.view.steps().len());
        true
    }

    #[must_use]
    pub fn view(&self) -> &DirectionsView {
        &self.view
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&StepItem> {
        self.view.steps().get(self.current?)
    }

    /// Make step `index` current, speaking it when `speak` is set.
    ///
    /// Out-of-range indices change nothing and return `None`.
    pub fn select_step(&mut self, index: usize, speak: bool) -> Option<&StepItem> {
        self.view.steps().get(index)?;

        if self.current != Some(index) {
            self.speech.stop();
            self.current = Some(index);
        }
        if speak {
            self.play_current();
        }
        self.current_step()
    }

    /// Speak the current step; returns the utterance id when speech started
    pub fn play_current(&self) -> Option<u64> {
        let step = self.current_step()?;
        self.speech.speak(&step.plain_text, self.voice_uri.as_deref())
    }

    pub fn stop(&self) {
        self.speech.stop();
    }
}

impl Drop for DirectionsPresenter {
    fn drop(&mut self) {
        self.speech.stop();
    }
}
