//! Speech session manager
//!
//! At most one utterance is active at a time. Starting a new one cancels the
//! previous utterance first, and every transition is published as a
//! [`SpeechEvent`] so the ordering can be observed.
//!
//! A session without a backend is valid: the platform has no speech support,
//! [`SpeechSession::is_supported`] is false and every call is a no-op.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::error::AccessNavError;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

const EVENT_CAPACITY: usize = 64;

/// A voice offered by the speech backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceDescriptor {
    /// Stable identifier, stored as the preferred voice
    pub uri: String,
    pub display_name: String,
    pub language: String,
}

/// Platform speech capability
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn voices(&self) -> Result<Vec<VoiceDescriptor>, AccessNavError>;

    /// Speak `text`, resolving when the utterance ends. Dropping the future
    /// must silence the utterance.
    async fn utter(&self, text: &str, voice: Option<&VoiceDescriptor>)
    -> Result<(), AccessNavError>;
}

/// Lifecycle of one utterance, identified by its id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEvent {
    Started(u64),
    Finished(u64),
    Cancelled(u64),
    Failed(u64),
}

struct ActiveUtterance {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct SpeechSession {
    backend: Option<Arc<dyn SpeechBackend>>,
    voices: Arc<watch::Sender<Arc<Vec<VoiceDescriptor>>>>,
    speaking: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<SpeechEvent>,
    active: Arc<Mutex<Option<ActiveUtterance>>>,
    next_id: AtomicU64,
    voice_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechSession {
    pub fn new(backend: Option<Arc<dyn SpeechBackend>>) -> Self {
        let (voices, _) = watch::channel(Arc::new(Vec::new()));
        let (speaking, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        if backend.is_none() {
            info!("Speech synthesis not available, audio directions disabled");
        }

        Self {
            backend,
            voices: Arc::new(voices),
            speaking: Arc::new(speaking),
            events,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
            voice_refresh: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.backend.is_some()
    }

    /// Like [`Self::is_supported`], as an error callers can report
    pub fn ensure_supported(&self) -> Result<(), AccessNavError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(AccessNavError::CapabilityUnsupported {
                capability: "Speech synthesis",
            })
        }
    }

    /// Enumerate voices in the background; watch [`Self::subscribe_voices`]
    /// for the result.
    pub fn spawn_voice_refresh(&self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let voices = Arc::clone(&self.voices);

        let handle = tokio::spawn(async move {
            match backend.voices().await {
                Ok(list) => {
                    debug!("Loaded {} speech voices", list.len());
                    voices.send_replace(Arc::new(list));
                }
                Err(e) => warn!("Failed to list speech voices: {}", e),
            }
        });

        if let Some(previous) = lock(&self.voice_refresh).replace(handle) {
            previous.abort();
        }
    }

    /// Current voice list; empty until enumeration completes
    #[must_use]
    pub fn voices(&self) -> Arc<Vec<VoiceDescriptor>> {
        self.voices.borrow().clone()
    }

    pub fn subscribe_voices(&self) -> watch::Receiver<Arc<Vec<VoiceDescriptor>>> {
        self.voices.subscribe()
    }

    #[must_use]
    pub fn find_voice(&self, uri: &str) -> Option<VoiceDescriptor> {
        self.voices.borrow().iter().find(|v| v.uri == uri).cloned()
    }

    /// Speak `text` with markup removed.
    ///
    /// Returns the utterance id, or `None` when nothing was started because
    /// speech is unsupported or the text is empty.
    pub fn speak(&self, text: &str, voice_uri: Option<&str>) -> Option<u64> {
        let backend = self.backend.clone()?;

        let plain = strip_markup(text);
        if plain.is_empty() {
            debug!("Nothing to speak after stripping markup");
            return None;
        }

        let voice = voice_uri.and_then(|uri| {
            let found = self.find_voice(uri);
            if found.is_none() {
                debug!("Voice {} not available, using default", uri);
            }
            found
        });

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        // Cancel and replace under one guard so no utterance is left running
        let mut active = lock(&self.active);
        self.cancel(&mut active);

        self.speaking.send_replace(true);
        let _ = self.events.send(SpeechEvent::Started(id));

        let slot = Arc::clone(&self.active);
        let speaking = Arc::clone(&self.speaking);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let result = backend.utter(&plain, voice.as_ref()).await;

            let mut active = lock(&slot);
            // A newer utterance owns the flag now
            if active.as_ref().is_none_or(|a| a.id != id) {
                return;
            }
            active.take();
            speaking.send_replace(false);

            let event = match result {
                Ok(()) => SpeechEvent::Finished(id),
                Err(e) => {
                    warn!("Speech synthesis error: {}", e);
                    SpeechEvent::Failed(id)
                }
            };
            let _ = events.send(event);
        });

        *active = Some(ActiveUtterance { id, handle });
        Some(id)
    }

    /// Cancel the active utterance; no-op when idle
    pub fn stop(&self) {
        self.cancel(&mut lock(&self.active));
    }

    fn cancel(&self, slot: &mut Option<ActiveUtterance>) {
        if let Some(active) = slot.take() {
            active.handle.abort();
            self.speaking.send_replace(false);
            let _ = self.events.send(SpeechEvent::Cancelled(active.id));
            debug!("Cancelled utterance {}", active.id);
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    pub fn subscribe_speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = lock(&self.voice_refresh).take() {
            handle.abort();
        }
    }
}

/// Remove tags, decode common entities and collapse whitespace
#[must_use]
pub fn strip_markup(text: &str) -> String {
    let without_tags = TAG_PATTERN.replace_all(text, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    WHITESPACE_PATTERN
        .replace_all(decoded.trim(), " ")
        .into_owned()
}

/// Speech through an external synthesizer command such as `espeak-ng`
pub struct CommandSpeechBackend {
    command: String,
    rate: u32,
}

impl CommandSpeechBackend {
    /// Check that the command runs; `None` means speech is unavailable
    pub async fn probe(config: &SpeechConfig) -> Option<Self> {
        let output = Command::new(&config.command)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                info!("Using speech command {}", config.command);
                Some(Self {
                    command: config.command.clone(),
                    rate: config.rate,
                })
            }
            Ok(output) => {
                info!(
                    "Speech command {} exited with {}, speech disabled",
                    config.command, output.status
                );
                None
            }
            Err(e) => {
                info!("Speech command {} not found ({}), speech disabled", config.command, e);
                None
            }
        }
    }
}

#[async_trait]
impl SpeechBackend for CommandSpeechBackend {
    async fn voices(&self) -> Result<Vec<VoiceDescriptor>, AccessNavError> {
        let output = Command::new(&self.command)
            .arg("--voices")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "{} --voices exited with {}",
                self.command, output.status
            ))
            .into());
        }

        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn utter(
        &self,
        text: &str,
        voice: Option<&VoiceDescriptor>,
    ) -> Result<(), AccessNavError> {
        let mut command = Command::new(&self.command);
        command
            .arg("-s")
            .arg(self.rate.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(voice) = voice {
            command.arg("-v").arg(&voice.uri);
        }
        command.arg("--").arg(text);

        let output = command.output().await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(std::io::Error::other(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ))
            .into())
        }
    }
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US            (en 2)
/// ```
fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(VoiceDescriptor {
                uri: language.to_string(),
                display_name: name.replace('_', " "),
                language: language.to_string(),
            })
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use super::*;

    /// Backend that records what it was asked to say
    pub(crate) struct RecordingBackend {
        pub(crate) delay: Duration,
        pub(crate) spoken: Mutex<Vec<(String, Option<String>)>>,
        pub(crate) fail: bool,
    }

    impl RecordingBackend {
        pub(crate) fn new(delay: Duration) -> Self {
            Self {
                delay,
                spoken: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        pub(crate) fn spoken(&self) -> Vec<(String, Option<String>)> {
            lock(&self.spoken).clone()
        }
    }

    #[async_trait]
    impl SpeechBackend for RecordingBackend {
        async fn voices(&self) -> Result<Vec<VoiceDescriptor>, AccessNavError> {
            Ok(vec![
                VoiceDescriptor {
                    uri: "en-us".to_string(),
                    display_name: "English (America)".to_string(),
                    language: "en-us".to_string(),
                },
                VoiceDescriptor {
                    uri: "yo".to_string(),
                    display_name: "Yoruba".to_string(),
                    language: "yo".to_string(),
                },
            ])
        }

        async fn utter(
            &self,
            text: &str,
            voice: Option<&VoiceDescriptor>,
        ) -> Result<(), AccessNavError> {
            lock(&self.spoken).push((text.to_string(), voice.map(|v| v.uri.clone())));
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(std::io::Error::other("synthesizer crashed").into())
            } else {
                Ok(())
            }
        }
    }
}
