/// Result alias that carries the custom [`SightReadError`] type.
pub type Result<T> = std::result::Result<T, SightReadError>;

/// Common error type for the core crate.
///
/// Variants fall into three families: fatal session-start failures
/// ([`CaptureUnavailable`](Self::CaptureUnavailable),
/// [`AudioInit`](Self::AudioInit)), recoverable transients
/// ([`MelodyFetch`](Self::MelodyFetch)), and content errors for malformed
/// melody data ([`InvalidPitch`](Self::InvalidPitch),
/// [`InvalidDuration`](Self::InvalidDuration)). The scheduling and scoring
/// loops never abort on a content error — the offending note is rejected and
/// the loop continues on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum SightReadError {
    /// Microphone capture could not be acquired, e.g. permission was denied.
    /// Fatal: the session cannot start without input audio.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),
    /// The audio backend failed to initialize. Fatal at session start.
    #[error("audio backend failed to initialize: {0}")]
    AudioInit(String),
    /// A melody request failed. Recoverable: scheduling stalls at the
    /// buffered end of the timeline until a retry succeeds.
    #[error("melody fetch failed: {0}")]
    MelodyFetch(String),
    /// A pitch string the engine does not recognize, e.g. "H4" or "C##".
    #[error("invalid pitch {0:?}")]
    InvalidPitch(String),
    /// A duration symbol the engine does not recognize.
    #[error("invalid duration symbol {0:?}")]
    InvalidDuration(String),
    /// Session parameters failed validation before the engine started.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A shared-state lock was poisoned by a panicking tick.
    #[error("{0} lock has been poisoned")]
    Poisoned(&'static str),
    /// Wrapper around JSON decoding failures of melody payloads.
    #[error("malformed melody payload: {0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl SightReadError {
    /// Returns true when the session cannot continue past this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CaptureUnavailable(_) | Self::AudioInit(_) | Self::Poisoned(_)
        )
    }
}
