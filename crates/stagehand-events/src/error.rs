use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventsError {
    /// Registering a hook under a name the registry already holds.
    #[error("Hook already registered: {name}")]
    DuplicateHook { name: String },

    /// Removing a hook by a name nobody registered.
    #[error("No such hook: {name}")]
    UnknownHook { name: String },

    /// A constraint that cannot be compiled, or whose operand turns out to be
    /// unusable at evaluation time.
    #[error("Malformed constraint on '{key}': {reason}")]
    MalformedConstraint { key: String, reason: String },

    /// An asynchronous hook terminated in its error step.
    #[error("Hook '{hook}' failed while handling '{event_type}': {message}")]
    HookFailed {
        hook: String,
        event_type: String,
        message: String,
    },

    /// Event construction rejected (empty type tag).
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl EventsError {
    /// Short error code string used in logs and sink entries.
    pub fn code(&self) -> &'static str {
        match self {
            EventsError::DuplicateHook { .. } => "DUPLICATE_HOOK",
            EventsError::UnknownHook { .. } => "UNKNOWN_HOOK",
            EventsError::MalformedConstraint { .. } => "MALFORMED_CONSTRAINT",
            EventsError::HookFailed { .. } => "HOOK_FAILED",
            EventsError::InvalidEvent(_) => "INVALID_EVENT",
        }
    }
}

impl From<EventsError> for stagehand_core::StagehandError {
    fn from(err: EventsError) -> Self {
        stagehand_core::StagehandError::Dispatch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EventsError>;
