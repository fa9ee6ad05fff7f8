use std::sync::Mutex;

use tracing::warn;

/// Classifies a dispatch-time failure delivered to the [`ErrorSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// An interest constraint turned out to be ill-formed during matching.
    MalformedConstraint,
    /// An asynchronous hook terminated in its error step.
    HookFailed,
    /// An enqueue shim could not deliver an event.
    EventRejected,
}

impl FaultKind {
    pub fn code(&self) -> &'static str {
        match self {
            FaultKind::MalformedConstraint => "MALFORMED_CONSTRAINT",
            FaultKind::HookFailed => "HOOK_FAILED",
            FaultKind::EventRejected => "EVENT_REJECTED",
        }
    }
}

/// One failure record. Faults never halt the batch: the offending hook is
/// skipped and dispatch continues.
#[derive(Debug, Clone)]
pub struct Fault {
    /// The hook involved, when one is.
    pub hook: Option<String>,
    /// Type tag of the event being processed, when known.
    pub event_type: Option<String>,
    pub kind: FaultKind,
    pub message: String,
}

/// Receives dispatch-time failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, fault: &Fault);
}

/// Default sink: forward to the tracing subscriber and keep going.
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, fault: &Fault) {
        warn!(
            hook = fault.hook.as_deref().unwrap_or("-"),
            event = fault.event_type.as_deref().unwrap_or("-"),
            kind = fault.kind.code(),
            message = %fault.message,
            "dispatch fault"
        );
    }
}

/// Sink that records every fault; used by diagnostics and the test suites.
#[derive(Default)]
pub struct CollectingSink {
    faults: Mutex<Vec<Fault>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().expect("fault log poisoned").clone()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, fault: &Fault) {
        self.faults.lock().expect("fault log poisoned").push(fault.clone());
    }
}
