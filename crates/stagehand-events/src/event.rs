use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EventsError, Result};
use crate::properties::Properties;
use crate::subject::SubjectHandle;

/// Something that happened, injected into the dispatcher.
///
/// `Event` is a cheap handle: clones share the same record, so a producer can
/// keep one and cancel it with [`Event::stop`] after pushing. Everything but
/// the stop flag is immutable once constructed.
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

struct EventInner {
    type_tag: String,
    priority: i32,
    properties: Properties,
    subject: Option<SubjectHandle>,
    source: Option<Arc<dyn Any + Send + Sync>>,
    stopped: AtomicBool,
}

impl Event {
    /// Event with an empty property bag and no subject.
    pub fn new(type_tag: impl Into<String>, priority: i32) -> Result<Self> {
        Self::with_details(type_tag, priority, Properties::new(), None, None)
    }

    /// Event carrying properties and optional subject/source handles.
    ///
    /// The type tag is mirrored into the bag under `event.type` so interests
    /// can match on it like any other property.
    pub fn with_details(
        type_tag: impl Into<String>,
        priority: i32,
        mut properties: Properties,
        subject: Option<SubjectHandle>,
        source: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Self> {
        let type_tag = type_tag.into();
        if type_tag.is_empty() {
            return Err(EventsError::InvalidEvent("empty type tag".to_string()));
        }
        properties.set("event.type", type_tag.as_str());
        Ok(Self {
            inner: Arc::new(EventInner {
                type_tag,
                priority,
                properties,
                subject,
                source,
                stopped: AtomicBool::new(false),
            }),
        })
    }

    pub fn type_tag(&self) -> &str {
        &self.inner.type_tag
    }

    pub fn priority(&self) -> i32 {
        self.inner.priority
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn subject(&self) -> Option<&SubjectHandle> {
        self.inner.subject.as_ref()
    }

    /// Opaque handle to whoever produced the event.
    pub fn source(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.inner.source.as_deref()
    }

    /// Cancel the event: no further hooks run for it. Observed at the next
    /// hook boundary; an in-flight hook is never interrupted. Idempotent.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same event record.
    pub fn same(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type_tag", &self.inner.type_tag)
            .field("priority", &self.inner.priority)
            .field("properties", &self.inner.properties)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
