use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use stagehand_core::Core;
use stagehand_events::{DispatcherHandle, Event, EventDispatcher, Interest, Properties};

use crate::error::{GraphError, Result};
use crate::object::GraphObject;

/// Pushed when a matching remote object appears in the registry.
pub const EVENT_OBJECT_ADDED: &str = "object-added";
/// Pushed when a mirrored object leaves the registry.
pub const EVENT_OBJECT_REMOVED: &str = "object-removed";

/// Mirrors the remote registry, admitting only objects that match the
/// declared interests, and turns every admission and departure into a
/// dispatcher event carrying the object as its subject.
///
/// Interests are declared before [`ObjectManager::install`]; afterwards the
/// manager is shared behind an `Arc` and driven by registry notifications
/// from the connection plumbing.
pub struct ObjectManager {
    interests: Vec<Interest>,
    objects: DashMap<u32, Arc<GraphObject>>,
    dispatcher: Option<DispatcherHandle>,
}

impl ObjectManager {
    pub fn new() -> Self {
        Self {
            interests: Vec::new(),
            objects: DashMap::new(),
            dispatcher: None,
        }
    }

    /// Admit objects matching `interest`. With no interests declared,
    /// everything is admitted.
    pub fn add_interest(&mut self, interest: Interest) {
        self.interests.push(interest);
    }

    /// Connect to the core's dispatcher; notifications can flow afterwards.
    pub fn install(mut self, core: &Core) -> Arc<Self> {
        let dispatcher = EventDispatcher::get_instance(core);
        self.dispatcher = Some(dispatcher.handle());
        debug!(interests = self.interests.len(), "object manager installed");
        Arc::new(self)
    }

    /// Mirror a newly announced remote object.
    ///
    /// Objects no declared interest matches are ignored without error; a
    /// bound-id collision is one.
    pub fn insert(&self, object: GraphObject) -> Result<()> {
        let id = object.bound_id();
        if self.objects.contains_key(&id) {
            return Err(GraphError::DuplicateObject { id });
        }

        let object = Arc::new(object);
        let event = self.make_event(EVENT_OBJECT_ADDED, &object);
        if !self.admits(&event) {
            debug!(id, kind = %object.kind(), "object does not match any interest, ignoring");
            return Ok(());
        }

        debug!(id, kind = %object.kind(), "object mirrored");
        self.objects.insert(id, Arc::clone(&object));
        self.push(event);
        Ok(())
    }

    /// Drop a mirrored object and announce its departure.
    pub fn remove(&self, bound_id: u32) -> Result<Arc<GraphObject>> {
        match self.objects.remove(&bound_id) {
            Some((_, object)) => {
                debug!(id = bound_id, kind = %object.kind(), "object dropped from mirror");
                let event = self.make_event(EVENT_OBJECT_REMOVED, &object);
                self.push(event);
                Ok(object)
            }
            None => Err(GraphError::UnknownObject { id: bound_id }),
        }
    }

    pub fn n_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn find_by_id(&self, bound_id: u32) -> Option<Arc<GraphObject>> {
        self.objects.get(&bound_id).map(|entry| Arc::clone(&entry))
    }

    /// Snapshot of the mirrored objects, sorted by bound id for
    /// deterministic iteration.
    pub fn iter(&self) -> Vec<Arc<GraphObject>> {
        let mut objects: Vec<Arc<GraphObject>> = self
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        objects.sort_by_key(|o| o.bound_id());
        objects
    }

    fn make_event(&self, type_tag: &str, object: &Arc<GraphObject>) -> Event {
        let mut props = Properties::new();
        props.set("object.kind", object.kind().as_str());
        props.set("bound.id", object.bound_id().to_string());
        let subject: stagehand_events::SubjectHandle = Arc::clone(object) as stagehand_events::SubjectHandle;
        Event::with_details(
            type_tag,
            object.kind().event_priority(),
            props,
            Some(subject),
            None,
        )
        .expect("graph event type tags are never empty")
    }

    /// Whether any declared interest matches the probe event (which carries
    /// the candidate object as its subject).
    fn admits(&self, event: &Event) -> bool {
        if self.interests.is_empty() {
            return true;
        }
        self.interests.iter().any(|interest| {
            interest.matches(event).unwrap_or_else(|err| {
                warn!(error = %err, "malformed object-manager interest, treating as no match");
                false
            })
        })
    }

    fn push(&self, event: Event) {
        match &self.dispatcher {
            Some(handle) => handle.push(event),
            None => warn!(
                event = %event.type_tag(),
                "object manager is not installed, dropping event"
            ),
        }
    }
}

impl Default for ObjectManager {
    fn default() -> Self {
        Self::new()
    }
}
