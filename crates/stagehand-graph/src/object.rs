use std::fmt;

use serde::{Deserialize, Serialize};

use stagehand_events::{Properties, Subject};

/// What kind of remote graph object a mirror entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Device,
    Node,
    Port,
    Link,
    Client,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Device => "device",
            ObjectKind::Node => "node",
            ObjectKind::Port => "port",
            ObjectKind::Link => "link",
            ObjectKind::Client => "client",
        }
    }

    /// Queue priority of add/remove events for this kind.
    ///
    /// Devices outrank the nodes they expose, which outrank their ports and
    /// the links between them, so a burst of registry notifications is
    /// always reacted to top-down.
    pub fn event_priority(&self) -> i32 {
        match self {
            ObjectKind::Device => 30,
            ObjectKind::Node => 20,
            ObjectKind::Port => 15,
            ObjectKind::Client => 12,
            ObjectKind::Link => 10,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a remote graph object.
///
/// Carries two bags, mirroring the remote registry: the object's own
/// properties and the registry-global ones announced alongside it. Lookups
/// fall back from the former to the latter.
pub struct GraphObject {
    bound_id: u32,
    kind: ObjectKind,
    properties: Properties,
    global_properties: Properties,
}

impl GraphObject {
    pub fn new(
        bound_id: u32,
        kind: ObjectKind,
        properties: Properties,
        global_properties: Properties,
    ) -> Self {
        Self {
            bound_id,
            kind,
            properties,
            global_properties,
        }
    }

    pub fn bound_id(&self) -> u32 {
        self.bound_id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn global_properties(&self) -> &Properties {
        &self.global_properties
    }
}

impl Subject for GraphObject {
    fn property(&self, key: &str) -> Option<String> {
        self.properties
            .get(key)
            .or_else(|| self.global_properties.get(key))
            .map(str::to_string)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "bound-id" => Some(self.bound_id.to_string()),
            "object-kind" => Some(self.kind.as_str().to_string()),
            _ => None,
        }
    }
}

impl fmt::Debug for GraphObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphObject")
            .field("bound_id", &self.bound_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> GraphObject {
        let props: Properties = [("media.class", "Audio/Sink")].into_iter().collect();
        let globals: Properties = [("object.serial", "91")].into_iter().collect();
        GraphObject::new(42, ObjectKind::Node, props, globals)
    }

    #[test]
    fn property_lookup_falls_back_to_globals() {
        let object = node();
        assert_eq!(object.property("media.class").as_deref(), Some("Audio/Sink"));
        assert_eq!(object.property("object.serial").as_deref(), Some("91"));
        assert_eq!(object.property("missing"), None);
    }

    #[test]
    fn attributes_answer_bound_id_and_kind() {
        let object = node();
        assert_eq!(object.attribute("bound-id").as_deref(), Some("42"));
        assert_eq!(object.attribute("object-kind").as_deref(), Some("node"));
        assert_eq!(object.attribute("volume"), None);
    }

    #[test]
    fn device_events_outrank_link_events() {
        assert!(ObjectKind::Device.event_priority() > ObjectKind::Link.event_priority());
    }
}
