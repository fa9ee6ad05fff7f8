use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use stagehand_core::Core;
use stagehand_events::{
    Constraint, EventDispatcher, ExecType, Hook, Interest, Properties, Subject, SubjectKind,
    Transition, STEP_CUSTOM_START, STEP_ERROR, STEP_NONE,
};
use stagehand_graph::{
    GraphObject, ObjectKind, ObjectManager, EVENT_OBJECT_ADDED, EVENT_OBJECT_REMOVED,
};

use crate::error::{EndpointError, Result};
use crate::factory::{Endpoint, EndpointFactory};

/// Registry name of the software-DSP endpoint factory.
pub const FACTORY_NAME: &str = "softdsp-endpoint";

/// Marker property of the helper nodes this factory creates in the mirror.
/// Their media class is deliberately outside `Audio/*` so they never
/// re-trigger endpoint creation.
pub const DSP_NODE_GROUP: &str = "stagehand-dsp";
const DSP_MEDIA_CLASS: &str = "DSP/Audio";

/// Quantum requested when the wrapped node does not ask for one.
const DEFAULT_QUANTUM: u32 = 256;

// Bring-up steps of the endpoint state machine.
const STEP_CREATE_DSP: i32 = STEP_CUSTOM_START;
const STEP_CONFIGURE_FORMAT: i32 = STEP_CUSTOM_START + 1;
const STEP_LINK_DSP: i32 = STEP_CUSTOM_START + 2;

/// Which way audio flows through the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The DSP chain feeds a sink node.
    Playback,
    /// A source node feeds the DSP chain.
    Capture,
}

impl Direction {
    fn from_media_class(class: &str) -> Option<Self> {
        match class {
            "Audio/Sink" => Some(Direction::Playback),
            "Audio/Source" => Some(Direction::Capture),
            _ => None,
        }
    }
}

/// An audio endpoint that wraps a device node and plugs a software DSP node
/// in front of it, linked according to the flow direction.
pub struct SoftdspEndpoint {
    name: String,
    node_id: u32,
    direction: Direction,
    dsp_node_id: Mutex<Option<u32>>,
    link_id: Mutex<Option<u32>>,
    quantum: Mutex<u32>,
    volume: Mutex<f32>,
    mute: Mutex<bool>,
}

impl SoftdspEndpoint {
    fn new(name: String, node_id: u32, direction: Direction) -> Self {
        Self {
            name,
            node_id,
            direction,
            dsp_node_id: Mutex::new(None),
            link_id: Mutex::new(None),
            quantum: Mutex::new(DEFAULT_QUANTUM),
            volume: Mutex::new(1.0),
            mute: Mutex::new(false),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn dsp_node_id(&self) -> Option<u32> {
        *self.dsp_node_id.lock().expect("dsp id poisoned")
    }

    pub fn link_id(&self) -> Option<u32> {
        *self.link_id.lock().expect("link id poisoned")
    }

    /// Negotiated audio quantum, clamped to the configured bounds.
    pub fn quantum(&self) -> u32 {
        *self.quantum.lock().expect("quantum poisoned")
    }
}

impl Endpoint for SoftdspEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_id(&self) -> u32 {
        self.node_id
    }

    fn control(&self, id: &str) -> Option<String> {
        match id {
            "volume" => Some(format!("{:.2}", *self.volume.lock().expect("volume poisoned"))),
            "mute" => Some(self.mute.lock().expect("mute poisoned").to_string()),
            _ => None,
        }
    }

    fn set_control(&self, id: &str, value: &str) -> bool {
        match id {
            "volume" => match value.parse::<f32>() {
                Ok(v) => {
                    *self.volume.lock().expect("volume poisoned") = v.clamp(0.0, 1.0);
                    true
                }
                Err(_) => false,
            },
            "mute" => match value.parse::<bool>() {
                Ok(v) => {
                    *self.mute.lock().expect("mute poisoned") = v;
                    true
                }
                Err(_) => false,
            },
            _ => false,
        }
    }
}

/// Builds [`SoftdspEndpoint`]s for audio device nodes.
///
/// Two entry points: the registry path ([`EndpointFactory::create`]) brings
/// an endpoint up in one shot, and [`SoftdspFactory::install_hooks`] wires a
/// stepped hook that does the same bring-up incrementally for every audio
/// node announced by the graph mirror, plus a teardown hook for departures.
pub struct SoftdspFactory {
    manager: Arc<ObjectManager>,
    endpoints: DashMap<u32, Arc<SoftdspEndpoint>>,
    /// Mirror-local ids for the DSP and link objects this factory fabricates;
    /// kept far above any realistic remote bound id.
    next_id: AtomicU32,
    min_quantum: u32,
    max_quantum: u32,
}

impl SoftdspFactory {
    pub fn new(core: &Core, manager: Arc<ObjectManager>) -> Arc<Self> {
        let endpoints = &core.config().endpoints;
        Arc::new(Self {
            manager,
            endpoints: DashMap::new(),
            next_id: AtomicU32::new(0x1_0000),
            min_quantum: endpoints.min_quantum,
            max_quantum: endpoints.max_quantum,
        })
    }

    pub fn n_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoint_for_node(&self, node_id: u32) -> Option<Arc<SoftdspEndpoint>> {
        self.endpoints.get(&node_id).map(|e| Arc::clone(&e))
    }

    /// Register the bring-up and teardown hooks on the core's dispatcher.
    pub fn install_hooks(self: &Arc<Self>, core: &Core) -> stagehand_events::Result<()> {
        let dispatcher = EventDispatcher::get_instance(core);

        let factory = Arc::clone(self);
        dispatcher.register_hook(
            Hook::stepped(
                "softdsp-create",
                50,
                ExecType::OnEvent,
                |_, step| match step {
                    STEP_NONE => STEP_CREATE_DSP,
                    STEP_CREATE_DSP => STEP_CONFIGURE_FORMAT,
                    STEP_CONFIGURE_FORMAT => STEP_LINK_DSP,
                    STEP_LINK_DSP => STEP_NONE,
                    _ => STEP_ERROR,
                },
                move |transition, step| factory.execute_create_step(transition, step),
            )
            .with_interest(audio_node_interest(EVENT_OBJECT_ADDED)?),
        )?;

        let factory = Arc::clone(self);
        dispatcher.register_hook(
            Hook::simple("softdsp-teardown", 50, ExecType::OnEvent, move |event| {
                if let Some(event) = event {
                    factory.teardown(event.properties().get_parsed("bound.id"));
                }
            })
            .with_interest(audio_node_interest(EVENT_OBJECT_REMOVED)?),
        )?;

        Ok(())
    }

    fn execute_create_step(&self, transition: &Transition, step: i32) {
        let result = self
            .node_for(transition)
            .and_then(|node| match step {
                STEP_CREATE_DSP => self.create_dsp(&node),
                STEP_CONFIGURE_FORMAT => self.configure_format(&node),
                STEP_LINK_DSP => self.link_dsp(&node),
                _ => Err(EndpointError::CreationFailed {
                    factory: FACTORY_NAME.to_string(),
                    reason: format!("unexpected step {step}"),
                }),
            });
        match result {
            Ok(()) => transition.advance(),
            Err(err) => transition.fail(err.to_string()),
        }
    }

    /// Resolve the mirrored node the triggering event points at.
    fn node_for(&self, transition: &Transition) -> Result<Arc<GraphObject>> {
        let creation_failed = |reason: &str| EndpointError::CreationFailed {
            factory: FACTORY_NAME.to_string(),
            reason: reason.to_string(),
        };
        let event = transition
            .event()
            .ok_or_else(|| creation_failed("no triggering event"))?;
        let id: u32 = event
            .properties()
            .get_parsed("bound.id")
            .ok_or(EndpointError::MissingProperty {
                key: "bound.id".to_string(),
            })?;
        self.manager
            .find_by_id(id)
            .ok_or_else(|| creation_failed("node is not mirrored"))
    }

    fn create_dsp(&self, node: &Arc<GraphObject>) -> Result<()> {
        let node_id = node.bound_id();
        let class = node.property("media.class").unwrap_or_default();
        let direction = Direction::from_media_class(&class).ok_or_else(|| {
            EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: format!("unsupported media class '{class}'"),
            }
        })?;

        let name = match node.property("node.name") {
            Some(node_name) => format!("endpoint.{node_name}"),
            None => format!("endpoint.node{node_id}"),
        };
        let endpoint = Arc::new(SoftdspEndpoint::new(name, node_id, direction));

        let dsp_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut props = Properties::new();
        props.set("media.class", DSP_MEDIA_CLASS);
        props.set("node.group", DSP_NODE_GROUP);
        props.set("node.name", format!("dsp.node{node_id}"));
        props.set("node.target", node_id.to_string());
        // a mirror that does not admit DSP helpers simply will not track it
        if let Err(err) = self.manager.insert(GraphObject::new(
            dsp_id,
            ObjectKind::Node,
            props,
            Properties::new(),
        )) {
            return Err(EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: err.to_string(),
            });
        }

        *endpoint.dsp_node_id.lock().expect("dsp id poisoned") = Some(dsp_id);
        if self.endpoints.insert(node_id, endpoint).is_some() {
            warn!(node = node_id, "replacing an existing endpoint for node");
        }
        debug!(node = node_id, dsp = dsp_id, "dsp node created");
        Ok(())
    }

    fn configure_format(&self, node: &Arc<GraphObject>) -> Result<()> {
        let endpoint = self.existing_endpoint(node.bound_id())?;
        let requested = node
            .property("audio.quantum")
            .and_then(|q| q.trim().parse().ok())
            .unwrap_or(DEFAULT_QUANTUM);
        let quantum = requested.clamp(self.min_quantum, self.max_quantum);
        *endpoint.quantum.lock().expect("quantum poisoned") = quantum;
        debug!(node = node.bound_id(), requested, quantum, "format configured");
        Ok(())
    }

    fn link_dsp(&self, node: &Arc<GraphObject>) -> Result<()> {
        let node_id = node.bound_id();
        let endpoint = self.existing_endpoint(node_id)?;
        let dsp_id = endpoint
            .dsp_node_id()
            .ok_or_else(|| EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: "dsp node is missing".to_string(),
            })?;

        // The DSP feeds a playback sink; a capture source feeds the DSP.
        let (output, input) = match endpoint.direction {
            Direction::Playback => (dsp_id, node_id),
            Direction::Capture => (node_id, dsp_id),
        };

        let link_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut props = Properties::new();
        props.set("link.output.node", output.to_string());
        props.set("link.input.node", input.to_string());
        props.set("link.passive", "true");
        if let Err(err) = self.manager.insert(GraphObject::new(
            link_id,
            ObjectKind::Link,
            props,
            Properties::new(),
        )) {
            return Err(EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: err.to_string(),
            });
        }

        *endpoint.link_id.lock().expect("link id poisoned") = Some(link_id);
        debug!(node = node_id, dsp = dsp_id, link = link_id, "dsp linked");
        Ok(())
    }

    fn existing_endpoint(&self, node_id: u32) -> Result<Arc<SoftdspEndpoint>> {
        self.endpoint_for_node(node_id)
            .ok_or_else(|| EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: format!("no endpoint for node {node_id}"),
            })
    }

    /// Drop the endpoint of a departed node and unplumb its helpers.
    fn teardown(&self, node_id: Option<u32>) {
        let Some(node_id) = node_id else { return };
        let Some((_, endpoint)) = self.endpoints.remove(&node_id) else {
            return;
        };
        if let Some(link_id) = endpoint.link_id() {
            // helpers a strict mirror never admitted are already absent
            let _ = self.manager.remove(link_id);
        }
        if let Some(dsp_id) = endpoint.dsp_node_id() {
            let _ = self.manager.remove(dsp_id);
        }
        debug!(node = node_id, "endpoint torn down");
    }

    /// One-shot bring-up, shared by the registry path.
    fn bring_up(&self, node: &Arc<GraphObject>) -> Result<Arc<SoftdspEndpoint>> {
        self.create_dsp(node)?;
        self.configure_format(node)?;
        self.link_dsp(node)?;
        self.existing_endpoint(node.bound_id())
    }
}

#[async_trait]
impl EndpointFactory for SoftdspFactory {
    fn name(&self) -> &str {
        FACTORY_NAME
    }

    async fn create(
        &self,
        _core: &Arc<Core>,
        properties: Properties,
    ) -> Result<Arc<dyn Endpoint>> {
        let node_id: u32 =
            properties
                .get_parsed("node.id")
                .ok_or(EndpointError::MissingProperty {
                    key: "node.id".to_string(),
                })?;
        let node = self
            .manager
            .find_by_id(node_id)
            .ok_or_else(|| EndpointError::CreationFailed {
                factory: FACTORY_NAME.to_string(),
                reason: format!("node {node_id} is not mirrored"),
            })?;
        let endpoint = self.bring_up(&node)?;
        Ok(endpoint)
    }
}

/// Audio device nodes appearing in (or leaving) the mirror.
fn audio_node_interest(event_type: &str) -> stagehand_events::Result<Interest> {
    Interest::compile([
        Constraint::equals(SubjectKind::EventProperty, "event.type", event_type),
        Constraint::equals(SubjectKind::SubjectAttribute, "object-kind", "node"),
        Constraint::matches(SubjectKind::SubjectProperty, "media.class", "Audio/*"),
    ])
}
