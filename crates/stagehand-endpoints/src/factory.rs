use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use stagehand_core::Core;
use stagehand_events::Properties;

use crate::error::{EndpointError, Result};

/// A constructed endpoint: a named entry point wrapping a graph node, with a
/// small set of runtime controls.
pub trait Endpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Bound id of the wrapped graph node.
    fn node_id(&self) -> u32;

    /// Current value of a named control (`"volume"`, `"mute"`, …).
    fn control(&self, id: &str) -> Option<String>;

    /// Set a control. Returns `false` for an unknown control or an
    /// unparsable value.
    fn set_control(&self, id: &str, value: &str) -> bool;
}

/// Builds endpoints of one flavour; registered by name so policy code can
/// request "whatever `softdsp-endpoint` builds" without knowing the type.
#[async_trait]
pub trait EndpointFactory: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self, core: &Arc<Core>, properties: Properties)
        -> Result<Arc<dyn Endpoint>>;
}

/// Per-core registry of endpoint factories.
pub struct FactoryRegistry {
    factories: Mutex<HashMap<String, Arc<dyn EndpointFactory>>>,
}

impl FactoryRegistry {
    /// The registry of `core`, created on first request.
    pub fn get_instance(core: &Core) -> Arc<FactoryRegistry> {
        core.get_or_init(|| {
            Arc::new(FactoryRegistry {
                factories: Mutex::new(HashMap::new()),
            })
        })
    }

    pub fn register(&self, factory: Arc<dyn EndpointFactory>) -> Result<()> {
        let name = factory.name().to_string();
        let mut factories = self.factories.lock().expect("factory registry poisoned");
        if factories.contains_key(&name) {
            return Err(EndpointError::DuplicateFactory { name });
        }
        debug!(factory = %name, "endpoint factory registered");
        factories.insert(name, factory);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn EndpointFactory>> {
        self.factories
            .lock()
            .expect("factory registry poisoned")
            .get(name)
            .cloned()
    }

    /// Look up `name` on the core's registry and build through it.
    pub async fn make(
        core: &Arc<Core>,
        name: &str,
        properties: Properties,
    ) -> Result<Arc<dyn Endpoint>> {
        let registry = Self::get_instance(core);
        let factory = registry.find(name).ok_or_else(|| EndpointError::UnknownFactory {
            name: name.to_string(),
        })?;
        factory.create(core, properties).await
    }
}
