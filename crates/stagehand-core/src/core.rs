use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::StagehandConfig;

/// The per-process host context.
///
/// Subsystems that must exist once per context (the event dispatcher, the
/// endpoint factory registry) attach themselves through the extension map
/// rather than through process globals, so two cores in one process — the
/// test suites do this — never share state.
pub struct Core {
    config: StagehandConfig,
    extensions: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Core {
    pub fn new(config: StagehandConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            extensions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StagehandConfig {
        &self.config
    }

    /// Fetch the context-scoped singleton of type `T`, creating it with
    /// `init` on first request.
    ///
    /// `init` runs with the extension map locked and must not re-enter the
    /// map (fetch other extensions up front instead).
    pub fn get_or_init<T, F>(&self, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Arc<T>,
    {
        let mut extensions = self.extensions.lock().expect("extension map poisoned");
        let entry = extensions
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!(extension = std::any::type_name::<T>(), "creating context extension");
                init()
            })
            .clone();
        entry
            .downcast::<T>()
            .expect("extension map entry stored under the wrong TypeId")
    }

    /// Fetch the context-scoped singleton of type `T` if it has been created.
    pub fn get_extension<T>(&self) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let extensions = self.extensions.lock().expect("extension map poisoned");
        extensions
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    #[test]
    fn get_or_init_creates_once() {
        let core = Core::new(StagehandConfig::default());

        let first = core.get_or_init(|| Arc::new(Counter(1)));
        let second = core.get_or_init(|| Arc::new(Counter(2)));

        assert_eq!(first.0, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn get_extension_before_init_is_none() {
        let core = Core::new(StagehandConfig::default());
        assert!(core.get_extension::<Counter>().is_none());

        core.get_or_init(|| Arc::new(Counter(7)));
        assert_eq!(core.get_extension::<Counter>().expect("present").0, 7);
    }

    #[test]
    fn cores_do_not_share_extensions() {
        let a = Core::new(StagehandConfig::default());
        let b = Core::new(StagehandConfig::default());

        a.get_or_init(|| Arc::new(Counter(1)));
        assert!(b.get_extension::<Counter>().is_none());
    }
}
