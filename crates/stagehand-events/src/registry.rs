use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{EventsError, Result};
use crate::event::Event;
use crate::hook::{ExecType, Hook};

/// The dispatcher's hook set, keyed by name.
///
/// Mutators are callable at any time, including from inside a running hook;
/// the dispatcher snapshots its selection at each event boundary, so a
/// mid-event registration only affects subsequent events.
pub struct HookRegistry {
    hooks: Mutex<Vec<Arc<Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, hook: Hook) -> Result<()> {
        let mut hooks = self.hooks.lock().expect("hook registry poisoned");
        if hooks.iter().any(|h| h.name() == hook.name()) {
            return Err(EventsError::DuplicateHook {
                name: hook.name().to_string(),
            });
        }
        debug!(hook = %hook.name(), priority = hook.priority(), "hook registered");
        hooks.push(Arc::new(hook));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut hooks = self.hooks.lock().expect("hook registry poisoned");
        let before = hooks.len();
        hooks.retain(|h| h.name() != name);
        if hooks.len() == before {
            return Err(EventsError::UnknownHook {
                name: name.to_string(),
            });
        }
        debug!(hook = %name, "hook removed");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Hook>> {
        self.hooks
            .lock()
            .expect("hook registry poisoned")
            .iter()
            .find(|h| h.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().expect("hook registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matching hooks of `exec_type` for `event`, priority descending, ties
    /// broken by name ascending — deterministic for a fixed registration set.
    ///
    /// Interest-evaluation faults go through `on_fault`; the faulting
    /// interest counts as not matching.
    pub fn select(
        &self,
        exec_type: ExecType,
        event: &Event,
        on_fault: &mut dyn FnMut(&Hook, EventsError),
    ) -> Vec<Arc<Hook>> {
        let snapshot: Vec<Arc<Hook>> = {
            let hooks = self.hooks.lock().expect("hook registry poisoned");
            hooks
                .iter()
                .filter(|h| h.exec_type() == exec_type)
                .cloned()
                .collect()
        };

        let mut matched: Vec<Arc<Hook>> = snapshot
            .into_iter()
            .filter(|hook| {
                let mut report = |err| on_fault(hook, err);
                hook.matches(event, &mut report)
            })
            .collect();

        matched.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        matched
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
