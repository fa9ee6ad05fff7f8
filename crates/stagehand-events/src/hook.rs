use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EventsError;
use crate::event::Event;
use crate::interest::Interest;
use crate::transition::{ExecuteStepFn, NextStepFn, Transition};

/// When a hook fires relative to the event batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecType {
    /// Fires per matching event, interleaved with other hooks by priority.
    OnEvent,
    /// Fires once per event, after every `OnEvent` hook of the batch has
    /// run; deliveries happen at queue drain in event processing order.
    /// Receives the event.
    AfterEventsWithEvent,
    /// Fires once per batch, after every per-event hook, when the queue has
    /// truly drained. Receives no event.
    AfterEvents,
}

pub type HookCallback = Arc<dyn Fn(Option<&Event>) + Send + Sync>;

/// How a hook reacts: a plain callable, or a suspendable state machine
/// driven through a [`Transition`].
#[derive(Clone)]
pub enum HookBehavior {
    Sync(HookCallback),
    Stepped {
        next_step: NextStepFn,
        execute_step: ExecuteStepFn,
    },
}

/// A registered reactor: name, priority, exec type, interests, behaviour.
///
/// Hooks may read the event, consult its subject, push new events, and call
/// [`Event::stop`] — nothing else. A hook can be activated again for a new
/// event while an earlier stepped activation is still suspended, so per-
/// activation state belongs on the [`Transition`], not on captured state.
pub struct Hook {
    name: String,
    priority: i32,
    exec_type: ExecType,
    interests: Vec<Interest>,
    behavior: HookBehavior,
}

impl Hook {
    /// Synchronous hook. The callback receives `Some(event)` except for
    /// [`ExecType::AfterEvents`] delivery, which carries no event.
    pub fn simple(
        name: impl Into<String>,
        priority: i32,
        exec_type: ExecType,
        callback: impl Fn(Option<&Event>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            exec_type,
            interests: Vec::new(),
            behavior: HookBehavior::Sync(Arc::new(callback)),
        }
    }

    /// Asynchronous hook: `next_step` encodes the state machine, and
    /// `execute_step` performs each step, advancing the transition either
    /// synchronously or from a later external callback.
    pub fn stepped(
        name: impl Into<String>,
        priority: i32,
        exec_type: ExecType,
        next_step: impl Fn(&Transition, i32) -> i32 + Send + Sync + 'static,
        execute_step: impl Fn(&Transition, i32) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            exec_type,
            interests: Vec::new(),
            behavior: HookBehavior::Stepped {
                next_step: Arc::new(next_step),
                execute_step: Arc::new(execute_step),
            },
        }
    }

    /// Add an interest. Interests are disjunctive; a hook with none at all
    /// matches every event.
    pub fn with_interest(mut self, interest: Interest) -> Self {
        self.interests.push(interest);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn exec_type(&self) -> ExecType {
        self.exec_type
    }

    pub fn interests(&self) -> &[Interest] {
        &self.interests
    }

    pub(crate) fn behavior(&self) -> &HookBehavior {
        &self.behavior
    }

    /// Whether any interest matches `event`. Interests that fault during
    /// evaluation are reported through `on_fault` and treated as not
    /// matching; the remaining interests are still consulted.
    pub(crate) fn matches(&self, event: &Event, on_fault: &mut dyn FnMut(EventsError)) -> bool {
        if self.interests.is_empty() {
            return true;
        }
        for interest in &self.interests {
            match interest.matches(event) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => on_fault(err),
            }
        }
        false
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("exec_type", &self.exec_type)
            .field("interests", &self.interests.len())
            .finish_non_exhaustive()
    }
}
