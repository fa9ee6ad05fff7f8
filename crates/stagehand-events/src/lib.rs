//! `stagehand-events` — the priority-ordered, interest-matched event
//! dispatcher at the heart of the stagehand daemon.
//!
//! # Overview
//!
//! Producers (the graph mirror, configuration reloads, user signals) build an
//! [`Event`] and push it into the per-core [`EventDispatcher`]. The
//! dispatcher pops the highest-priority pending event, computes the ordered
//! list of matching [`Hook`]s, and runs them one at a time on the host loop.
//! Hooks declare what they care about through compiled [`Interest`]
//! predicates, and react either synchronously or as a suspendable state
//! machine driven through a [`Transition`].
//!
//! # Execution order
//!
//! | Phase | Fires |
//! |-------|-------|
//! | `OnEvent` | per matching event, priority descending, name tie-break |
//! | `AfterEventsWithEvent` | once per event at queue drain, in processing order |
//! | `AfterEvents` | once per batch, after every per-event hook |
//!
//! Cancellation ([`Event::stop`]) is observed at hook boundaries; failures
//! are routed to the [`ErrorSink`] and never halt a batch.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod hook;
pub mod interest;
pub mod properties;
pub mod registry;
pub mod sink;
pub mod subject;
pub mod transition;

pub use dispatcher::{DispatcherHandle, EventDispatcher};
pub use error::{EventsError, Result};
pub use event::Event;
pub use hook::{ExecType, Hook, HookBehavior};
pub use interest::{Constraint, Interest, Operand, SubjectKind, Verb};
pub use properties::Properties;
pub use registry::HookRegistry;
pub use sink::{CollectingSink, ErrorSink, Fault, FaultKind, LogSink};
pub use subject::{Subject, SubjectHandle};
pub use transition::{Transition, STEP_CUSTOM_START, STEP_ERROR, STEP_NONE};
