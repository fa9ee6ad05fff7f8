use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tracing::{debug, trace};

use stagehand_core::Core;

use crate::error::{EventsError, Result};
use crate::event::Event;
use crate::hook::{ExecType, Hook, HookBehavior};
use crate::registry::HookRegistry;
use crate::sink::{ErrorSink, Fault, FaultKind, LogSink};
use crate::transition::Transition;

/// Queue entry. The heap is a max-heap: higher priority first, FIFO within a
/// priority via the monotonic sequence number.
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.event
            .priority()
            .cmp(&other.event.priority())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The event dispatcher: one per [`Core`], serialising every reaction to a
/// state change in the media graph.
///
/// Producers push events from any thread; a single loop task (spawned on the
/// host Tokio runtime when the instance is first requested) pops the highest-
/// priority pending event and runs its matching `OnEvent` hooks one at a time
/// in priority order. A batch advances in phases: the events already queued
/// when a phase opens run their `OnEvent` hooks back to back, then their
/// per-event terminals fire in processing order. Only then are events pushed
/// mid-phase (by a hook, or by a producer racing the loop) admitted as the
/// next phase, so a pushed event never runs ahead of the per-event terminals
/// of the event that pushed it. The batch terminals close the batch once
/// nothing is pending at all. Hooks never run inline from `push_event`.
pub struct EventDispatcher {
    registry: HookRegistry,
    queue: Mutex<BinaryHeap<QueuedEvent>>,
    seq: AtomicU64,
    /// Entries at or past this sequence number were pushed after the current
    /// phase opened; they stay queued until its per-event terminals flush.
    pop_frontier: AtomicU64,
    /// Events whose `OnEvent` phase completed this phase, with their
    /// per-event terminal hooks, in processing order. Flushed when no
    /// admissible event remains.
    pending_terminals: Mutex<Vec<(Event, Vec<Arc<Hook>>)>>,
    /// `AfterEvents` hooks matched by an event of the current batch.
    after_marks: Mutex<BTreeSet<String>>,
    /// Completed batches; diagnostic only.
    batch: AtomicU64,
    wake: Notify,
    stopping: AtomicBool,
    sink: Mutex<Arc<dyn ErrorSink>>,
}

impl EventDispatcher {
    /// The dispatcher of `core`, created — and its loop task spawned — on
    /// first request. The first call must happen inside a Tokio runtime.
    pub fn get_instance(core: &Core) -> Arc<EventDispatcher> {
        core.get_or_init(|| {
            let dispatcher = Arc::new(EventDispatcher::new());
            tokio::spawn(Arc::clone(&dispatcher).dispatch_loop());
            dispatcher
        })
    }

    fn new() -> Self {
        Self {
            registry: HookRegistry::new(),
            queue: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            pop_frontier: AtomicU64::new(0),
            pending_terminals: Mutex::new(Vec::new()),
            after_marks: Mutex::new(BTreeSet::new()),
            batch: AtomicU64::new(0),
            wake: Notify::new(),
            stopping: AtomicBool::new(false),
            sink: Mutex::new(Arc::new(LogSink)),
        }
    }

    /// Register a hook; fails with `DUPLICATE_HOOK` on a name collision.
    /// Registrations from inside a hook take effect at the next event
    /// boundary.
    pub fn register_hook(&self, hook: Hook) -> Result<()> {
        self.registry.register(hook)
    }

    /// Remove a hook by name; it receives no further events.
    pub fn remove_hook(&self, name: &str) -> Result<()> {
        self.registry.remove(name)
    }

    pub fn lookup_hook(&self, name: &str) -> Option<Arc<Hook>> {
        self.registry.lookup(name)
    }

    /// Replace the error sink (defaults to logging through tracing).
    pub fn set_error_sink(&self, sink: Arc<dyn ErrorSink>) {
        *self.sink.lock().expect("sink slot poisoned") = sink;
    }

    /// Enqueue an event. Never fails for a well-formed event and never runs
    /// hooks inline; the loop task picks it up on its next turn.
    pub fn push_event(&self, event: Event) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        trace!(
            event = %event.type_tag(),
            priority = event.priority(),
            seq,
            "event queued"
        );
        self.queue
            .lock()
            .expect("event queue poisoned")
            .push(QueuedEvent { seq, event });
        self.wake.notify_one();
    }

    /// Clonable enqueue shim for producers that must not keep the dispatcher
    /// alive. Pushing after the dispatcher is gone reports a rejection fault
    /// instead of panicking.
    pub fn handle(self: &Arc<Self>) -> DispatcherHandle {
        DispatcherHandle {
            dispatcher: Arc::downgrade(self),
            sink: self.sink(),
        }
    }

    /// Ask the loop task to exit. An event already being processed still
    /// completes; anything left in the queue is dropped.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Completed batch count; diagnostic only.
    pub fn batches(&self) -> u64 {
        self.batch.load(Ordering::Relaxed)
    }

    fn sink(&self) -> Arc<dyn ErrorSink> {
        self.sink.lock().expect("sink slot poisoned").clone()
    }

    /// Pop the highest-priority event of the current phase, discarding any
    /// that were stopped while still queued.
    ///
    /// Entries pushed after the phase opened (sequence number at or past the
    /// frontier) are skipped and stay queued, even when they outrank every
    /// admissible event: they belong to the next phase.
    fn pop_next(&self) -> Option<Event> {
        let frontier = self.pop_frontier.load(Ordering::Acquire);
        let mut queue = self.queue.lock().expect("event queue poisoned");
        let mut skipped = Vec::new();
        let mut found = None;
        while let Some(entry) = queue.pop() {
            if entry.seq >= frontier {
                skipped.push(entry);
                continue;
            }
            if entry.event.is_stopped() {
                trace!(event = %entry.event.type_tag(), "discarding stopped event");
                continue;
            }
            found = Some(entry.event);
            break;
        }
        for entry in skipped {
            queue.push(entry);
        }
        found
    }

    /// Admit everything queued so far into the next phase.
    fn advance_frontier(&self) {
        self.pop_frontier
            .store(self.seq.load(Ordering::Relaxed), Ordering::Release);
    }

    async fn dispatch_loop(self: Arc<Self>) {
        debug!("event dispatcher loop running");
        loop {
            // Created before the queue check so a push racing with the check
            // leaves a stored permit and the await below returns immediately.
            let wakeup = self.wake.notified();

            if self.stopping.load(Ordering::Acquire) {
                break;
            }

            if let Some(event) = self.pop_next() {
                self.process_event(&event).await;
                continue;
            }

            // The phase ran out of admissible events: fire its per-event
            // terminals, then open the next phase for whatever was pushed
            // in the meantime. Anything still pending keeps the batch
            // going and the batch terminals wait.
            self.flush_event_terminals().await;
            self.advance_frontier();
            if !self.queue_is_empty() {
                continue;
            }

            self.finish_batch().await;
            wakeup.await;
        }
        debug!("event dispatcher loop stopped");
    }

    /// Run one event through its matching hooks.
    ///
    /// The hook lists are snapshotted here, at the event boundary, so
    /// registry mutations made by the hooks themselves only affect later
    /// events. Locks are never held while a hook runs.
    async fn process_event(&self, event: &Event) {
        let sink = self.sink();
        let mut on_fault = |hook: &Hook, err: EventsError| {
            sink.report(&Fault {
                hook: Some(hook.name().to_string()),
                event_type: Some(event.type_tag().to_string()),
                kind: FaultKind::MalformedConstraint,
                message: err.to_string(),
            });
        };

        let on_hooks = self.registry.select(ExecType::OnEvent, event, &mut on_fault);
        let with_hooks = self
            .registry
            .select(ExecType::AfterEventsWithEvent, event, &mut on_fault);
        let terminal_hooks = self.registry.select(ExecType::AfterEvents, event, &mut on_fault);

        // Mark matching batch terminals now; they fire when the queue drains.
        if !terminal_hooks.is_empty() {
            let mut marks = self.after_marks.lock().expect("after marks poisoned");
            for hook in &terminal_hooks {
                marks.insert(hook.name().to_string());
            }
        }

        debug!(
            event = %event.type_tag(),
            priority = event.priority(),
            hooks = on_hooks.len(),
            "dispatching event"
        );

        for hook in &on_hooks {
            // Cancellation is observed at hook boundaries only; an in-flight
            // hook is never interrupted.
            if event.is_stopped() {
                debug!(event = %event.type_tag(), "event stopped, aborting hook chain");
                break;
            }
            self.run_hook(hook, Some(event), &sink).await;
        }

        // A stopped event forfeits its per-event terminals entirely; the
        // rest run when the phase's events are exhausted, in processing
        // order, before any event pushed mid-phase gets its turn.
        if !event.is_stopped() && !with_hooks.is_empty() {
            self.pending_terminals
                .lock()
                .expect("pending terminals poisoned")
                .push((event.clone(), with_hooks));
        }
    }

    /// Run the `AfterEventsWithEvent` hooks of every event the closing
    /// phase processed.
    async fn flush_event_terminals(&self) {
        loop {
            // One entry at a time: a terminal hook may push events, and a
            // fresh snapshot after each entry keeps ordering deterministic.
            let entry = {
                let mut pending = self
                    .pending_terminals
                    .lock()
                    .expect("pending terminals poisoned");
                if pending.is_empty() {
                    return;
                }
                pending.remove(0)
            };
            let (event, hooks) = entry;
            let sink = self.sink();
            for hook in &hooks {
                // a late stop is still honoured at the hook boundary
                if event.is_stopped() {
                    break;
                }
                self.run_hook(hook, Some(&event), &sink).await;
            }
        }
    }

    fn queue_is_empty(&self) -> bool {
        self.queue.lock().expect("event queue poisoned").is_empty()
    }

    /// Invoke a single hook, suspending on a stepped one until its
    /// transition terminates. An error terminus is reported to the sink and
    /// counts as "ran": the caller's cursor advances regardless.
    async fn run_hook(&self, hook: &Arc<Hook>, event: Option<&Event>, sink: &Arc<dyn ErrorSink>) {
        trace!(hook = %hook.name(), "running hook");
        match hook.behavior() {
            HookBehavior::Sync(callback) => callback(event),
            HookBehavior::Stepped {
                next_step,
                execute_step,
            } => {
                let transition = Transition::start(
                    hook.name().to_string(),
                    event.cloned(),
                    Arc::clone(next_step),
                    Arc::clone(execute_step),
                );
                transition.advance();
                transition.completed().await;
                if let Some(message) = transition.error() {
                    sink.report(&Fault {
                        hook: Some(hook.name().to_string()),
                        event_type: event.map(|e| e.type_tag().to_string()),
                        kind: FaultKind::HookFailed,
                        message,
                    });
                }
            }
        }
    }

    /// Fire every `AfterEvents` hook marked during the batch, in priority
    /// order, then reset for the next batch.
    async fn finish_batch(&self) {
        let names: Vec<String> = {
            let mut marks = self.after_marks.lock().expect("after marks poisoned");
            if marks.is_empty() {
                return;
            }
            std::mem::take(&mut *marks).into_iter().collect()
        };

        // Re-resolve through the registry so hooks removed mid-batch stay
        // silent.
        let mut hooks: Vec<Arc<Hook>> = names
            .iter()
            .filter_map(|name| self.registry.lookup(name))
            .filter(|hook| hook.exec_type() == ExecType::AfterEvents)
            .collect();
        hooks.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.name().cmp(b.name()))
        });

        let batch = self.batch.fetch_add(1, Ordering::Relaxed);
        debug!(batch, terminals = hooks.len(), "queue drained, firing batch terminals");

        let sink = self.sink();
        for hook in &hooks {
            self.run_hook(hook, None, &sink).await;
        }
    }
}

/// Thread-safe enqueue shim handed to external producers.
#[derive(Clone)]
pub struct DispatcherHandle {
    dispatcher: Weak<EventDispatcher>,
    sink: Arc<dyn ErrorSink>,
}

impl DispatcherHandle {
    /// Enqueue through the shim. A push that finds the dispatcher gone is
    /// reported to the error sink as a rejection.
    pub fn push(&self, event: Event) {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.push_event(event),
            None => self.sink.report(&Fault {
                hook: None,
                event_type: Some(event.type_tag().to_string()),
                kind: FaultKind::EventRejected,
                message: "dispatcher is gone".to_string(),
            }),
        }
    }
}
