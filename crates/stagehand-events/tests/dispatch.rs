//! End-to-end dispatch ordering, cancellation and suspension behaviour.
//!
//! These tests run on the current-thread runtime on purpose: the dispatcher
//! loop task only makes progress while the test awaits, so events pushed
//! back-to-back are observed exactly as queued, like producers racing a busy
//! host loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use stagehand_core::{Core, StagehandConfig};
use stagehand_events::{
    CollectingSink, Constraint, Event, EventDispatcher, ExecType, FaultKind, Hook, Interest,
    Properties, SubjectKind, Transition, STEP_CUSTOM_START, STEP_ERROR, STEP_NONE,
};

/// Records hook activations as `"hook:tag"` entries (`"hook"` when the
/// delivery carries no event).
#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn record(&self, hook: &str, event: Option<&Event>) {
        let entry = match event.and_then(|e| e.properties().get("test.tag")) {
            Some(tag) => format!("{hook}:{tag}"),
            None => hook.to_string(),
        };
        self.log.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

struct TestBed {
    // Keeps the dispatcher extension alive for the duration of the test.
    _core: Arc<Core>,
    dispatcher: Arc<EventDispatcher>,
    recorder: Recorder,
    drained: mpsc::UnboundedReceiver<()>,
    drained_tx: mpsc::UnboundedSender<()>,
}

impl TestBed {
    fn new() -> Self {
        let core = Core::new(StagehandConfig::default());
        let dispatcher = EventDispatcher::get_instance(&core);
        let (drained_tx, drained) = mpsc::unbounded_channel();
        Self {
            _core: core,
            dispatcher,
            recorder: Recorder::default(),
            drained,
            drained_tx,
        }
    }

    /// Recording hook named `name`, interested in the given event types.
    fn recording_hook(&self, name: &'static str, priority: i32, exec: ExecType, types: &[&str]) {
        let recorder = self.recorder.clone();
        let mut hook = Hook::simple(name, priority, exec, move |event| {
            recorder.record(name, event);
        });
        for tag in types {
            hook = hook.with_interest(type_interest(tag));
        }
        self.dispatcher.register_hook(hook).unwrap();
    }

    /// Batch-terminal hook that records `"q"` and signals the test.
    fn quit_hook(&self, types: &[&str]) {
        let recorder = self.recorder.clone();
        let tx = self.drained_tx.clone();
        let mut hook = Hook::simple("q", 1000, ExecType::AfterEvents, move |event| {
            recorder.record("q", event);
            let _ = tx.send(());
        });
        for tag in types {
            hook = hook.with_interest(type_interest(tag));
        }
        self.dispatcher.register_hook(hook).unwrap();
    }

    /// The standard registry of the ordering scenarios: `a`/`b`/`c` on
    /// type1, `d` on type2, per-event terminal `w` and batch terminal `q`
    /// on both.
    fn standard_hooks(&self) {
        self.recording_hook("a", 10, ExecType::OnEvent, &["type1"]);
        self.recording_hook("b", -200, ExecType::OnEvent, &["type1"]);
        self.recording_hook("c", 100, ExecType::OnEvent, &["type1"]);
        self.recording_hook("d", 0, ExecType::OnEvent, &["type2"]);
        self.recording_hook(
            "w",
            2000,
            ExecType::AfterEventsWithEvent,
            &["type1", "type2"],
        );
        self.quit_hook(&["type1", "type2"]);
    }

    async fn wait_drained(&mut self) {
        timeout(Duration::from_secs(5), self.drained.recv())
            .await
            .expect("dispatcher never drained")
            .expect("drain channel closed");
    }
}

fn type_interest(tag: &str) -> Interest {
    Interest::compile([Constraint::equals(
        SubjectKind::EventProperty,
        "event.type",
        tag,
    )])
    .unwrap()
}

fn tagged(type_tag: &str, priority: i32, tag: &str) -> Event {
    let props: Properties = [("test.tag", tag)].into_iter().collect();
    Event::with_details(type_tag, priority, props, None, None).unwrap()
}

#[tokio::test]
async fn single_event_runs_hooks_in_priority_order() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    // push never runs hooks inline
    assert!(bed.recorder.entries().is_empty());

    bed.wait_drained().await;
    assert_eq!(
        bed.recorder.entries(),
        vec!["c:e1", "a:e1", "b:e1", "w:e1", "q"]
    );
}

#[tokio::test]
async fn higher_priority_event_runs_first() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.dispatcher.push_event(tagged("type2", 100, "e2"));

    bed.wait_drained().await;
    assert_eq!(
        bed.recorder.entries(),
        vec!["d:e2", "c:e1", "a:e1", "b:e1", "w:e2", "w:e1", "q"]
    );
}

#[tokio::test]
async fn equal_priority_events_run_fifo() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    bed.dispatcher.push_event(tagged("type1", 10, "ea"));
    bed.dispatcher.push_event(tagged("type1", 10, "eb"));

    bed.wait_drained().await;
    assert_eq!(
        bed.recorder.entries(),
        vec!["c:ea", "a:ea", "b:ea", "c:eb", "a:eb", "b:eb", "w:ea", "w:eb", "q"]
    );
}

#[tokio::test]
async fn event_stopped_before_pop_runs_no_hooks() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    let e1 = tagged("type1", 10, "e1");
    bed.dispatcher.push_event(tagged("type2", 100, "e2"));
    bed.dispatcher.push_event(e1.clone());
    e1.stop();
    // stop is idempotent
    e1.stop();

    bed.wait_drained().await;
    assert_eq!(bed.recorder.entries(), vec!["d:e2", "w:e2", "q"]);
}

#[tokio::test]
async fn stop_mid_event_skips_remaining_hooks_and_per_event_terminal() {
    let mut bed = TestBed::new();

    let recorder = bed.recorder.clone();
    bed.dispatcher
        .register_hook(
            Hook::simple("stopper", 100, ExecType::OnEvent, move |event| {
                let event = event.expect("on-event delivery carries the event");
                recorder.record("stopper", Some(event));
                event.stop();
            })
            .with_interest(type_interest("type1")),
        )
        .unwrap();
    bed.recording_hook("after", 50, ExecType::OnEvent, &["type1"]);
    bed.recording_hook("w", 2000, ExecType::AfterEventsWithEvent, &["type1"]);
    bed.quit_hook(&["type1"]);

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;

    // the batch terminal was marked when the event was popped, so it still
    // fires; everything after the stopping hook is skipped
    assert_eq!(bed.recorder.entries(), vec!["stopper:e1", "q"]);
}

#[tokio::test]
async fn suspended_hook_pauses_the_event_without_blocking_the_loop() {
    let mut bed = TestBed::new();

    bed.recording_hook("a", 10, ExecType::OnEvent, &["type1"]);
    bed.recording_hook("b", -200, ExecType::OnEvent, &["type1"]);
    bed.recording_hook("c", 100, ExecType::OnEvent, &["type1"]);
    bed.quit_hook(&["type1", "type2"]);

    const STEP_ONE: i32 = STEP_CUSTOM_START;
    const STEP_TWO: i32 = STEP_CUSTOM_START + 1;

    let suspended: Arc<Mutex<Option<Transition>>> = Arc::new(Mutex::new(None));
    let (suspend_tx, mut suspend_rx) = mpsc::unbounded_channel();

    let recorder = bed.recorder.clone();
    let slot = suspended.clone();
    bed.dispatcher
        .register_hook(
            Hook::stepped(
                "x",
                50,
                ExecType::OnEvent,
                |_, step| match step {
                    STEP_NONE => STEP_ONE,
                    STEP_ONE => STEP_TWO,
                    STEP_TWO => STEP_NONE,
                    _ => STEP_ERROR,
                },
                move |transition, step| match step {
                    STEP_ONE => {
                        recorder.record("x.step1", transition.event());
                        *slot.lock().unwrap() = Some(transition.clone());
                        let _ = suspend_tx.send(());
                    }
                    STEP_TWO => {
                        transition.advance();
                    }
                    _ => unreachable!("unexpected step"),
                },
            )
            .with_interest(type_interest("type1")),
        )
        .unwrap();

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));

    timeout(Duration::from_secs(5), suspend_rx.recv())
        .await
        .expect("hook never suspended")
        .expect("suspension channel closed");
    assert_eq!(bed.recorder.entries(), vec!["c:e1", "x.step1:e1"]);

    // resume from "outside" — the loop picks up where it paused
    let transition = suspended.lock().unwrap().take().expect("transition stored");
    transition.advance();

    bed.wait_drained().await;
    assert_eq!(
        bed.recorder.entries(),
        vec!["c:e1", "x.step1:e1", "a:e1", "b:e1", "q"]
    );
}

#[tokio::test]
async fn failed_async_hook_is_reported_and_the_batch_continues() {
    let mut bed = TestBed::new();
    let sink = Arc::new(CollectingSink::new());
    bed.dispatcher.set_error_sink(sink.clone());

    bed.recording_hook("a", 10, ExecType::OnEvent, &["type1"]);
    bed.recording_hook("w", 2000, ExecType::AfterEventsWithEvent, &["type1"]);
    bed.quit_hook(&["type1"]);

    const STEP_ONE: i32 = STEP_CUSTOM_START;
    let recorder = bed.recorder.clone();
    bed.dispatcher
        .register_hook(
            Hook::stepped(
                "x",
                50,
                ExecType::OnEvent,
                |_, step| if step == STEP_NONE { STEP_ONE } else { STEP_NONE },
                move |transition, _| {
                    recorder.record("x.step1", transition.event());
                    transition.fail("device vanished");
                },
            )
            .with_interest(type_interest("type1")),
        )
        .unwrap();

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;

    // the failed hook counts as "ran": the cursor advances and the
    // terminals are unaffected
    assert_eq!(
        bed.recorder.entries(),
        vec!["x.step1:e1", "a:e1", "w:e1", "q"]
    );

    let faults = sink.faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].kind, FaultKind::HookFailed);
    assert_eq!(faults[0].hook.as_deref(), Some("x"));
    assert_eq!(faults[0].event_type.as_deref(), Some("type1"));
    assert!(faults[0].message.contains("device vanished"));
}

#[tokio::test]
async fn malformed_constraint_faults_and_skips_only_that_hook() {
    let mut bed = TestBed::new();
    let sink = Arc::new(CollectingSink::new());
    bed.dispatcher.set_error_sink(sink.clone());

    let recorder = bed.recorder.clone();
    bed.dispatcher
        .register_hook(
            Hook::simple("m", 50, ExecType::OnEvent, move |event| {
                recorder.record("m", event);
            })
            .with_interest(
                Interest::compile([Constraint::in_range(
                    SubjectKind::EventProperty,
                    "n",
                    "not-a-number",
                    "10",
                )])
                .unwrap(),
            ),
        )
        .unwrap();
    bed.recording_hook("ok", 10, ExecType::OnEvent, &["t"]);
    // catch-all batch terminal: no interests means "matches everything"
    let tx = bed.drained_tx.clone();
    bed.dispatcher
        .register_hook(Hook::simple("drain", -1000, ExecType::AfterEvents, move |_| {
            let _ = tx.send(());
        }))
        .unwrap();

    let props: Properties = [("n", "5"), ("test.tag", "e1")].into_iter().collect();
    bed.dispatcher
        .push_event(Event::with_details("t", 0, props, None, None).unwrap());
    bed.wait_drained().await;

    // `m` never ran; the well-formed hook did
    assert_eq!(bed.recorder.entries(), vec!["ok:e1"]);
    let faults = sink.faults();
    assert!(!faults.is_empty());
    assert!(faults
        .iter()
        .all(|f| f.kind == FaultKind::MalformedConstraint && f.hook.as_deref() == Some("m")));
}

#[tokio::test]
async fn duplicate_registration_keeps_the_first_hook() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    let err = bed
        .dispatcher
        .register_hook(Hook::simple("a", 20, ExecType::OnEvent, |_| {}))
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_HOOK");

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;
    // the original `a` still fires in its original position
    assert_eq!(
        bed.recorder.entries(),
        vec!["c:e1", "a:e1", "b:e1", "w:e1", "q"]
    );
}

#[tokio::test]
async fn events_pushed_from_hooks_join_the_current_batch() {
    let mut bed = TestBed::new();

    bed.recording_hook("first", 100, ExecType::OnEvent, &["type1"]);
    let recorder = bed.recorder.clone();
    // hooks hold the Weak shim, not the dispatcher itself
    let handle = bed.dispatcher.handle();
    bed.dispatcher
        .register_hook(
            Hook::simple("pusher", 50, ExecType::OnEvent, move |event| {
                recorder.record("pusher", event);
                // higher event priority than the one being processed — it
                // still waits for the remaining hooks of the current event
                handle.push(tagged("type2", 1000, "e2"));
            })
            .with_interest(type_interest("type1")),
        )
        .unwrap();
    bed.recording_hook("last", -10, ExecType::OnEvent, &["type1"]);
    bed.recording_hook("don", 0, ExecType::OnEvent, &["type2"]);
    bed.recording_hook(
        "w",
        2000,
        ExecType::AfterEventsWithEvent,
        &["type1", "type2"],
    );
    bed.quit_hook(&["type1", "type2"]);

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;

    // the pushed event stays queued until the pushing event's per-event
    // terminals have fired; only the single batch terminal waits for the
    // whole batch
    assert_eq!(
        bed.recorder.entries(),
        vec![
            "first:e1", "pusher:e1", "last:e1", "w:e1", "don:e2", "w:e2", "q"
        ]
    );
}

#[tokio::test]
async fn mid_batch_push_does_not_overtake_already_queued_events() {
    let mut bed = TestBed::new();

    bed.recording_hook("first", 100, ExecType::OnEvent, &["type1"]);
    let recorder = bed.recorder.clone();
    let handle = bed.dispatcher.handle();
    bed.dispatcher
        .register_hook(
            Hook::simple("pusher", 50, ExecType::OnEvent, move |event| {
                recorder.record("pusher", event);
                handle.push(tagged("type2", 1000, "ex"));
            })
            .with_interest(type_interest("type1")),
        )
        .unwrap();
    bed.recording_hook("don", 0, ExecType::OnEvent, &["type2"]);
    bed.recording_hook("low", 0, ExecType::OnEvent, &["type3"]);
    bed.recording_hook(
        "w",
        2000,
        ExecType::AfterEventsWithEvent,
        &["type1", "type2", "type3"],
    );
    bed.quit_hook(&["type1", "type2", "type3"]);

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.dispatcher.push_event(tagged("type3", 5, "e3"));
    bed.wait_drained().await;

    // the event pushed while e1 ran outranks everything, yet it must wait
    // for the events that were already queued and for their terminals
    assert_eq!(
        bed.recorder.entries(),
        vec![
            "first:e1", "pusher:e1", "low:e3", "w:e1", "w:e3", "don:ex", "w:ex", "q"
        ]
    );
}

#[tokio::test]
async fn removed_hook_receives_no_further_events() {
    let mut bed = TestBed::new();
    bed.recording_hook("r", 10, ExecType::OnEvent, &["type1"]);
    bed.quit_hook(&["type1"]);

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;

    bed.dispatcher.remove_hook("r").unwrap();
    assert!(bed.dispatcher.lookup_hook("r").is_none());

    bed.dispatcher.push_event(tagged("type1", 10, "e2"));
    bed.wait_drained().await;

    assert_eq!(bed.recorder.entries(), vec!["r:e1", "q", "q"]);
}

#[tokio::test]
async fn enqueue_shim_delivers_like_a_direct_push() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    let handle = bed.dispatcher.handle();
    handle.push(tagged("type1", 10, "e1"));

    bed.wait_drained().await;
    assert_eq!(
        bed.recorder.entries(),
        vec!["c:e1", "a:e1", "b:e1", "w:e1", "q"]
    );
}

#[tokio::test]
async fn consecutive_batches_fire_their_own_terminals() {
    let mut bed = TestBed::new();
    bed.standard_hooks();

    bed.dispatcher.push_event(tagged("type1", 10, "e1"));
    bed.wait_drained().await;

    bed.recorder.clear();

    bed.dispatcher.push_event(tagged("type2", 5, "e2"));
    bed.wait_drained().await;

    assert_eq!(bed.recorder.entries(), vec!["d:e2", "w:e2", "q"]);
    assert!(bed.dispatcher.batches() >= 2);
}
