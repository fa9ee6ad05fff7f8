use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::trace;

use crate::event::Event;

/// Terminal step: the state machine finished successfully.
pub const STEP_NONE: i32 = 0;
/// Terminal step: the state machine failed.
pub const STEP_ERROR: i32 = -1;
/// First step id available to hook-defined state machines.
pub const STEP_CUSTOM_START: i32 = 100;

pub type NextStepFn = Arc<dyn Fn(&Transition, i32) -> i32 + Send + Sync>;
pub type ExecuteStepFn = Arc<dyn Fn(&Transition, i32) + Send + Sync>;

/// Per-activation state of an asynchronous hook.
///
/// The dispatcher creates one when a stepped hook begins executing and waits
/// for it to reach a terminal step. `advance` and `fail` may be called from
/// any thread — from inside `execute_step` for a synchronous step, or later
/// from an external callback for a suspended one.
#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

struct TransitionInner {
    hook_name: String,
    event: Option<Event>,
    next_step: NextStepFn,
    execute_step: ExecuteStepFn,
    step: Mutex<i32>,
    error: Mutex<Option<String>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl Transition {
    pub(crate) fn start(
        hook_name: String,
        event: Option<Event>,
        next_step: NextStepFn,
        execute_step: ExecuteStepFn,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            inner: Arc::new(TransitionInner {
                hook_name,
                event,
                next_step,
                execute_step,
                step: Mutex::new(STEP_NONE),
                error: Mutex::new(None),
                done_tx,
                done_rx,
            }),
        }
    }

    pub fn hook_name(&self) -> &str {
        &self.inner.hook_name
    }

    /// The event that triggered this activation; `None` for a terminal
    /// (`AfterEvents`) hook.
    pub fn event(&self) -> Option<&Event> {
        self.inner.event.as_ref()
    }

    pub fn step(&self) -> i32 {
        *self.inner.step.lock().expect("transition step poisoned")
    }

    pub fn is_terminal(&self) -> bool {
        *self.inner.done_rx.borrow()
    }

    /// Drive the state machine one step forward.
    ///
    /// Asks `next_step` for the successor of the current step, then either
    /// finishes (NONE/ERROR) or records the new step and invokes
    /// `execute_step`. The step function may call `advance` again
    /// synchronously, or stash the transition and advance it later.
    pub fn advance(&self) {
        if self.is_terminal() {
            return;
        }
        let current = self.step();
        let next = (self.inner.next_step)(self, current);
        trace!(
            hook = %self.inner.hook_name,
            from = current,
            to = next,
            "transition advancing"
        );
        match next {
            STEP_NONE => self.finish(),
            STEP_ERROR => {
                let mut error = self.inner.error.lock().expect("transition error poisoned");
                if error.is_none() {
                    *error = Some("state machine reported the error step".to_string());
                }
                drop(error);
                *self.inner.step.lock().expect("transition step poisoned") = STEP_ERROR;
                self.finish();
            }
            step => {
                *self.inner.step.lock().expect("transition step poisoned") = step;
                (self.inner.execute_step)(self, step);
            }
        }
    }

    /// Abort with an error. The dispatcher reports it to the error sink and
    /// moves on; the batch is not cancelled. No-op once terminal.
    pub fn fail(&self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        *self.inner.error.lock().expect("transition error poisoned") = Some(message.into());
        *self.inner.step.lock().expect("transition step poisoned") = STEP_ERROR;
        self.finish();
    }

    /// The captured error, once the transition terminated in failure.
    pub fn error(&self) -> Option<String> {
        self.inner
            .error
            .lock()
            .expect("transition error poisoned")
            .clone()
    }

    fn finish(&self) {
        // Receivers are kept alive by the Arc; send cannot fail.
        let _ = self.inner.done_tx.send(true);
    }

    /// Resolve once the transition reaches a terminal step.
    pub(crate) async fn completed(&self) {
        let mut rx = self.inner.done_rx.clone();
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    const STEP_ONE: i32 = STEP_CUSTOM_START;
    const STEP_TWO: i32 = STEP_CUSTOM_START + 1;

    fn two_step(executed: Arc<AtomicI32>) -> Transition {
        Transition::start(
            "two-step".to_string(),
            None,
            Arc::new(|_, step| match step {
                STEP_NONE => STEP_ONE,
                STEP_ONE => STEP_TWO,
                STEP_TWO => STEP_NONE,
                _ => STEP_ERROR,
            }),
            Arc::new(move |transition, step| {
                executed.fetch_add(step, Ordering::SeqCst);
                transition.advance();
            }),
        )
    }

    #[test]
    fn runs_to_completion_synchronously() {
        let executed = Arc::new(AtomicI32::new(0));
        let transition = two_step(executed.clone());

        transition.advance();

        assert!(transition.is_terminal());
        assert!(transition.error().is_none());
        assert_eq!(executed.load(Ordering::SeqCst), STEP_ONE + STEP_TWO);
    }

    #[test]
    fn fail_records_error_and_terminates() {
        let transition = Transition::start(
            "failing".to_string(),
            None,
            Arc::new(|_, step| if step == STEP_NONE { STEP_ONE } else { STEP_NONE }),
            Arc::new(|transition, _| transition.fail("device vanished")),
        );

        transition.advance();

        assert!(transition.is_terminal());
        assert_eq!(transition.step(), STEP_ERROR);
        assert_eq!(transition.error().as_deref(), Some("device vanished"));
    }

    #[test]
    fn error_step_without_message_gets_a_default() {
        let transition = Transition::start(
            "bad-machine".to_string(),
            None,
            Arc::new(|_, _| STEP_ERROR),
            Arc::new(|_, _| unreachable!("error step is terminal")),
        );

        transition.advance();
        assert!(transition.is_terminal());
        assert!(transition.error().is_some());
    }

    #[test]
    fn advance_after_terminal_is_a_noop() {
        let executed = Arc::new(AtomicI32::new(0));
        let transition = two_step(executed.clone());

        transition.advance();
        let after_first = executed.load(Ordering::SeqCst);
        transition.advance();
        assert_eq!(executed.load(Ordering::SeqCst), after_first);
    }
}
