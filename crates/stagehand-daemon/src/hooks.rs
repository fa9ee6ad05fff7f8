use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info};

use stagehand_events::{
    Constraint, Event, EventDispatcher, ExecType, Hook, Interest, SubjectKind,
};

/// Pushed when the process receives SIGINT/SIGTERM.
pub const EVENT_SHUTDOWN: &str = "shutdown";
/// Shutdown outranks anything a producer can reasonably queue.
pub const SHUTDOWN_PRIORITY: i32 = 10_000;

pub fn shutdown_event() -> stagehand_events::Result<Event> {
    Event::new(EVENT_SHUTDOWN, SHUTDOWN_PRIORITY)
}

/// The daemon's always-on hooks: a low-priority observer that traces every
/// dispatched event after the interested hooks ran.
pub fn register_standard_hooks(dispatcher: &EventDispatcher) -> stagehand_events::Result<()> {
    dispatcher.register_hook(Hook::simple(
        "event-log",
        -10_000,
        ExecType::OnEvent,
        |event| {
            if let Some(event) = event {
                debug!(
                    event = %event.type_tag(),
                    priority = event.priority(),
                    "event dispatched"
                );
            }
        },
    ))
}

/// Batch terminal that stops the dispatcher once the shutdown event has been
/// fully processed, then tells the main task it is safe to exit.
pub fn register_shutdown_hook(
    dispatcher: &Arc<EventDispatcher>,
    stopped: oneshot::Sender<()>,
) -> stagehand_events::Result<()> {
    let weak = Arc::downgrade(dispatcher);
    let stopped = Mutex::new(Some(stopped));
    dispatcher.register_hook(
        Hook::simple("shutdown", SHUTDOWN_PRIORITY, ExecType::AfterEvents, move |_| {
            info!("shutdown batch drained, stopping dispatcher");
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.stop();
            }
            if let Some(tx) = stopped.lock().expect("shutdown signal poisoned").take() {
                let _ = tx.send(());
            }
        })
        .with_interest(Interest::compile([Constraint::equals(
            SubjectKind::EventProperty,
            "event.type",
            EVENT_SHUTDOWN,
        )])?),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::{Core, StagehandConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_event_stops_the_dispatcher() {
        let core = Core::new(StagehandConfig::default());
        let dispatcher = EventDispatcher::get_instance(&core);

        let (tx, rx) = oneshot::channel();
        register_standard_hooks(&dispatcher).unwrap();
        register_shutdown_hook(&dispatcher, tx).unwrap();

        dispatcher.push_event(shutdown_event().unwrap());
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("dispatcher never acknowledged shutdown")
            .expect("shutdown hook dropped the signal");
    }
}
