use std::sync::Arc;

use tracing::{info, warn};

use stagehand_core::Core;
use stagehand_endpoints::{FactoryRegistry, SoftdspFactory};
use stagehand_events::{Constraint, EventDispatcher, Interest, SubjectKind};
use stagehand_graph::ObjectManager;

use crate::hooks;

/// The daemon's long-lived subsystems, kept alive by `main`.
pub struct Daemon {
    pub manager: Arc<ObjectManager>,
    pub factory: Arc<SoftdspFactory>,
}

/// Wire the graph mirror and the endpoint factories to the core's
/// dispatcher.
pub fn install(core: &Arc<Core>) -> anyhow::Result<Daemon> {
    let dispatcher = EventDispatcher::get_instance(core);
    hooks::register_standard_hooks(&dispatcher)?;

    let mut manager = ObjectManager::new();
    // audio devices and nodes, plus the DSP helpers and links the endpoint
    // factory fabricates
    manager.add_interest(Interest::compile([Constraint::matches(
        SubjectKind::SubjectProperty,
        "media.class",
        "Audio/*",
    )])?);
    manager.add_interest(Interest::compile([Constraint::equals(
        SubjectKind::SubjectProperty,
        "node.group",
        stagehand_endpoints::softdsp::DSP_NODE_GROUP,
    )])?);
    manager.add_interest(Interest::compile([Constraint::equals(
        SubjectKind::SubjectAttribute,
        "object-kind",
        "link",
    )])?);

    // config-declared endpoint rules widen the admission set
    for rule in &core.config().endpoints.rules {
        let constraints: stagehand_events::Result<Vec<Constraint>> = rule
            .match_node
            .iter()
            .map(|spec| Constraint::from_match_spec(SubjectKind::SubjectProperty, spec))
            .collect();
        match constraints.and_then(|c| Interest::compile(c)) {
            Ok(interest) => manager.add_interest(interest),
            Err(err) => {
                warn!(factory = %rule.factory, error = %err, "ignoring malformed endpoint rule")
            }
        }
    }

    let manager = manager.install(core);

    let factory = SoftdspFactory::new(core, Arc::clone(&manager));
    FactoryRegistry::get_instance(core).register(factory.clone())?;
    factory.install_hooks(core)?;

    info!(
        rules = core.config().endpoints.rules.len(),
        "graph mirror and endpoint factory installed"
    );
    Ok(Daemon { manager, factory })
}
