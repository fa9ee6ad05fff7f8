//! `stagehand-graph` — local mirror of the remote media-graph registry.
//!
//! The [`ObjectManager`] admits remote objects that match its declared
//! interests, keeps an id-keyed snapshot of them, and announces every
//! admission and departure to the event dispatcher (`object-added` /
//! `object-removed`, with the mirrored object attached as the event
//! subject).

pub mod error;
pub mod manager;
pub mod object;

pub use error::GraphError;
pub use manager::{ObjectManager, EVENT_OBJECT_ADDED, EVENT_OBJECT_REMOVED};
pub use object::{GraphObject, ObjectKind};
