//! `stagehand-endpoints` — audio endpoint construction.
//!
//! An endpoint wraps a device node of the media graph and exposes controls
//! (volume, mute) to policy code. Factories are registered by name in the
//! per-core [`FactoryRegistry`]; the bundled [`SoftdspFactory`] additionally
//! hooks the dispatcher so that every announced audio node gets a software
//! DSP chain brought up through a stepped transition and torn down when the
//! node departs.

pub mod error;
pub mod factory;
pub mod softdsp;

pub use error::EndpointError;
pub use factory::{Endpoint, EndpointFactory, FactoryRegistry};
pub use softdsp::{Direction, SoftdspEndpoint, SoftdspFactory, FACTORY_NAME};
