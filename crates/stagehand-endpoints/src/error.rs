use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    /// Registering a factory under a name the registry already holds.
    #[error("Factory already registered: {name}")]
    DuplicateFactory { name: String },

    /// `make` with a name nobody registered.
    #[error("No such factory: {name}")]
    UnknownFactory { name: String },

    /// The factory could not build its endpoint.
    #[error("Factory '{factory}' failed: {reason}")]
    CreationFailed { factory: String, reason: String },

    /// The creation properties lack a required key.
    #[error("Missing endpoint property: {key}")]
    MissingProperty { key: String },
}

impl From<EndpointError> for stagehand_core::StagehandError {
    fn from(err: EndpointError) -> Self {
        let factory = match &err {
            EndpointError::DuplicateFactory { name }
            | EndpointError::UnknownFactory { name }
            | EndpointError::CreationFailed { factory: name, .. } => name.clone(),
            EndpointError::MissingProperty { .. } => String::new(),
        };
        stagehand_core::StagehandError::Endpoint {
            factory,
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EndpointError>;
