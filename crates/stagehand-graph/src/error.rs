use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Two remote objects claimed the same bound id; the registry is confused.
    #[error("Object {id} is already mirrored")]
    DuplicateObject { id: u32 },

    /// A departure notification for an object that was never admitted.
    #[error("Object {id} is not mirrored")]
    UnknownObject { id: u32 },
}

pub type Result<T> = std::result::Result<T, GraphError>;
