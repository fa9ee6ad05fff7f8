use std::sync::Arc;

/// Domain object attached to an event, queried by interest constraints.
///
/// This is the seam that replaces dynamic property reflection: the dispatcher
/// is generic over anything that can answer a property or attribute lookup.
/// Graph objects implement it; tests implement it with plain structs.
pub trait Subject: Send + Sync {
    /// Value from the subject's property bag.
    fn property(&self, key: &str) -> Option<String>;

    /// Named attribute outside the property bag (e.g. `"bound-id"`).
    fn attribute(&self, name: &str) -> Option<String>;
}

pub type SubjectHandle = Arc<dyn Subject>;
