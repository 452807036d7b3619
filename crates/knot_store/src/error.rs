use thiserror::Error;

/// Boxed error returned by fallible assigners
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building a store or dispatching to it
#[derive(Debug, Error)]
pub enum StoreError {
    /// An assigner rejected the event; nothing was committed
    #[error("assigner for `{event_type}` failed: {source}")]
    Assign {
        event_type: String,
        #[source]
        source: BoxError,
    },

    /// Two transitions were registered for the same event type
    #[error("transition for `{0}` registered more than once")]
    DuplicateTransition(String),

    #[error("event type must not be empty")]
    EmptyEventType,

    /// Tag outside the event's closed tag set
    #[error("transition registered for unknown event type `{0}`")]
    UnknownEventType(String),

    /// A dynamic event could not be parsed
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("invalid store config: {0}")]
    Config(#[from] toml::de::Error),
}

impl StoreError {
    /// Event type of the dispatch that failed, if any
    pub fn event_type(&self) -> Option<&str> {
        match self {
            StoreError::Assign { event_type, .. } => Some(event_type),
            StoreError::DuplicateTransition(event_type)
            | StoreError::UnknownEventType(event_type) => Some(event_type),
            _ => None,
        }
    }
}
