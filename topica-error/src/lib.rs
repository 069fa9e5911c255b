pub mod ext;
pub mod status_code;
pub mod types;

// Publicly re-export all error types so callers can depend on the crate root.
pub use ext::*;
pub use status_code::*;
pub use types::*;

pub type TopicaResult<T> = Result<T, PubSubError>;
