// Core error types and shared utilities

pub mod error;
pub mod utils;

pub use error::{EngineError, ErrorKind, classify_transport_error};
pub use utils::ErrorUtils;
