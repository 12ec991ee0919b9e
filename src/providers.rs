//! Transport implementations.

pub mod functions;

// Re-export for convenience
pub use functions::FunctionsClient;
