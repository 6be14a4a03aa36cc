//! Shared error types for the dbflow workflow compiler.

mod error;

pub use error::{WorkflowError, WorkflowResult};
