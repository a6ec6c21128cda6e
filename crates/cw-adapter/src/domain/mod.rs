//! Domain model
//!
//! Minimal object model for the values that cross the webhook boundary:
//! class-tagged objects, partial-update operators and handler payloads.

mod object;
mod payload;
mod update;

pub use object::{DomainObject, SharedObject};
pub use payload::Payload;
pub use update::FieldOp;
