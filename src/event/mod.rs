//! Event model: typed payloads and the kind registry.

/// Event and payload definitions.
pub mod payload;
/// Kind name to payload constructor registry.
pub mod registry;

pub use payload::{Event, EventPayload, PayloadKind};
pub use registry::{constructor, CaptureMap, EventRegistry, PayloadConstructor};
