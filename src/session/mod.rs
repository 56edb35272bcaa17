//! Live voice session: state machine, serialized event loop, resource
//! ownership.

mod engine;
mod events;

pub use engine::SessionEngine;
pub use events::{EngineEvent, SessionState};
