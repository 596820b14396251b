//! The orchestration loop and its event protocol.

pub mod failure;
pub mod loop_events;
pub mod orchestrator;

pub use loop_events::LoopEvent;
pub use orchestrator::SessionHandle;
