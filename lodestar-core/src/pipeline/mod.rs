//! Pipeline subsystem — the session state machine and its coordinator.

pub mod coordinator;
pub mod session;

pub use coordinator::{PipelineCoordinator, PipelineStatus};
pub use session::{SearchSession, Stage};
