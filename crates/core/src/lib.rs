//! Execution domain for the AIOps agent.
//!
//! Everything needed to turn a validated request into an [`ExecutionResult`]
//! lives here: identity switching, process lifecycle, and script
//! materialization. No HTTP or authentication concerns leak into this crate.
//!
//! [`ExecutionResult`]: scripting::executor::ExecutionResult

pub mod error;
pub mod identity;
pub mod platform;
pub mod scripting;
