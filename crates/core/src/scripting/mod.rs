//! Command and script execution.
//!
//! - [`subprocess`]: the Process Runner (spawn, bounded capture, timeout,
//!   process-group kill).
//! - [`artifact`] and [`language`]: the Script Materializer (language
//!   detection, scoped script files, interpreter selection).
//! - [`orchestrator`]: one request end to end, including identity switching.
//!
//! Nothing here knows about HTTP; the `api` crate maps these types to wire
//! formats.

pub mod artifact;
pub mod executor;
pub mod invocation;
pub mod language;
pub mod orchestrator;
pub mod subprocess;
