//! Request handlers.
//!
//! Handlers validate the request shape, delegate to the Security Manager or
//! the execution [`Orchestrator`](aiops_core::scripting::orchestrator::Orchestrator)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod auth;
pub mod exec;
pub mod users;
