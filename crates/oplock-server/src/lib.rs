//! HTTP/JSON service arbitrating add/delete operations on dashboard data.
//!
//! Editing sessions ask whether an operation on a `(kpi, department)` scope
//! is blocked, take and release locks, and operators inspect the lock table.
//! This crate contains the [`LockCoordinator`](coordinator::LockCoordinator),
//! API schema types, error handling, configuration, and route definitions.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
