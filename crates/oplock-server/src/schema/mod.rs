//! API schema types for request/response definitions.
//!
//! Types use serde derives for JSON serialization/deserialization; handlers
//! map between these and coordinator types.

pub mod locks;
