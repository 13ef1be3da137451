//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the store and federation operations.

mod actors;

pub use actors::ActorService;
