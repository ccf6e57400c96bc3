//! Commonly used types and traits.
//!
//! This module re-exports the most commonly used items from the crate.
//! Import this module to get started with the basic actor functionality.

pub use super::actor::{
    Actor,      // Core actor trait
    ActorCell,  // An actor bound into a group
    ActorError, // Errors raised while reacting
    Dispatch,   // Outcome of offering a message to an actor
};
pub use super::config::{Config, RetryPolicy};
pub use super::context::Context; // Actor context for sending and spawning
pub use super::driver::{Driver, DriverError, DriverHandle, DriverStats};
pub use super::group::{DeliveryError, Group, GroupError};
pub use super::id::ActorId; // Address of an actor within a group
pub use super::message::{Message, Payload};
