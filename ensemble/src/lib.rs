//! Try-lock guarded actors.
//!
//! An actor reacts to one message at a time. Instead of queueing work behind
//! a busy actor, offering it a message while it is already reacting returns
//! immediately with the message handed back; the caller decides whether to
//! retry, drop or reroute it. Actors live in a [`Group`](prelude::Group),
//! which assigns their ids, routes messages between them and lets them spawn
//! new actors.
mod actor;
mod config;
mod context;
mod driver;
mod group;
mod id;
mod message;
pub mod prelude;
#[cfg(test)]
mod test_utils;

pub use prelude::*;
