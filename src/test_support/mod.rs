//! Test support infrastructure.
//!
//! Only compiled for unit tests. Nothing here may be referenced by runtime code.

#![cfg(test)]

pub mod scripted;
pub mod streaming_fixtures;

pub use scripted::{Script, ScriptedTransport};
