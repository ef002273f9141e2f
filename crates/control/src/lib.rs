//! The interactive control surface: a line-oriented TCP server dispatching
//! operator commands onto the `ControlSurface` façade, per SPEC_FULL §6's
//! "[ADDED] Control surface transport" — plain text over TCP, not HTTP,
//! matching spec.md §1's mention of "the interactive CLI telnet surface".

pub mod commands;
pub mod format;
pub mod server;

pub use server::TelnetServer;
