//! Small helpers shared by the process-lifecycle crates.
//!
//! [`InvokeOnDrop`] is the rollback guard used while a multi-step construction
//! (fork, exec) is still allowed to fail: every acquired resource is wrapped in
//! a guard whose closure releases it, and the guards are disarmed once the
//! construction commits.

#![cfg_attr(not(test), no_std)]

mod invoke_on_drop;

pub use invoke_on_drop::*;
