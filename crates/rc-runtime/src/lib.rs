//! Container lifecycle for the `rc` runtime.
//!
//! A container is a supervisor process bootstrapped into fresh namespaces.
//! It waits on a Unix socket for lifecycle commands until START replaces it
//! with the registered init command. The [`engine::Engine`] is the
//! controller side: it observes which phase a container is in and either
//! forwards a command to the supervisor or acts on the running init itself.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod channel;
pub mod container;
pub mod engine;
pub mod exec;
pub mod lifecycle;
pub mod process;
pub mod state;
pub mod supervisor;
