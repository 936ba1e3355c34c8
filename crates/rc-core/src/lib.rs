//! # rc-core
//!
//! Low-level Linux isolation primitives for the rc runtime.
//!
//! This crate provides safe abstractions over:
//! - **Bootstrap**: `clone(2)` into a fresh namespace set on a per-call stack,
//!   gated until the controller has finished preparing the child.
//! - **Namespaces**: PID, mount, network, user, and UTS isolation flags,
//!   user-namespace ID maps, and hostname isolation.
//! - **Filesystem**: mount propagation and the container's `/proc`.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod bootstrap;
pub mod filesystem;
pub mod namespace;
