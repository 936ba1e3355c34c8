//! Filesystem setup inside the container's mount namespace.

pub mod mount;
