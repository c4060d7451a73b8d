// Each integration test file is compiled as its own independent binary
// crate, each pulling in its own copy of this module. Helpers used by some
// test binaries but not others trigger false "dead code" warnings in the
// binaries that don't call them.
#![allow(dead_code)]

pub mod server;

pub use server::{MockBackend, Proxy};
