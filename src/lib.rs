// ABOUTME: Library crate for rig exposing the reconciliation and attach API for the CLI and tests

pub mod config;
pub mod docker;
pub mod dockerfile;
pub mod error;
pub mod project;
pub mod session;
pub mod terminal;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::SessionError;
