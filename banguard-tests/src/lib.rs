//! Test utilities for the banguard workspace
//!
//! This crate provides a scripted command runner standing in for every
//! external collaborator, and a throwaway host root to provision into.

pub mod helpers;

pub use helpers::scripted_runner::{Response, ScriptedRunner};
pub use helpers::test_host::TestHost;
