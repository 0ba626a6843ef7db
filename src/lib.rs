//! Clipforge - merge video clips into one playable file
//!
//! This library crate exposes the binary's config loading and terminal
//! rendering for integration testing. The engine itself lives in `cf-merge`.

pub mod config;
pub mod render;
