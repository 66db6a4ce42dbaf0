//! Pharma Insights Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod services;
/// Application state management
///
/// Holds the shared pipeline and the reports directory.
pub mod state;
