// State management module
// Holds the shared pipeline and report output location

pub mod app_state;

pub use app_state::{AppState, SharedState};
