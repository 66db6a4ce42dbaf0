//! Orchestrator constants

/// SSE stream termination signal
pub const SSE_DONE_SIGNAL: &str = "[DONE]";

/// SSE error prefix
pub const SSE_ERROR_PREFIX: &str = "[ERROR]";

/// URL path generated reports are served under
pub const REPORTS_URL_PREFIX: &str = "/reports";
