//! API utility functions
//!
//! Request validation and SSE formatting shared by the handlers.

use crate::error::AppError;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;

/// Validate query string
///
/// # Arguments
/// * `query` - Query string to validate
/// * `max_length` - Maximum length in characters after trimming
///
/// # Returns
/// * `Ok(())` - Query is valid
/// * `Err(AppError)` - Query is invalid (empty or too long)
pub fn validate_query(query: &str, max_length: usize) -> Result<(), AppError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidQuery("Query cannot be empty".to_string()));
    }
    if trimmed.chars().count() > max_length {
        return Err(AppError::InvalidQuery(format!(
            "Query exceeds maximum length of {} characters",
            max_length
        )));
    }
    Ok(())
}

/// Format a stream into SSE (Server-Sent Events) frames
///
/// Each item becomes `data: <content>\n\n`; errors are sent in-band with the
/// `[ERROR]` prefix so the stream itself never fails.
pub fn format_sse_stream<E: Display>(
    stream: impl Stream<Item = Result<String, E>> + Send + 'static,
) -> impl Stream<Item = Result<String, std::io::Error>> + Send + 'static {
    stream.map(|event_result| {
        let sse_text = match event_result {
            Ok(data) => format!("data: {}\n\n", data),
            Err(e) => format!(
                "data: {} {}\n\n",
                crate::orchestrator::constants::SSE_ERROR_PREFIX,
                e
            ),
        };
        Ok::<_, std::io::Error>(sse_text)
    })
}
