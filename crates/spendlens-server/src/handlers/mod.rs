//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod analysis;
pub mod ask;
pub mod health;
pub mod sessions;

// Re-export all handlers for use in router
pub use analysis::*;
pub use ask::*;
pub use health::*;
pub use sessions::*;

use crate::{AppError, SessionError};

/// Map a session lookup failure to its HTTP response
pub(crate) fn session_error(err: SessionError) -> AppError {
    match err {
        SessionError::NotFound => AppError::not_found("Session not found"),
        SessionError::Expired => AppError::gone("Session expired"),
    }
}
