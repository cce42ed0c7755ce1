//! Core types shared by every subsystem.

pub mod error;

pub use error::{ErrorContext, ErrorPayload, SiteError, is_transient, user_friendly_error};
