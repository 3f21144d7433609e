//! HTTP middleware

pub mod correlation_id;

pub use correlation_id::{CORRELATION_ID_HEADER, correlation_id_middleware};
