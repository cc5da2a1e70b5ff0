//! Data models shared by all engines.

pub mod config;
pub mod document;
pub mod lenient;
pub mod result;
pub mod schema;
