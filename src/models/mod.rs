//! Data models shared by the store backend, the workers and the invocation
//! layer.
//!
//! Store-side rows map to SQLite via `sqlx::FromRow`; invocation payloads
//! serialize as JSON via `serde`.

pub mod batch;
pub mod bucket;
pub mod object;
pub mod report;
pub mod request;
pub mod response;
