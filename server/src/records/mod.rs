//! The relational record of past matches and player standings. Talks to
//! the live-state core only through the read-only summary cache.

pub mod elo;
pub mod store;
pub mod summary;
