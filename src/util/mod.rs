//! Shared helpers

pub mod ids;
pub mod money;
pub mod rate_limit;
pub mod time;
