//! User-facing account operations

pub mod daily;
pub mod handlers;
pub mod referral;
