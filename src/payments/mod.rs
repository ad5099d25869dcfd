//! Payment provider webhooks and investment accrual

pub mod matching;
pub mod moniepoint;
pub mod paystack;
pub mod reconcile;
pub mod signature;
pub mod tiers;
pub mod webhook;

pub use reconcile::Reconciler;
