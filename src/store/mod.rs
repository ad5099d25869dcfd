//! Data store modules for Firebase Realtime Database integration

pub mod database;
pub mod firebase;
pub mod ledger;
pub mod memory;
#[cfg(test)]
pub mod testing;
pub mod users;

pub use database::{Database, StoreError};
pub use firebase::FirebaseClient;
pub use ledger::{Ledger, LedgerEntry};
pub use memory::MemoryDatabase;
pub use users::{UserRecord, UserStore};
