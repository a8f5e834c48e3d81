//! Persistence: pool setup, account/session lookups, the TTL claims cache and
//! the durable claims table.
//!
//! - `model`: row types returned by the lookups.
//! - `repo`: pool, migrations and SQL-only lookups.
//! - `cache`: [`ClaimsCache`], TTL-indexed canonical records.
//! - `store`: [`ClaimsStore`], permanent last-write-wins records.

pub mod cache;
pub mod model;
pub mod repo;
pub mod store;

pub use repo::*;

pub use cache::{CacheWrite, CachedClaims, ClaimsCache};
pub use model::AccountRow;
pub use store::ClaimsStore;
