//! SQLite-backed ledger of targets, commands and derived entities.

mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use models::*;
pub use open::{Db, Tx};
pub use query::CommandFilter;

/// Wall clock in unix milliseconds.
pub fn now_ms() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as i64
}
