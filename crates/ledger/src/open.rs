use crate::schema::MIG_0001_INIT;
use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::Mutex;

/// Handle to the ledger database. The connection sits behind a mutex; every
/// mutation happens inside an explicit [`Db::transaction`] scope.
pub struct Db {
    conn: Mutex<Connection>,
}

/// One transaction scope. Dropping it without returning `Ok` rolls back.
pub struct Tx<'c> {
    pub(crate) tx: Transaction<'c>,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("opening ledger {}", path.display()))?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    /// Runs `f` inside an IMMEDIATE transaction and commits if it succeeds.
    pub fn transaction<T>(&self, f: impl FnOnce(&Tx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| anyhow!("ledger connection poisoned"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let scope = Tx { tx };
        let out = f(&scope)?;
        scope.tx.commit()?;
        Ok(out)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000i64)?;
    conn.pragma_update(None, "cache_size", -65536i64)?; // 64 MiB
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    // naive: if runs table doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='runs'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        tracing::debug!("initializing ledger schema");
        conn.execute_batch(MIG_0001_INIT).context("applying ledger schema")?;
    }
    Ok(())
}
