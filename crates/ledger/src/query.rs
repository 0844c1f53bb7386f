use crate::{CommandId, CommandRow, TargetId, Tx};
use anyhow::{bail, Result};
use recon_core::{CapturedOutput, CommandStatus, DerivedEntity, FailureCause, RecordType, Target, TargetKind};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const COUNTABLE: &[&str] = &[
    "runs",
    "sources",
    "hosts",
    "services",
    "domains",
    "targets",
    "commands",
    "paths",
    "queries",
    "host_names",
    "dns_records",
    "findings",
    "provenance",
];

const COMMAND_COLUMNS: &str = "c.command_id, c.collector, c.target_id, t.target_json, c.invocation_json, c.status,
     c.stdout, c.stderr, c.exit_code, c.status_code, c.failure_code, c.failure_detail, c.run_id,
     c.created_ms, c.started_ms, c.finished_ms, c.normalized_ms";

/// Which commands a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFilter<'a> {
    /// Pending commands, oldest first.
    Pending(Option<&'a str>),
    /// Completed commands whose output has not been normalized yet.
    Unnormalized(Option<&'a str>),
    /// All completed commands, for re-analysis.
    Completed(Option<&'a str>),
    /// Every command regardless of state.
    All(Option<&'a str>),
}

impl Tx<'_> {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.tx.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        if !COUNTABLE.contains(&table) {
            bail!("unknown ledger table: {table}");
        }
        let n = self.tx.query_row(&format!("SELECT COUNT(1) FROM {table}"), [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn command(&self, id: CommandId) -> Result<Option<CommandRow>> {
        let sql = format!(
            "SELECT {COMMAND_COLUMNS} FROM commands c JOIN targets t ON t.target_id=c.target_id WHERE c.command_id=?"
        );
        let row = self.tx.query_row(&sql, [id], command_row).optional()?;
        Ok(row)
    }

    pub fn commands(&self, filter: CommandFilter<'_>) -> Result<Vec<CommandRow>> {
        let (cond, collector) = match filter {
            CommandFilter::Pending(c) => ("c.status='pending'", c),
            CommandFilter::Unnormalized(c) => ("c.status='completed' AND c.normalized_ms IS NULL", c),
            CommandFilter::Completed(c) => ("c.status='completed'", c),
            CommandFilter::All(c) => ("1=1", c),
        };
        let sql = format!(
            "SELECT {COMMAND_COLUMNS} FROM commands c JOIN targets t ON t.target_id=c.target_id
             WHERE {cond} AND (?1 IS NULL OR c.collector=?1) ORDER BY c.command_id"
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map([collector], command_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Per collector and status command counts.
    pub fn status_counts(&self) -> Result<Vec<(String, CommandStatus, i64)>> {
        let mut stmt = self
            .tx
            .prepare("SELECT collector, status, COUNT(1) FROM commands GROUP BY collector, status ORDER BY collector, status")?;
        let rows = stmt
            .query_map([], |r| {
                let status: String = r.get(1)?;
                Ok((r.get(0)?, parse_text(1, &status)?, r.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn targets(&self, kind: Option<TargetKind>) -> Result<Vec<(TargetId, Target)>> {
        let mut stmt = self
            .tx
            .prepare("SELECT target_id, target_json FROM targets WHERE (?1 IS NULL OR kind=?1) ORDER BY target_id")?;
        let rows = stmt
            .query_map([kind.map(|k| k.as_str())], |r| {
                let json: String = r.get(1)?;
                Ok((r.get(0)?, parse_json(1, &json)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn paths_for(&self, target_id: TargetId) -> Result<Vec<String>> {
        let mut stmt = self.tx.prepare("SELECT name FROM paths WHERE target_id=? ORDER BY name")?;
        let rows = stmt.query_map([target_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn queries_for(&self, target_id: TargetId) -> Result<Vec<(String, String)>> {
        let mut stmt = self.tx.prepare(
            "SELECT p.name, q.query FROM queries q JOIN paths p ON p.path_id=q.path_id
             WHERE p.target_id=? ORDER BY p.name, q.query",
        )?;
        let rows = stmt
            .query_map([target_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn host_names_for(&self, target_id: TargetId) -> Result<Vec<String>> {
        let mut stmt = self.tx.prepare("SELECT name FROM host_names WHERE target_id=? ORDER BY name")?;
        let rows = stmt.query_map([target_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn dns_records_for(&self, target_id: TargetId) -> Result<Vec<(String, RecordType, String)>> {
        let mut stmt = self.tx.prepare(
            "SELECT name, record_type, value FROM dns_records WHERE target_id=? ORDER BY name, record_type, value",
        )?;
        let rows = stmt
            .query_map([target_id], |r| {
                let record: String = r.get(1)?;
                Ok((r.get(0)?, parse_text(1, &record)?, r.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn findings_for(&self, target_id: TargetId) -> Result<Vec<(String, String)>> {
        let mut stmt = self.tx.prepare("SELECT kind, value FROM findings WHERE target_id=? ORDER BY kind, value")?;
        let rows = stmt
            .query_map([target_id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Everything derived for a target, in a stable order.
    pub fn entities_for(&self, target_id: TargetId) -> Result<Vec<DerivedEntity>> {
        let mut out: Vec<DerivedEntity> = self.paths_for(target_id)?.into_iter().map(DerivedEntity::path).collect();
        out.extend(self.queries_for(target_id)?.into_iter().map(|(p, q)| DerivedEntity::query(p, q)));
        out.extend(self.host_names_for(target_id)?.into_iter().map(|name| DerivedEntity::HostName { name }));
        out.extend(
            self.dns_records_for(target_id)?
                .into_iter()
                .map(|(name, record, value)| DerivedEntity::DnsRecord { name, record, value }),
        );
        out.extend(self.findings_for(target_id)?.into_iter().map(|(k, v)| DerivedEntity::finding(k, v)));
        Ok(out)
    }

    /// Names of the sources that reported the given path.
    pub fn path_sources(&self, target_id: TargetId, path: &str) -> Result<Vec<String>> {
        let mut stmt = self.tx.prepare(
            "SELECT s.name FROM provenance pv
             JOIN paths p ON p.path_id=pv.entity_id AND pv.entity_kind='path'
             JOIN sources s ON s.source_id=pv.source_id
             WHERE p.target_id=? AND p.name=? ORDER BY s.name",
        )?;
        let rows = stmt
            .query_map(params![target_id, path], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conversion_error(idx, e))
}

fn parse_text<T: std::str::FromStr<Err = String>>(idx: usize, s: &str) -> rusqlite::Result<T> {
    s.parse().map_err(|e: String| conversion_error(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

fn command_row(r: &Row<'_>) -> rusqlite::Result<CommandRow> {
    let target_json: String = r.get(3)?;
    let invocation: String = r.get(4)?;
    let status: String = r.get(5)?;
    let status_code: Option<u16> = r.get(9)?;
    let failure_code: Option<String> = r.get(10)?;
    let failure_detail: Option<String> = r.get(11)?;
    let run_id: Option<String> = r.get(12)?;
    let failure = failure_code
        .and_then(|code| FailureCause::from_parts(&code, failure_detail.as_deref().unwrap_or_default(), status_code));
    let run_id = match run_id {
        Some(s) => Some(Uuid::parse_str(&s).map_err(|e| conversion_error(12, e))?),
        None => None,
    };
    Ok(CommandRow {
        id: r.get(0)?,
        collector: r.get(1)?,
        target_id: r.get(2)?,
        target: parse_json(3, &target_json)?,
        request: parse_json(4, &invocation)?,
        status: parse_text(5, &status)?,
        output: CapturedOutput {
            stdout: r.get::<_, Option<String>>(6)?.unwrap_or_default(),
            stderr: r.get::<_, Option<String>>(7)?.unwrap_or_default(),
            exit_code: r.get(8)?,
            status_code,
        },
        failure,
        run_id,
        created_ms: r.get(13)?,
        started_ms: r.get(14)?,
        finished_ms: r.get(15)?,
        normalized_ms: r.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::CommandFilter;
    use crate::Db;
    use recon_core::{CommandRequest, DerivedEntity, RecordType, Target, TargetKind};

    #[test]
    fn count_rejects_unknown_tables() {
        let db = Db::open_in_memory().unwrap();
        assert!(db.transaction(|tx| tx.count("sqlite_master; DROP TABLE runs")).is_err());
        assert_eq!(db.transaction(|tx| tx.count("targets")).unwrap(), 0);
    }

    #[test]
    fn filters_by_collector_and_kind() {
        let db = Db::open_in_memory().unwrap();
        let https: Target = "service:10.0.0.1:443/tcp=https".parse().unwrap();
        db.transaction(|tx| {
            let d = tx.upsert_target(&Target::domain("Test.Local."))?;
            let s = tx.upsert_target(&https)?;
            tx.get_or_create_command("dnshost", d, &CommandRequest::process(["host", "test.local"]))?;
            tx.get_or_create_command("httpgobuster", s, &CommandRequest::process(["gobuster", "dir"]))?;
            Ok(())
        })
        .unwrap();
        let pending = db.transaction(|tx| tx.commands(CommandFilter::Pending(Some("dnshost")))).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target, Target::domain("test.local"));
        assert_eq!(db.transaction(|tx| tx.commands(CommandFilter::Pending(None))).unwrap().len(), 2);
        let domains = db.transaction(|tx| tx.targets(Some(TargetKind::Domain))).unwrap();
        assert_eq!(domains.len(), 1);
        assert!(db.transaction(|tx| tx.commands(CommandFilter::Unnormalized(None))).unwrap().is_empty());
    }

    #[test]
    fn entities_come_back_sorted() {
        let db = Db::open_in_memory().unwrap();
        let entities = db
            .transaction(|tx| {
                let t = tx.upsert_target(&Target::domain("test.local"))?;
                let (cmd, _) = tx.get_or_create_command("dnshost", t, &CommandRequest::process(["host"]))?;
                let src = tx.source_id("dnshost")?;
                for e in [
                    DerivedEntity::DnsRecord { name: "test.local".into(), record: RecordType::Mx, value: "mail.test.local".into() },
                    DerivedEntity::DnsRecord { name: "test.local".into(), record: RecordType::A, value: "10.0.0.1".into() },
                    DerivedEntity::host_name("mail.test.local"),
                ] {
                    tx.insert_entity(t, src, cmd, &e)?;
                }
                tx.entities_for(t)
            })
            .unwrap();
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0], DerivedEntity::host_name("mail.test.local"));
        assert!(matches!(&entities[1], DerivedEntity::DnsRecord { record: RecordType::A, .. }));
    }
}
