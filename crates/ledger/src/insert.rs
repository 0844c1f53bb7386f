use crate::{now_ms, CommandId, EntityKind, ExecutionRecord, RunMeta, SourceId, TargetId, Tx};
use anyhow::Result;
use recon_core::{CommandRequest, DerivedEntity, Target};
use rusqlite::params;
use uuid::Uuid;

impl Tx<'_> {
    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.tx.execute(
            "INSERT INTO runs(run_id, started_at, tool_version, args_json) VALUES (?,?,?,?)",
            params![meta.run_id.to_string(), meta.started_at, meta.tool_version, meta.args_json],
        )?;
        Ok(meta.run_id)
    }

    pub fn finish_run(&self, run_id: &Uuid, executed: i64, failed: i64) -> Result<()> {
        self.tx.execute(
            "UPDATE runs SET finished_at=?, executed_count=?, failed_count=? WHERE run_id=?",
            params![now_ms(), executed, failed, run_id.to_string()],
        )?;
        Ok(())
    }

    pub fn source_id(&self, name: &str) -> Result<SourceId> {
        self.tx.execute("INSERT INTO sources(name) VALUES (?) ON CONFLICT(name) DO NOTHING", [name])?;
        let id = self.tx.query_row("SELECT source_id FROM sources WHERE name=?", [name], |r| r.get(0))?;
        Ok(id)
    }

    fn upsert_host(&self, address: &str) -> Result<i64> {
        self.tx.execute("INSERT INTO hosts(address) VALUES (?) ON CONFLICT(address) DO NOTHING", [address])?;
        let id = self.tx.query_row("SELECT host_id FROM hosts WHERE address=?", [address], |r| r.get(0))?;
        Ok(id)
    }

    /// Inserts the target (and its host, for services) if absent. A known
    /// service keeps its scanner-reported name unless a new one is supplied.
    pub fn upsert_target(&self, target: &Target) -> Result<TargetId> {
        let mut stored = target.clone();
        let (host_id, service_id, domain_id) = match &mut stored {
            Target::Host(h) => (Some(self.upsert_host(&h.address.to_string())?), None, None),
            Target::Service(s) => {
                let host_id = self.upsert_host(&s.host.address.to_string())?;
                self.tx.execute(
                    "INSERT INTO services(host_id,protocol,port,name) VALUES (?,?,?,?)
                     ON CONFLICT(host_id,protocol,port) DO UPDATE SET name=COALESCE(excluded.name,services.name)",
                    params![host_id, s.protocol.as_str(), s.port as i64, s.name],
                )?;
                let (service_id, name): (i64, Option<String>) = self.tx.query_row(
                    "SELECT service_id, name FROM services WHERE host_id=? AND protocol=? AND port=?",
                    params![host_id, s.protocol.as_str(), s.port as i64],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?;
                s.name = name;
                (None, Some(service_id), None)
            }
            Target::Domain(d) => {
                self.tx.execute("INSERT INTO domains(name) VALUES (?) ON CONFLICT(name) DO NOTHING", [&d.name])?;
                let id: i64 = self.tx.query_row("SELECT domain_id FROM domains WHERE name=?", [&d.name], |r| r.get(0))?;
                (None, None, Some(id))
            }
        };
        self.tx.execute(
            "INSERT INTO targets(target_key,kind,host_id,service_id,domain_id,target_json) VALUES (?,?,?,?,?,?)
             ON CONFLICT(target_key) DO UPDATE SET target_json=excluded.target_json",
            params![
                stored.key(),
                stored.kind().as_str(),
                host_id,
                service_id,
                domain_id,
                serde_json::to_string(&stored)?
            ],
        )?;
        let id = self.tx.query_row("SELECT target_id FROM targets WHERE target_key=?", [stored.key()], |r| r.get(0))?;
        Ok(id)
    }

    /// Atomic find-or-insert on (collector, target, invocation). Returns the
    /// command id and whether this call created it.
    pub fn get_or_create_command(
        &self,
        collector: &str,
        target_id: TargetId,
        request: &CommandRequest,
    ) -> Result<(CommandId, bool)> {
        let source_id = self.source_id(collector)?;
        let invocation = request.canonical();
        let inserted = self.tx.execute(
            "INSERT INTO commands(collector,source_id,target_id,invocation_json,status,created_ms) VALUES (?,?,?,?,'pending',?)
             ON CONFLICT(collector,target_id,invocation_json) DO NOTHING",
            params![collector, source_id, target_id, invocation, now_ms()],
        )?;
        let id = self.tx.query_row(
            "SELECT command_id FROM commands WHERE collector=? AND target_id=? AND invocation_json=?",
            params![collector, target_id, invocation],
            |r| r.get(0),
        )?;
        Ok((id, inserted == 1))
    }

    /// Pending -> Running. Returns false if the command was not pending, in
    /// which case it must not be executed.
    pub fn mark_running(&self, id: CommandId, run_id: &Uuid) -> Result<bool> {
        let n = self.tx.execute(
            "UPDATE commands SET status='running', started_ms=?, run_id=? WHERE command_id=? AND status='pending'",
            params![now_ms(), run_id.to_string(), id],
        )?;
        Ok(n == 1)
    }

    /// Running -> terminal. Returns false if the command was not running.
    pub fn complete_command(&self, id: CommandId, record: &ExecutionRecord) -> Result<bool> {
        let failure = record.failure.as_ref();
        let n = self.tx.execute(
            "UPDATE commands SET status=?, stdout=?, stderr=?, exit_code=?, status_code=?, failure_code=?, failure_detail=?, finished_ms=?
             WHERE command_id=? AND status='running'",
            params![
                record.status.as_str(),
                record.output.stdout,
                record.output.stderr,
                record.output.exit_code,
                record.output.status_code.or_else(|| failure.and_then(|f| f.status_code())),
                failure.map(|f| f.code()),
                failure.map(|f| f.detail()),
                now_ms(),
                id
            ],
        )?;
        Ok(n == 1)
    }

    /// Commands left running by an earlier, interrupted run. They are closed
    /// as failed; they never go back to pending.
    pub fn fail_interrupted(&self, current_run: &Uuid) -> Result<usize> {
        let n = self.tx.execute(
            "UPDATE commands SET status='failed', failure_code='process-killed', failure_detail='interrupted before completion', finished_ms=?
             WHERE status='running' AND (run_id IS NULL OR run_id<>?)",
            params![now_ms(), current_run.to_string()],
        )?;
        Ok(n)
    }

    pub fn mark_normalized(&self, id: CommandId) -> Result<()> {
        self.tx.execute("UPDATE commands SET normalized_ms=? WHERE command_id=?", params![now_ms(), id])?;
        Ok(())
    }

    /// Insert-if-absent on the entity's uniqueness key, then records which
    /// source saw it. Returns true if the entity row is new.
    pub fn insert_entity(
        &self,
        target_id: TargetId,
        source_id: SourceId,
        command_id: CommandId,
        entity: &DerivedEntity,
    ) -> Result<bool> {
        let (kind, inserted, entity_id) = match entity {
            DerivedEntity::Path { name } => {
                let (id, new) = self.insert_path(target_id, name)?;
                (EntityKind::Path, new, id)
            }
            DerivedEntity::Query { path, query } => {
                let (path_id, _) = self.insert_path(target_id, path)?;
                let n = self.tx.execute(
                    "INSERT INTO queries(path_id,query) VALUES (?,?) ON CONFLICT(path_id,query) DO NOTHING",
                    params![path_id, query],
                )?;
                let id = self.tx.query_row(
                    "SELECT query_id FROM queries WHERE path_id=? AND query=?",
                    params![path_id, query],
                    |r| r.get(0),
                )?;
                (EntityKind::Query, n == 1, id)
            }
            DerivedEntity::HostName { name } => {
                let n = self.tx.execute(
                    "INSERT INTO host_names(target_id,name) VALUES (?,?) ON CONFLICT(target_id,name) DO NOTHING",
                    params![target_id, name],
                )?;
                let id = self.tx.query_row(
                    "SELECT host_name_id FROM host_names WHERE target_id=? AND name=?",
                    params![target_id, name],
                    |r| r.get(0),
                )?;
                (EntityKind::HostName, n == 1, id)
            }
            DerivedEntity::DnsRecord { name, record, value } => {
                let n = self.tx.execute(
                    "INSERT INTO dns_records(target_id,name,record_type,value) VALUES (?,?,?,?)
                     ON CONFLICT(target_id,name,record_type,value) DO NOTHING",
                    params![target_id, name, record.as_str(), value],
                )?;
                let id = self.tx.query_row(
                    "SELECT record_id FROM dns_records WHERE target_id=? AND name=? AND record_type=? AND value=?",
                    params![target_id, name, record.as_str(), value],
                    |r| r.get(0),
                )?;
                (EntityKind::DnsRecord, n == 1, id)
            }
            DerivedEntity::Finding { kind, value } => {
                let n = self.tx.execute(
                    "INSERT INTO findings(target_id,kind,value) VALUES (?,?,?) ON CONFLICT(target_id,kind,value) DO NOTHING",
                    params![target_id, kind, value],
                )?;
                let id = self.tx.query_row(
                    "SELECT finding_id FROM findings WHERE target_id=? AND kind=? AND value=?",
                    params![target_id, kind, value],
                    |r| r.get(0),
                )?;
                (EntityKind::Finding, n == 1, id)
            }
        };
        self.tx.execute(
            "INSERT INTO provenance(entity_kind,entity_id,source_id,command_id) VALUES (?,?,?,?)
             ON CONFLICT(entity_kind,entity_id,source_id) DO NOTHING",
            params![kind.as_str(), entity_id, source_id, command_id],
        )?;
        Ok(inserted)
    }

    fn insert_path(&self, target_id: TargetId, name: &str) -> Result<(i64, bool)> {
        let n = self.tx.execute(
            "INSERT INTO paths(target_id,name) VALUES (?,?) ON CONFLICT(target_id,name) DO NOTHING",
            params![target_id, name],
        )?;
        let id = self
            .tx
            .query_row("SELECT path_id FROM paths WHERE target_id=? AND name=?", params![target_id, name], |r| r.get(0))?;
        Ok((id, n == 1))
    }
}
