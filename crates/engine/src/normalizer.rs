//! Turns captured output of completed commands into derived entities.

use anyhow::Result;
use recon_core::{Collector, ReportItem, Target};
use recon_ledger::{CommandFilter, CommandRow, Db};
use std::sync::Arc;
use tracing::{debug, info};

/// Write-only destination for transient report items.
pub trait ReportSink: Send + Sync {
    fn report(&self, collector: &str, target: &Target, item: &ReportItem);
}

/// Emits report items as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, collector: &str, target: &Target, item: &ReportItem) {
        info!(collector, target = %target, "{}", item.message);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeStats {
    pub commands: usize,
    pub new_entities: usize,
    pub degraded: usize,
}

impl std::ops::AddAssign for NormalizeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.commands += rhs.commands;
        self.new_entities += rhs.new_entities;
        self.degraded += rhs.degraded;
    }
}

pub struct Normalizer {
    db: Arc<Db>,
    sink: Arc<dyn ReportSink>,
}

impl Normalizer {
    pub fn new(db: Arc<Db>, sink: Arc<dyn ReportSink>) -> Self {
        Normalizer { db, sink }
    }

    /// Parses one completed command and merges its entities. Insertion is
    /// keyed on each entity's natural key, so repeating this is harmless.
    pub fn normalize(&self, collector: &dyn Collector, row: &CommandRow) -> Result<NormalizeStats> {
        let name = &collector.descriptor().name;
        let parsed = collector.normalize(&row.target, &row.output);
        if parsed.is_empty() {
            debug!(command_id = row.id, collector = %name, "parse degraded: no entities extracted");
        }
        let new_entities = self.db.transaction(|tx| {
            let source = tx.source_id(name)?;
            let mut new = 0;
            for entity in &parsed.entities {
                if tx.insert_entity(row.target_id, source, row.id, entity)? {
                    new += 1;
                }
            }
            tx.mark_normalized(row.id)?;
            Ok(new)
        })?;
        for item in &parsed.reports {
            self.sink.report(name, &row.target, item);
        }
        Ok(NormalizeStats { commands: 1, new_entities, degraded: usize::from(parsed.is_empty()) })
    }

    /// Normalizes completed commands that never got normalized, e.g. because
    /// an earlier run stopped between completion and parsing.
    pub fn drain(&self, collectors: &[Arc<dyn Collector>]) -> Result<NormalizeStats> {
        self.over(collectors, false)
    }

    /// Re-parses every completed command of the given collectors.
    pub fn reanalyze(&self, collectors: &[Arc<dyn Collector>]) -> Result<NormalizeStats> {
        self.over(collectors, true)
    }

    fn over(&self, collectors: &[Arc<dyn Collector>], all_completed: bool) -> Result<NormalizeStats> {
        let mut stats = NormalizeStats::default();
        for collector in collectors {
            let name = Some(collector.descriptor().name.as_str());
            let filter = if all_completed { CommandFilter::Completed(name) } else { CommandFilter::Unnormalized(name) };
            let rows = self.db.transaction(|tx| tx.commands(filter))?;
            for row in &rows {
                stats += self.normalize(collector.as_ref(), row)?;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ApiRunner, Escalation, Executor, ProcessRunner};
    use crate::materializer::materialize;
    use crate::testing::{FakeTransport, MemorySink, ShellCollector};
    use recon_core::{Capability, CollectorDescriptor, Target};
    use std::collections::HashMap;

    async fn completed_command(db: &Db, collector: &ShellCollector, target: &Target) {
        let run_id = uuid::Uuid::now_v7();
        let meta = recon_ledger::RunMeta { run_id, started_at: 0, tool_version: "t".into(), args_json: "[]".into() };
        db.transaction(|tx| tx.begin_run(&meta)).unwrap();
        materialize(db, collector, target).unwrap();
        let row = db.transaction(|tx| tx.commands(CommandFilter::Pending(None))).unwrap().remove(0);
        db.transaction(|tx| tx.mark_running(row.id, &run_id)).unwrap();
        let exec = Executor::new(
            ProcessRunner::new(Escalation::None, None),
            ApiRunner::new(Arc::new(FakeTransport::default())),
            HashMap::new(),
        );
        let rec = exec.execute(collector, &row.target, &row.request).await;
        db.transaction(|tx| tx.complete_command(row.id, &rec)).unwrap();
    }

    #[tokio::test]
    async fn reanalysis_does_not_duplicate() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let sink = Arc::new(MemorySink::default());
        let collector = ShellCollector::new(
            CollectorDescriptor::new("paths", Capability::Service),
            "printf '/a\\n/b\\n/a\\nreport: hidden path\\n'",
        );
        let target: Target = "service:10.0.0.1:80/tcp".parse().unwrap();
        completed_command(&db, &collector, &target).await;

        let normalizer = Normalizer::new(db.clone(), sink.clone());
        let collectors: Vec<Arc<dyn Collector>> = vec![Arc::new(collector)];
        let first = normalizer.drain(&collectors).unwrap();
        assert_eq!(first, NormalizeStats { commands: 1, new_entities: 2, degraded: 0 });
        assert_eq!(normalizer.drain(&collectors).unwrap().commands, 0);

        let again = normalizer.reanalyze(&collectors).unwrap();
        assert_eq!(again, NormalizeStats { commands: 1, new_entities: 0, degraded: 0 });
        assert_eq!(db.transaction(|tx| tx.count("paths")).unwrap(), 2);
        assert_eq!(sink.items.lock().unwrap().len(), 2);
        assert_eq!(sink.items.lock().unwrap()[0].1.message, "hidden path");
    }

    #[tokio::test]
    async fn degraded_output_leaves_command_completed() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let collector = ShellCollector::new(CollectorDescriptor::new("junk", Capability::Domain), "echo '<<garbage>>'");
        completed_command(&db, &collector, &Target::domain("test.local")).await;
        let normalizer = Normalizer::new(db.clone(), Arc::new(LogSink));
        let stats = normalizer.drain(&[Arc::new(collector) as Arc<dyn Collector>]).unwrap();
        assert_eq!(stats.degraded, 1);
        let row = db.transaction(|tx| tx.commands(CommandFilter::All(None))).unwrap().remove(0);
        assert_eq!(row.status, recon_core::CommandStatus::Completed);
        assert!(row.normalized_ms.is_some());
    }
}
