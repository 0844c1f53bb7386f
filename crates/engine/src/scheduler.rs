//! Per-collector worker pools draining pending commands.

use crate::exec::Executor;
use crate::normalizer::Normalizer;
use crate::registry::sort_by_priority;
use anyhow::{Context, Result};
use recon_core::{Collector, CommandStatus};
use recon_ledger::{CommandFilter, CommandRow, Db};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Dequeued but no longer pending by the time a worker claimed it.
    pub skipped: usize,
    /// Claimed, but the ledger refused a later write. The command may still
    /// be `Running`; the next run closes it as interrupted.
    pub errors: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: Result<Option<CommandStatus>>) {
        match outcome {
            Ok(Some(status)) => {
                self.executed += 1;
                match status {
                    CommandStatus::Completed => self.completed += 1,
                    CommandStatus::TimedOut => self.timed_out += 1,
                    _ => self.failed += 1,
                }
            }
            Ok(None) => self.skipped += 1,
            Err(_) => {
                self.executed += 1;
                self.errors += 1;
            }
        }
    }

    /// Commands that did not end `Completed`.
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.timed_out + self.errors
    }
}

pub struct Scheduler {
    db: Arc<Db>,
    executor: Arc<Executor>,
    normalizer: Arc<Normalizer>,
    threads: usize,
}

/// Pending work of one collector.
struct Pool {
    collector: Arc<dyn Collector>,
    queue: VecDeque<CommandRow>,
    running: usize,
}

impl Pool {
    fn ready(&self) -> bool {
        !self.queue.is_empty() && self.running < self.collector.descriptor().max_concurrency.max(1)
    }
}

impl Scheduler {
    /// `threads` is the execution budget shared by all pools.
    pub fn new(db: Arc<Db>, executor: Arc<Executor>, normalizer: Arc<Normalizer>, threads: usize) -> Self {
        Scheduler { db, executor, normalizer, threads: threads.max(1) }
    }

    /// Executes every pending command of `collectors`. Each collector runs at
    /// most `max_concurrency` commands at once, and all of them together at
    /// most `threads`. A free slot always goes to the highest-priority
    /// collector that still has queued work and room in its pool; commands
    /// within a pool are taken oldest first.
    pub async fn run(&self, run_id: Uuid, collectors: &[Arc<dyn Collector>]) -> Result<RunSummary> {
        let interrupted = self.db.transaction(|tx| tx.fail_interrupted(&run_id))?;
        if interrupted > 0 {
            warn!(count = interrupted, "closed commands left running by an earlier run");
        }

        let mut ordered = collectors.to_vec();
        sort_by_priority(&mut ordered);
        let mut pools = Vec::new();
        for collector in ordered {
            let name = collector.descriptor().name.clone();
            let pending = self.db.transaction(|tx| tx.commands(CommandFilter::Pending(Some(&name))))?;
            if pending.is_empty() {
                continue;
            }
            info!(collector = %name, pending = pending.len(), "scheduling");
            pools.push(Pool { collector, queue: VecDeque::from(pending), running: 0 });
        }

        let mut tasks = JoinSet::new();
        let mut summary = RunSummary::default();
        loop {
            while tasks.len() < self.threads {
                let Some(idx) = pools.iter().position(Pool::ready) else {
                    break;
                };
                let pool = &mut pools[idx];
                let Some(row) = pool.queue.pop_front() else {
                    break;
                };
                pool.running += 1;
                let job = Job {
                    db: self.db.clone(),
                    executor: self.executor.clone(),
                    normalizer: self.normalizer.clone(),
                    collector: pool.collector.clone(),
                    run_id,
                };
                tasks.spawn(async move {
                    let outcome = job.handle(&row).await;
                    if let Err(e) = &outcome {
                        error!(command_id = row.id, collector = %row.collector, error = %e, "ledger error while executing command");
                    }
                    (idx, outcome)
                });
            }
            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (idx, outcome) = joined.context("scheduler worker panicked")?;
            pools[idx].running -= 1;
            summary.record(outcome);
        }
        Ok(summary)
    }
}

struct Job {
    db: Arc<Db>,
    executor: Arc<Executor>,
    normalizer: Arc<Normalizer>,
    collector: Arc<dyn Collector>,
    run_id: Uuid,
}

impl Job {
    async fn handle(&self, row: &CommandRow) -> Result<Option<CommandStatus>> {
        let name = &self.collector.descriptor().name;
        if !self.db.transaction(|tx| tx.mark_running(row.id, &self.run_id))? {
            debug!(command_id = row.id, collector = %name, "no longer pending, skipped");
            return Ok(None);
        }
        debug!(command_id = row.id, collector = %name, target = %row.target, "running: {}", row.request.display());
        let record = self.executor.execute(self.collector.as_ref(), &row.target, &row.request).await;
        let status = record.status;
        if !self.db.transaction(|tx| tx.complete_command(row.id, &record))? {
            warn!(command_id = row.id, collector = %name, "command left running state elsewhere; result dropped");
            return Ok(None);
        }
        match &record.failure {
            Some(cause) => warn!(command_id = row.id, collector = %name, status = %status, cause = %cause, "command failed"),
            None => info!(command_id = row.id, collector = %name, exit_code = ?record.output.exit_code, "command completed"),
        }
        if status == CommandStatus::Completed {
            let mut done = row.clone();
            done.status = status;
            done.output = record.output;
            // The result is stored; a failed normalization is picked up by the next drain.
            if let Err(e) = self.normalizer.normalize(self.collector.as_ref(), &done) {
                error!(command_id = row.id, collector = %name, error = %e, "normalization failed");
            }
        }
        Ok(Some(status))
    }
}
