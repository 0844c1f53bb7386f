//! Derives commands from targets and records them in the ledger.

use anyhow::Result;
use recon_core::{Collector, Target};
use recon_ledger::{CommandId, Db};
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub commands: Vec<CommandId>,
    pub created: usize,
}

impl Materialized {
    fn merge(&mut self, other: Materialized) {
        self.commands.extend(other.commands);
        self.created += other.created;
    }
}

/// Ensures a command exists for every request `collector` derives from
/// `target`. Existing commands are returned as-is, whatever their state.
pub fn materialize(db: &Db, collector: &dyn Collector, target: &Target) -> Result<Materialized> {
    let desc = collector.descriptor();
    if !desc.capability.accepts(target.kind()) {
        return Ok(Materialized::default());
    }
    let requests = collector.materialize(target);
    if requests.is_empty() {
        trace!(collector = %desc.name, target = %target, "target ineligible");
        return Ok(Materialized::default());
    }
    let mut out = Materialized::default();
    for request in &requests {
        let (id, created) = db.transaction(|tx| {
            let target_id = tx.upsert_target(target)?;
            tx.get_or_create_command(&desc.name, target_id, request)
        })?;
        if created {
            debug!(command_id = id, collector = %desc.name, target = %target, "new command: {}", request.display());
            out.created += 1;
        }
        out.commands.push(id);
    }
    Ok(out)
}

/// Materializes every collector against every target it accepts.
pub fn materialize_all(db: &Db, collectors: &[Arc<dyn Collector>], targets: &[Target]) -> Result<Materialized> {
    let mut out = Materialized::default();
    for collector in collectors {
        for target in targets {
            out.merge(materialize(db, collector.as_ref(), target)?);
        }
    }
    Ok(out)
}
