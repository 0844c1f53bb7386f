//! Catalog of registered collectors.

use crate::tools::ToolPaths;
use recon_core::{Collector, CollectorContext, CollectorDescriptor, CollectorFactory, CollectorSettings, ConfigError, TargetKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-collector overrides from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorOverride {
    pub priority: Option<u32>,
    pub max_concurrency: Option<usize>,
    pub timeout_s: Option<u64>,
}

impl CollectorOverride {
    fn apply(&self, mut d: CollectorDescriptor) -> CollectorDescriptor {
        if let Some(p) = self.priority {
            d = d.priority(p);
        }
        if let Some(n) = self.max_concurrency {
            d = d.max_concurrency(n);
        }
        if let Some(s) = self.timeout_s {
            d = d.timeout(Duration::from_secs(s));
        }
        d
    }
}

pub struct Registry {
    settings: CollectorSettings,
    tools: ToolPaths,
    overrides: HashMap<String, CollectorOverride>,
    collectors: Vec<Arc<dyn Collector>>,
}

impl Registry {
    pub fn new(settings: CollectorSettings, tools: ToolPaths) -> Self {
        Registry { settings, tools, overrides: HashMap::new(), collectors: Vec::new() }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, CollectorOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Adds a collector. Duplicate names, unresolvable binaries and factory
    /// rejections are configuration errors.
    pub fn register(&mut self, descriptor: CollectorDescriptor, factory: CollectorFactory) -> Result<(), ConfigError> {
        if self.get(&descriptor.name).is_some() {
            return Err(ConfigError::DuplicateCollector(descriptor.name));
        }
        let descriptor = match self.overrides.get(&descriptor.name) {
            Some(o) => o.apply(descriptor),
            None => descriptor,
        };
        let binary = match &descriptor.binary {
            Some(name) => Some(self.tools.resolve(name).ok_or_else(|| ConfigError::MissingBinary {
                collector: descriptor.name.clone(),
                binary: name.clone(),
            })?),
            None => None,
        };
        let ctx = CollectorContext { descriptor, binary, settings: &self.settings };
        let collector: Arc<dyn Collector> = Arc::from(factory(&ctx)?);
        if collector.descriptor() != &ctx.descriptor {
            return Err(ConfigError::Invalid {
                collector: ctx.descriptor.name.clone(),
                reason: "factory did not keep the resolved descriptor".into(),
            });
        }
        debug!(collector = %ctx.descriptor.name, binary = ?ctx.binary, "registered collector");
        self.collectors.push(collector);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.collectors.iter().find(|c| c.descriptor().name == name).cloned()
    }

    /// All collectors whose capability accepts `kind`, by ascending priority.
    pub fn list_for(&self, kind: TargetKind) -> Vec<Arc<dyn Collector>> {
        let mut out: Vec<_> = self.collectors.iter().filter(|c| c.descriptor().capability.accepts(kind)).cloned().collect();
        sort_by_priority(&mut out);
        out
    }

    pub fn all(&self) -> Vec<Arc<dyn Collector>> {
        let mut out = self.collectors.clone();
        sort_by_priority(&mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

pub(crate) fn sort_by_priority(collectors: &mut [Arc<dyn Collector>]) {
    collectors.sort_by(|a, b| {
        let (a, b) = (a.descriptor(), b.descriptor());
        a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ShellCollector;
    use recon_core::Capability;

    fn factory(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
        Ok(Box::new(ShellCollector::new(ctx.descriptor.clone(), "true")))
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = Registry::new(CollectorSettings::default(), ToolPaths::default());
        reg.register(CollectorDescriptor::new("dnshost", Capability::Domain), factory).unwrap();
        let err = reg.register(CollectorDescriptor::new("dnshost", Capability::Domain), factory).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCollector(n) if n == "dnshost"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn missing_binary_is_rejected() {
        let mut reg = Registry::new(CollectorSettings::default(), ToolPaths::with_search(HashMap::new(), vec![]));
        let d = CollectorDescriptor::new("ikescan", Capability::Service).binary("ike-scan");
        let err = reg.register(d, factory).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBinary { ref binary, .. } if binary == "ike-scan"));
        assert!(reg.is_empty());
    }

    #[test]
    fn list_for_filters_and_orders_by_priority() {
        let overrides = HashMap::from([(
            "b".to_string(),
            CollectorOverride { priority: Some(5), max_concurrency: Some(4), timeout_s: None },
        )]);
        let mut reg = Registry::new(CollectorSettings::default(), ToolPaths::default()).with_overrides(overrides);
        reg.register(CollectorDescriptor::new("a", Capability::Service).priority(10), factory).unwrap();
        reg.register(CollectorDescriptor::new("b", Capability::Service).priority(20), factory).unwrap();
        reg.register(CollectorDescriptor::new("c", Capability::Domain).priority(1), factory).unwrap();
        reg.register(CollectorDescriptor::new("d", Capability::Api(TargetKind::Domain)), factory).unwrap();
        let names: Vec<_> = reg.list_for(TargetKind::Service).iter().map(|c| c.descriptor().name.clone()).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(reg.get("b").unwrap().descriptor().max_concurrency, 4);
        let names: Vec<_> = reg.list_for(TargetKind::Domain).iter().map(|c| c.descriptor().name.clone()).collect();
        assert_eq!(names, ["c", "d"]);
    }
}
