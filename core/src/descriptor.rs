use crate::target::TargetKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a collector operates on. API collectors carry the target kind they
/// query for, but are executed over HTTP instead of as OS processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Host,
    Service,
    Domain,
    Api(TargetKind),
}

impl Capability {
    pub fn accepts(&self, kind: TargetKind) -> bool {
        match self {
            Capability::Host => kind == TargetKind::Host,
            Capability::Service => kind == TargetKind::Service,
            Capability::Domain => kind == TargetKind::Domain,
            Capability::Api(k) => *k == kind,
        }
    }

    pub fn is_api(&self) -> bool {
        matches!(self, Capability::Api(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    #[default]
    Normal,
    Elevated,
}

/// Static execution metadata of a collector. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorDescriptor {
    pub name: String,
    /// Lower runs earlier.
    pub priority: u32,
    /// Never below 1.
    pub max_concurrency: usize,
    /// Zero disables enforcement.
    pub timeout: Duration,
    pub privilege: Privilege,
    pub capability: Capability,
    /// Binary that must be resolvable at registration (OS collectors only).
    pub binary: Option<String>,
}

impl CollectorDescriptor {
    pub fn new(name: impl Into<String>, capability: Capability) -> Self {
        CollectorDescriptor {
            name: name.into(),
            priority: 1000,
            max_concurrency: 1,
            timeout: Duration::ZERO,
            privilege: Privilege::Normal,
            capability,
            binary: None,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn timeout_enforced(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }
}
