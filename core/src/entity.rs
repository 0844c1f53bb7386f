use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            other => Err(format!("unknown record type: {other}")),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized output of a parser, owned by the target the command ran against.
/// Each variant has a natural uniqueness key per target, which the ledger
/// enforces on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum DerivedEntity {
    Path { name: String },
    /// A query string seen on a path; the path is created if absent.
    Query { path: String, query: String },
    HostName { name: String },
    DnsRecord { name: String, record: RecordType, value: String },
    Finding { kind: String, value: String },
}

impl DerivedEntity {
    pub fn path(name: impl Into<String>) -> Self {
        DerivedEntity::Path { name: name.into() }
    }

    pub fn query(path: impl Into<String>, query: impl Into<String>) -> Self {
        DerivedEntity::Query { path: path.into(), query: query.into() }
    }

    pub fn host_name(name: impl Into<String>) -> Self {
        DerivedEntity::HostName { name: name.into().trim_end_matches('.').to_ascii_lowercase() }
    }

    pub fn finding(kind: impl Into<String>, value: impl Into<String>) -> Self {
        DerivedEntity::Finding { kind: kind.into(), value: value.into() }
    }
}

/// Transient signal for the reporting layer. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub message: String,
}

impl ReportItem {
    pub fn new(message: impl Into<String>) -> Self {
        ReportItem { message: message.into() }
    }
}

/// Parser result. Empty means the output was degraded or simply had nothing
/// to extract; either way the command stays completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub entities: Vec<DerivedEntity>,
    pub reports: Vec<ReportItem>,
}

impl Normalized {
    pub fn push(&mut self, entity: DerivedEntity) {
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
    }

    pub fn report(&mut self, message: impl Into<String>) {
        self.reports.push(ReportItem::new(message));
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_skips_duplicates() {
        let mut n = Normalized::default();
        n.push(DerivedEntity::path("/a"));
        n.push(DerivedEntity::path("/a"));
        n.push(DerivedEntity::query("/", "page=admin"));
        assert_eq!(n.entities.len(), 2);
        assert!(n.reports.is_empty());
    }

    #[test]
    fn host_names_are_normalized() {
        assert_eq!(DerivedEntity::host_name("Mail.Test.Local."), DerivedEntity::HostName { name: "mail.test.local".into() });
    }
}
