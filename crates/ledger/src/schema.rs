pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE runs (
  run_id          TEXT PRIMARY KEY,
  started_at      INTEGER NOT NULL,
  finished_at     INTEGER,
  tool_version    TEXT NOT NULL,
  args_json       TEXT NOT NULL,
  executed_count  INTEGER DEFAULT 0,
  failed_count    INTEGER DEFAULT 0
);

CREATE TABLE sources (
  source_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE
);

CREATE TABLE hosts (
  host_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  address         TEXT NOT NULL UNIQUE
);

CREATE TABLE services (
  service_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  host_id         INTEGER NOT NULL REFERENCES hosts(host_id) ON DELETE CASCADE,
  protocol        TEXT NOT NULL CHECK (protocol IN ('tcp','udp')),
  port            INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
  name            TEXT,
  UNIQUE (host_id, protocol, port)
);

CREATE TABLE domains (
  domain_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL UNIQUE
);

CREATE TABLE targets (
  target_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  target_key      TEXT NOT NULL UNIQUE,
  kind            TEXT NOT NULL CHECK (kind IN ('host','service','domain')),
  host_id         INTEGER REFERENCES hosts(host_id) ON DELETE CASCADE,
  service_id      INTEGER REFERENCES services(service_id) ON DELETE CASCADE,
  domain_id       INTEGER REFERENCES domains(domain_id) ON DELETE CASCADE,
  target_json     TEXT NOT NULL,
  CHECK ((host_id IS NOT NULL) + (service_id IS NOT NULL) + (domain_id IS NOT NULL) = 1)
);

CREATE TABLE commands (
  command_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  collector       TEXT NOT NULL,
  source_id       INTEGER NOT NULL REFERENCES sources(source_id),
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  invocation_json TEXT NOT NULL,
  status          TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed','timed_out')),
  stdout          TEXT,
  stderr          TEXT,
  exit_code       INTEGER,
  status_code     INTEGER,
  failure_code    TEXT,
  failure_detail  TEXT,
  run_id          TEXT REFERENCES runs(run_id),
  created_ms      INTEGER NOT NULL,
  started_ms      INTEGER,
  finished_ms     INTEGER,
  normalized_ms   INTEGER,
  UNIQUE (collector, target_id, invocation_json)
);

CREATE TABLE paths (
  path_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  name            TEXT NOT NULL,
  UNIQUE (target_id, name)
);

CREATE TABLE queries (
  query_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  path_id         INTEGER NOT NULL REFERENCES paths(path_id) ON DELETE CASCADE,
  query           TEXT NOT NULL,
  UNIQUE (path_id, query)
);

CREATE TABLE host_names (
  host_name_id    INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  name            TEXT NOT NULL,
  UNIQUE (target_id, name)
);

CREATE TABLE dns_records (
  record_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  name            TEXT NOT NULL,
  record_type     TEXT NOT NULL CHECK (record_type IN ('A','AAAA','CNAME','MX')),
  value           TEXT NOT NULL,
  UNIQUE (target_id, name, record_type, value)
);

CREATE TABLE findings (
  finding_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  target_id       INTEGER NOT NULL REFERENCES targets(target_id) ON DELETE CASCADE,
  kind            TEXT NOT NULL,
  value           TEXT NOT NULL,
  UNIQUE (target_id, kind, value)
);

CREATE TABLE provenance (
  entity_kind     TEXT NOT NULL,
  entity_id       INTEGER NOT NULL,
  source_id       INTEGER NOT NULL REFERENCES sources(source_id),
  command_id      INTEGER REFERENCES commands(command_id),
  PRIMARY KEY (entity_kind, entity_id, source_id)
);

CREATE INDEX idx_services_host ON services(host_id);
CREATE INDEX idx_commands_status ON commands(status, collector);
CREATE INDEX idx_commands_target ON commands(target_id);
CREATE INDEX idx_paths_target ON paths(target_id);
CREATE INDEX idx_host_names_target ON host_names(target_id);
CREATE INDEX idx_dns_records_target ON dns_records(target_id);
CREATE INDEX idx_findings_target ON findings(target_id);

COMMIT;
"#
;
