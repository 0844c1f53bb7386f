use anyhow::{Context, Result};
use recon_core::{CollectorSettings, Credentials};
use recon_engine::{CollectorOverride, Escalation, HttpOptions};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "recon.yaml";
pub const DEFAULT_DATABASE: &str = "recon.db";
pub const DEFAULT_OUTPUT_DIR: &str = "recon-output";

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    #[default]
    Auto,
    Sudo,
    None,
}

impl From<EscalationMode> for Escalation {
    fn from(m: EscalationMode) -> Self {
        match m {
            EscalationMode::Auto => Escalation::Auto,
            EscalationMode::Sudo => Escalation::Sudo,
            EscalationMode::None => Escalation::None,
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DelayConfig {
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct HttpConfig {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub transport_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CollectorConfig {
    pub priority: Option<u32>,
    pub max_concurrency: Option<usize>,
    pub timeout_s: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub database: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub escalation: Option<EscalationMode>,
    pub delay: Option<DelayConfig>,
    pub http: Option<HttpConfig>,
    pub dns_server: Option<String>,
    #[serde(default)]
    pub wordlists: Vec<PathBuf>,
    #[serde(default)]
    pub tools: HashMap<String, PathBuf>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    #[serde(default)]
    pub collectors: HashMap<String, CollectorConfig>,
}

impl Config {
    pub fn http_options(&self) -> HttpOptions {
        let mut opts = HttpOptions::default();
        if let Some(h) = &self.http {
            if let Some(v) = h.timeout_ms {
                opts.timeout_ms = v;
            }
            if let Some(v) = &h.user_agent {
                opts.user_agent = v.clone();
            }
            opts.proxy = h.proxy.clone();
            if let Some(v) = h.transport_retries {
                opts.transport_retries = v;
            }
            if let Some(v) = h.retry_delay_ms {
                opts.retry_delay_ms = v;
            }
        }
        opts
    }

    pub fn settings(&self) -> CollectorSettings {
        CollectorSettings {
            dns_server: self.dns_server.clone(),
            user_agent: self.http.as_ref().and_then(|h| h.user_agent.clone()),
            wordlists: self.wordlists.clone(),
            api_keys: self.credentials(),
        }
    }

    pub fn credentials(&self) -> HashMap<String, Credentials> {
        self.api_keys
            .iter()
            .filter(|(_, key)| !key.trim().is_empty())
            .map(|(name, key)| (name.clone(), Credentials { api_key: key.trim().to_string() }))
            .collect()
    }

    pub fn overrides(&self) -> HashMap<String, CollectorOverride> {
        self.collectors
            .iter()
            .map(|(name, c)| {
                let o = CollectorOverride { priority: c.priority, max_concurrency: c.max_concurrency, timeout_s: c.timeout_s };
                (name.clone(), o)
            })
            .collect()
    }

    pub fn delay(&self) -> (u64, u64) {
        match &self.delay {
            Some(d) => (d.min_ms.unwrap_or(0), d.max_ms.unwrap_or(0)),
            None => (0, 0),
        }
    }
}

/// Loads `path`, or `./recon.yaml` if it exists. No file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() {
                p.to_path_buf()
            } else {
                return Ok(Config::default());
            }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
}
