use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::batch::{BatchSettings, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS};
use crate::check::{ClassifyPolicy, PortalDomains, ProbeConfig, Taxonomy, TimeoutPolicy};

pub const ENV_PREFIX: &str = "LINKCHECK";
pub const DEFAULT_CONFIG_NAME: &str = "link_compliance";
pub const FULL_TIMEOUT_SECS: u64 = 15;
pub const LIGHT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings")]
    Source(#[from] config::ConfigError),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Run configuration. Every field has a default, so a missing file or an
/// empty environment is fine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunk_size: usize,
    pub workers: usize,
    /// Per-request timeout. Unset means 15 s, or 10 s under the binary taxonomy.
    pub timeout_secs: Option<u64>,
    pub taxonomy: Taxonomy,
    pub timeout_policy: TimeoutPolicy,
    pub portal_domains: Vec<String>,
    pub denial_markers: Vec<String>,
    pub home_paths: Vec<String>,
    pub max_redirects: usize,
    pub body_limit: usize,
    pub user_agent: String,
    pub accept_language: String,
    pub accept: String,
    pub referer: String,
}

impl Default for Settings {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        let policy = ClassifyPolicy::default();
        Settings {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            timeout_secs: None,
            taxonomy: Taxonomy::default(),
            timeout_policy: TimeoutPolicy::default(),
            portal_domains: vec!["portaltransparencia.cl".into(), "transparencia.cl".into()],
            denial_markers: policy.denial_markers,
            home_paths: policy.home_paths,
            max_redirects: probe.max_redirects,
            body_limit: probe.body_limit,
            user_agent: probe.user_agent,
            accept_language: probe.accept_language,
            accept: probe.accept,
            referer: probe.referer,
        }
    }
}

impl Settings {
    /// Defaults, then `path` (or `link_compliance.{toml,..}` in the working
    /// directory when present), then `LINKCHECK_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::build(path, env_source())
    }

    pub fn build(path: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size == 0 {
            return Err(SettingsError::Zero("chunk_size"));
        }
        if self.workers == 0 {
            return Err(SettingsError::Zero("workers"));
        }
        if self.timeout_secs == Some(0) {
            return Err(SettingsError::Zero("timeout_secs"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        let secs = self.timeout_secs.unwrap_or(match self.taxonomy {
            Taxonomy::Full => FULL_TIMEOUT_SECS,
            Taxonomy::Binary => LIGHT_TIMEOUT_SECS,
        });
        Duration::from_secs(secs)
    }

    pub fn batch(&self) -> BatchSettings {
        BatchSettings {
            chunk_size: self.chunk_size,
            workers: self.workers,
        }
    }

    pub fn portals(&self) -> PortalDomains {
        PortalDomains::new(&self.portal_domains)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: self.timeout(),
            max_redirects: self.max_redirects,
            body_limit: self.body_limit,
            user_agent: self.user_agent.clone(),
            accept_language: self.accept_language.clone(),
            accept: self.accept.clone(),
            referer: self.referer.clone(),
        }
    }

    pub fn policy(&self) -> ClassifyPolicy {
        ClassifyPolicy {
            portals: self.portals(),
            denial_markers: self.denial_markers.iter().map(|m| m.to_lowercase()).collect(),
            home_paths: self.home_paths.clone(),
            timeout: self.timeout_policy,
        }
    }
}

/// `LINKCHECK_CHUNK_SIZE=500`, `LINKCHECK_PORTAL_DOMAINS=a.cl,b.cl`, ...
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("portal_domains")
        .with_list_parse_key("denial_markers")
        .with_list_parse_key("home_paths")
}
