//! Configuration.
//!
//! Parsed from a TOML file into typed structs with [`serde`], following the
//! shape given by spec §3/§6. Optional fields carry `Default` impls so a
//! minimal file only needs to name its zones.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::util::deserialize_duration_from_secs;
use std::time::Duration;

/// The top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub realm: RealmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    pub zones: ZonesConfig,
}

/// The domain this registry serves, e.g. `realm`. Zone names
/// `validators.{realm}` and `flash.{realm}` are derived from it.
#[derive(Debug, Clone, Deserialize)]
pub struct RealmConfig {
    pub domain: String,
    /// Path to the sqlite database file (`:memory:` is accepted).
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "realmd.sqlite".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    pub realm: ZoneConfig,
    pub validators: ZoneConfig,
    pub flash: ZoneConfig,
}

/// Per-zone configuration, per spec §3.
///
/// Role is not given directly; it is derived (§4.2) from which fields are
/// present: `authoritative ∧ soa.email` set is primary, `authoritative ∧
/// ¬soa.email` is secondary, anything else is caching.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    #[serde(default)]
    pub authoritative: bool,
    #[serde(default)]
    pub soa: SoaConfig,
    /// The upstream primary's address, used by a secondary's
    /// `redirect_register` client.
    #[serde(default)]
    pub primary: Option<String>,
    /// Upstream servers queried for SOA/AXFR (secondary) or on-demand
    /// lookups (caching).
    #[serde(default)]
    pub query_servers: Vec<String>,
    /// Addresses allowed to issue AXFR against this zone.
    #[serde(default)]
    pub allow_transfer: Vec<IpAddr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SoaConfig {
    /// Presence of `email` is what makes a zone primary rather than
    /// secondary (§4.2).
    pub email: Option<String>,
    #[serde(default = "default_refresh", deserialize_with = "deserialize_duration_from_secs")]
    pub refresh: Duration,
    #[serde(default = "default_retry", deserialize_with = "deserialize_duration_from_secs")]
    pub retry: Duration,
    #[serde(default = "default_expire", deserialize_with = "deserialize_duration_from_secs")]
    pub expire: Duration,
    #[serde(default = "default_minimum", deserialize_with = "deserialize_duration_from_secs")]
    pub minimum: Duration,
}

fn default_refresh() -> Duration {
    Duration::from_secs(3600)
}
fn default_retry() -> Duration {
    Duration::from_secs(600)
}
fn default_expire() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}
fn default_minimum() -> Duration {
    Duration::from_secs(60)
}

/// The Application API's HTTP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_addr")]
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_addr(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:8080".into()
}

/// The DNS listener.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_addr")]
    pub listen: String,
    /// The EDNS(0) UDP payload size ceiling this server will echo.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: u16,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: default_dns_addr(),
            max_payload_size: default_max_payload_size(),
        }
    }
}

fn default_dns_addr() -> String {
    "127.0.0.1:5300".into()
}

fn default_max_payload_size() -> u16 {
    4096
}

//----------- Logging -------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    File(PathBuf),
    #[cfg(unix)]
    Syslog,
    #[default]
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub target: LogTarget,
    /// Extra `tracing` directives, e.g. `realmd::dns=debug`.
    #[serde(default)]
    pub trace_targets: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            target: LogTarget::default(),
            trace_targets: Vec::new(),
        }
    }
}

/// Parse a [`Config`] from TOML source.
pub fn parse(source: &str) -> Result<Config, String> {
    toml::from_str(source).map_err(|e| e.to_string())
}

/// The three zones this registry serves, named from [`RealmConfig::domain`].
pub fn zone_names(realm: &RealmConfig) -> HashMap<&'static str, String> {
    let mut names = HashMap::new();
    names.insert("realm", realm.domain.clone());
    names.insert("validators", format!("validators.{}", realm.domain));
    names.insert("flash", format!("flash.{}", realm.domain));
    names
}
