// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Service configuration.
//!
//! The configuration file is a map of sections. `SERVICE` and `SECURITY`
//! are fixed; `PDP` names the decision endpoints; every other section is a
//! PIP or obligation-handler definition referenced by name from the
//! `pips` / `obligationHandlers` lists:
//!
//! ```yaml
//! SERVICE:
//!   entityId: https://pep.example.org/authz
//!   hostname: pep.example.org
//!   port: 8154
//!   adminPort: 8155
//!   pips: X509_PIP TIME_PIP
//!   obligationHandlers: GRIDMAP_OH
//! SECURITY:
//!   trustInfoDir: /etc/grid-security/certificates
//! PDP:
//!   pdps: https://pdp.example.org/authz
//! X509_PIP:
//!   parserClass: x509-pip
//!   requireProxy: true
//! GRIDMAP_OH:
//!   parserClass: gridmap-oh
//!   precedence: 0
//!   accountMap: /etc/grid-security/grid-mapfile
//!   groupMap: /etc/grid-security/group-mapfile
//!   gridmapDir: /etc/grid-security/gridmapdir
//! ```
//!
//! Integer keys parse leniently: a value that does not parse, or falls
//! outside its documented range, logs a warning and falls back to the
//! default. Unknown keys in `SERVICE` and `SECURITY` warn and are ignored;
//! only the documented spellings are honored.
//!
//! The aggregate is frozen after [`ServiceConfigBuilder::build`]; nothing
//! mutates it afterwards.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration is not valid YAML: {0}")]
    Parse(String),

    #[error("configuration section {0:?} is missing")]
    MissingSection(String),

    #[error("section {section:?} is missing required key {key:?}")]
    MissingKey { section: String, key: String },

    #[error("section {section:?} key {key:?}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("section {section:?} names unknown parser {parser:?}")]
    UnknownParser { section: String, parser: String },
}

const SERVICE_KEYS: &[&str] = &[
    "entityId",
    "hostname",
    "port",
    "enableSSL",
    "requireClientCertAuthentication",
    "adminHost",
    "adminPort",
    "adminPassword",
    "maximumRequests",
    "connectionTimeout",
    "requestQueueSize",
    "receiveBufferSize",
    "sendBufferSize",
    "pips",
    "obligationHandlers",
];

const SECURITY_KEYS: &[&str] = &[
    "servicePrivateKey",
    "serviceCertificate",
    "trustInfoDir",
    "requireCRLs",
];

/// Admin channel settings.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

/// Credentials and trust material.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    pub service_private_key: Option<PathBuf>,
    pub service_certificate: Option<PathBuf>,
    pub trust_info_dir: Option<PathBuf>,
    pub require_crls: bool,
}

/// One PIP or obligation-handler section: the registry tag, the ordering
/// precedence, and the parser-specific keys.
#[derive(Debug, Clone)]
pub struct SectionConfig {
    pub name: String,
    pub parser_class: String,
    pub precedence: i32,
    pub params: Mapping,
}

impl SectionConfig {
    pub fn get_str(&self, key: &str) -> Option<String> {
        value_as_string(self.params.get(&Value::from(key))?)
    }

    pub fn require_str(&self, key: &str) -> Result<String, ConfigError> {
        self.get_str(key).ok_or_else(|| ConfigError::MissingKey {
            section: self.name.clone(),
            key: key.to_string(),
        })
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.params.get(&Value::from(key)) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.parse() {
                Ok(b) => b,
                Err(_) => {
                    warn!(
                        section = %self.name,
                        key, value = %s, default, "Unparseable boolean, using default"
                    );
                    default
                }
            },
            Some(other) => {
                warn!(section = %self.name, key, ?other, default, "Unparseable boolean, using default");
                default
            }
        }
    }

    /// Lenient integer with the same warn-and-default behavior as the
    /// `SERVICE` keys.
    pub fn get_u64(&self, key: &str, default: u64, range: std::ops::RangeInclusive<u64>) -> u64 {
        get_int_lenient(&self.params, &self.name, key, default, range)
    }

    /// Space-separated list (the historical format) or a YAML sequence.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        list_value(self.params.get(&Value::from(key)))
    }

    /// Raw sub-value for parsers with structured settings.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.params.get(&Value::from(key))
    }
}

/// The frozen service configuration aggregate.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub entity_id: String,
    pub hostname: String,
    pub port: u16,
    pub enable_ssl: bool,
    pub require_client_cert_authentication: bool,
    pub admin: AdminConfig,
    pub maximum_requests: usize,
    pub connection_timeout: Duration,
    pub request_queue_size: usize,
    pub receive_buffer_size: usize,
    pub send_buffer_size: usize,
    pub security: SecurityConfig,
    pub pdp_endpoints: Vec<String>,
    pub pips: Vec<SectionConfig>,
    pub obligation_handlers: Vec<SectionConfig>,
}

impl ServiceConfig {
    pub fn load(path: impl Into<PathBuf>) -> Result<ServiceConfig, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<ServiceConfig, ConfigError> {
        let root: Mapping =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        ServiceConfigBuilder::from_sections(&root)?.build()
    }
}

/// Builds the aggregate, collecting values section by section. Produced
/// values are immutable; "set once, never change" is enforced by
/// construction.
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    entity_id: Option<String>,
    hostname: Option<String>,
    port: Option<u16>,
    enable_ssl: bool,
    require_client_cert_authentication: bool,
    admin_host: String,
    admin_port: Option<u16>,
    admin_password: Option<String>,
    maximum_requests: usize,
    connection_timeout: Duration,
    request_queue_size: usize,
    receive_buffer_size: usize,
    send_buffer_size: usize,
    security: SecurityConfig,
    pdp_endpoints: Vec<String>,
    pips: Vec<SectionConfig>,
    obligation_handlers: Vec<SectionConfig>,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            admin_host: "localhost".to_string(),
            maximum_requests: 50,
            connection_timeout: Duration::from_secs(30),
            request_queue_size: 500,
            receive_buffer_size: 4096,
            send_buffer_size: 4096,
            security: SecurityConfig {
                require_crls: true,
                ..SecurityConfig::default()
            },
            ..Self::default()
        }
    }

    fn from_sections(root: &Mapping) -> Result<ServiceConfigBuilder, ConfigError> {
        let mut builder = ServiceConfigBuilder::new();

        let service = section(root, "SERVICE")?;
        warn_unknown_keys("SERVICE", &service, SERVICE_KEYS);

        builder.entity_id = get_string(&service, "entityId");
        builder.hostname = get_string(&service, "hostname");
        builder.port = Some(get_port(&service, "SERVICE", "port")?);
        builder.enable_ssl = get_bool_lenient(&service, "SERVICE", "enableSSL", false);
        builder.require_client_cert_authentication = get_bool_lenient(
            &service,
            "SERVICE",
            "requireClientCertAuthentication",
            false,
        );
        if builder.require_client_cert_authentication && !builder.enable_ssl {
            warn!("requireClientCertAuthentication is only honored with enableSSL, ignoring");
            builder.require_client_cert_authentication = false;
        }
        if let Some(host) = get_string(&service, "adminHost") {
            builder.admin_host = host;
        }
        builder.admin_port = Some(get_port(&service, "SERVICE", "adminPort")?);
        builder.admin_password = get_string(&service, "adminPassword");
        builder.maximum_requests =
            get_int_lenient(&service, "SERVICE", "maximumRequests", 50, 1..=100_000) as usize;
        builder.connection_timeout = Duration::from_secs(get_int_lenient(
            &service,
            "SERVICE",
            "connectionTimeout",
            30,
            1..=86_400,
        ));
        builder.request_queue_size =
            get_int_lenient(&service, "SERVICE", "requestQueueSize", 500, 0..=1_000_000) as usize;
        builder.receive_buffer_size =
            get_int_lenient(&service, "SERVICE", "receiveBufferSize", 4096, 1..=u64::MAX) as usize;
        builder.send_buffer_size =
            get_int_lenient(&service, "SERVICE", "sendBufferSize", 4096, 1..=u64::MAX) as usize;

        if let Some(security) = optional_section(root, "SECURITY") {
            warn_unknown_keys("SECURITY", &security, SECURITY_KEYS);
            builder.security = SecurityConfig {
                service_private_key: get_string(&security, "servicePrivateKey").map(PathBuf::from),
                service_certificate: get_string(&security, "serviceCertificate")
                    .map(PathBuf::from),
                trust_info_dir: get_string(&security, "trustInfoDir").map(PathBuf::from),
                require_crls: get_bool_lenient(&security, "SECURITY", "requireCRLs", true),
            };
        }

        if let Some(pdp) = optional_section(root, "PDP") {
            builder.pdp_endpoints = list_value(pdp.get(&Value::from("pdps")));
        }

        for name in list_value(service.get(&Value::from("pips"))) {
            builder.pips.push(parser_section(root, &name)?);
        }
        for name in list_value(service.get(&Value::from("obligationHandlers"))) {
            builder.obligation_handlers.push(parser_section(root, &name)?);
        }

        Ok(builder)
    }

    pub fn entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn admin(mut self, host: impl Into<String>, port: u16, password: Option<String>) -> Self {
        self.admin_host = host.into();
        self.admin_port = Some(port);
        self.admin_password = password;
        self
    }

    pub fn security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub fn pdp_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.pdp_endpoints = endpoints;
        self
    }

    pub fn build(self) -> Result<ServiceConfig, ConfigError> {
        let entity_id = self.entity_id.ok_or_else(|| ConfigError::MissingKey {
            section: "SERVICE".to_string(),
            key: "entityId".to_string(),
        })?;
        let hostname = self.hostname.ok_or_else(|| ConfigError::MissingKey {
            section: "SERVICE".to_string(),
            key: "hostname".to_string(),
        })?;
        let port = self.port.ok_or_else(|| ConfigError::MissingKey {
            section: "SERVICE".to_string(),
            key: "port".to_string(),
        })?;
        let admin_port = self.admin_port.ok_or_else(|| ConfigError::MissingKey {
            section: "SERVICE".to_string(),
            key: "adminPort".to_string(),
        })?;

        Ok(ServiceConfig {
            entity_id,
            hostname,
            port,
            enable_ssl: self.enable_ssl,
            require_client_cert_authentication: self.require_client_cert_authentication,
            admin: AdminConfig {
                host: self.admin_host,
                port: admin_port,
                password: self.admin_password,
            },
            maximum_requests: self.maximum_requests,
            connection_timeout: self.connection_timeout,
            request_queue_size: self.request_queue_size,
            receive_buffer_size: self.receive_buffer_size,
            send_buffer_size: self.send_buffer_size,
            security: self.security,
            pdp_endpoints: self.pdp_endpoints,
            pips: self.pips,
            obligation_handlers: self.obligation_handlers,
        })
    }
}

fn section(root: &Mapping, name: &str) -> Result<Mapping, ConfigError> {
    optional_section(root, name).ok_or_else(|| ConfigError::MissingSection(name.to_string()))
}

fn optional_section(root: &Mapping, name: &str) -> Option<Mapping> {
    match root.get(&Value::from(name)) {
        Some(Value::Mapping(mapping)) => Some(mapping.clone()),
        _ => None,
    }
}

fn parser_section(root: &Mapping, name: &str) -> Result<SectionConfig, ConfigError> {
    let mapping = section(root, name)?;
    let parser_class = get_string(&mapping, "parserClass").ok_or_else(|| {
        ConfigError::MissingKey {
            section: name.to_string(),
            key: "parserClass".to_string(),
        }
    })?;
    let precedence = get_int_lenient(&mapping, name, "precedence", 0, 0..=u64::from(u32::MAX));
    Ok(SectionConfig {
        name: name.to_string(),
        parser_class,
        precedence: precedence as i32,
        params: mapping,
    })
}

fn warn_unknown_keys(section_name: &str, mapping: &Mapping, known: &[&str]) {
    let known: HashSet<&str> = known.iter().copied().collect();
    for key in mapping.keys() {
        if let Value::String(key) = key {
            if !known.contains(key.as_str()) {
                warn!(section = section_name, key, "Ignoring unknown configuration key");
            }
        }
    }
}

fn get_string(mapping: &Mapping, key: &str) -> Option<String> {
    mapping.get(&Value::from(key)).and_then(value_as_string)
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_bool_lenient(mapping: &Mapping, section_name: &str, key: &str, default: bool) -> bool {
    match mapping.get(&Value::from(key)) {
        None => default,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.parse() {
            Ok(b) => b,
            Err(_) => {
                warn!(
                    section = section_name,
                    key, value = %s, default, "Unparseable boolean, using default"
                );
                default
            }
        },
        Some(other) => {
            warn!(section = section_name, key, ?other, default, "Unparseable boolean, using default");
            default
        }
    }
}

/// Lenient integer: unparseable or out-of-range values warn and fall back
/// to the documented default.
fn get_int_lenient(
    mapping: &Mapping,
    section_name: &str,
    key: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> u64 {
    let parsed = match mapping.get(&Value::from(key)) {
        None => return default,
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(v) if range.contains(&v) => v,
        Some(v) => {
            warn!(
                section = section_name,
                key, value = v, default, "Configuration value out of range, using default"
            );
            default
        }
        None => {
            warn!(
                section = section_name,
                key, default, "Unparseable integer, using default"
            );
            default
        }
    }
}

fn list_value(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(Value::Sequence(seq)) => seq.iter().filter_map(value_as_string).collect(),
        _ => Vec::new(),
    }
}

/// Hard-required port: an invalid port is a startup failure, not a
/// lenient fallback, because there is no sensible default to listen on.
fn get_port(mapping: &Mapping, section_name: &str, key: &str) -> Result<u16, ConfigError> {
    let value = mapping
        .get(&Value::from(key))
        .ok_or_else(|| ConfigError::MissingKey {
            section: section_name.to_string(),
            key: key.to_string(),
        })?;
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match port {
        Some(p) if (1..=65_535).contains(&p) => Ok(p as u16),
        _ => Err(ConfigError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            reason: "expected a port in 1..65535".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
SERVICE:
  entityId: https://pep.example.org/authz
  hostname: pep.example.org
  port: 8154
  adminPort: 8155
"#;

    #[test]
    fn test_minimal_config_uses_documented_defaults() {
        let config = ServiceConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.port, 8154);
        assert_eq!(config.admin.host, "localhost");
        assert_eq!(config.admin.port, 8155);
        assert_eq!(config.maximum_requests, 50);
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.request_queue_size, 500);
        assert_eq!(config.receive_buffer_size, 4096);
        assert!(!config.enable_ssl);
        assert!(config.security.require_crls);
        assert!(config.pips.is_empty());
    }

    #[test]
    fn test_missing_required_keys_fail() {
        assert!(ServiceConfig::from_yaml("SERVICE:\n  hostname: x\n").is_err());
        let no_port = "SERVICE:\n  entityId: x\n  hostname: x\n  adminPort: 1\n";
        assert!(matches!(
            ServiceConfig::from_yaml(no_port),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_out_of_range_port_is_fatal() {
        let bad = "SERVICE:\n  entityId: x\n  hostname: x\n  port: 70000\n  adminPort: 8155\n";
        assert!(matches!(
            ServiceConfig::from_yaml(bad),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_lenient_integers_fall_back_to_default() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
  maximumRequests: many
  requestQueueSize: -3
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.maximum_requests, 50);
        assert_eq!(config.request_queue_size, 500);
    }

    #[test]
    fn test_pip_sections_resolve_in_list_order() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
  pips: SECOND FIRST
FIRST:
  parserClass: time-pip
SECOND:
  parserClass: whitelist-pip
  precedence: 7
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pips.len(), 2);
        assert_eq!(config.pips[0].name, "SECOND");
        assert_eq!(config.pips[0].parser_class, "whitelist-pip");
        assert_eq!(config.pips[0].precedence, 7);
        assert_eq!(config.pips[1].name, "FIRST");
    }

    #[test]
    fn test_missing_named_section_fails() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
  pips: GHOST
"#;
        assert!(matches!(
            ServiceConfig::from_yaml(yaml),
            Err(ConfigError::MissingSection(_))
        ));
    }

    #[test]
    fn test_pdp_endpoints_accept_space_separated_list() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
PDP:
  pdps: https://pdp1.example.org/authz https://pdp2.example.org/authz
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pdp_endpoints.len(), 2);
    }

    #[test]
    fn test_client_cert_requirement_needs_ssl() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
  requireClientCertAuthentication: true
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert!(!config.require_client_cert_authentication);
    }

    #[test]
    fn test_section_accessors() {
        let yaml = r#"
SERVICE:
  entityId: x
  hostname: x
  port: 8154
  adminPort: 8155
  pips: P
P:
  parserClass: x509-pip
  requireProxy: true
  acceptedIds: a b c
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        let pip = &config.pips[0];
        assert!(pip.get_bool("requireProxy", false));
        assert_eq!(pip.get_list("acceptedIds"), vec!["a", "b", "c"]);
        assert!(pip.require_str("missing").is_err());
    }
}
