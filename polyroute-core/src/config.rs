use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PolyRouteError, Result};

/// Destination table for one protocol: entrypoint pattern -> region ->
/// backend base URL.
///
/// Entrypoint patterns are either exact strings, prefix wildcards (`P/*`),
/// or the literal `*`. Backend values include a scheme for HTTP
/// (`http://host/base`) and are plain `host:port` for gRPC. A `BTreeMap`
/// keeps iteration order deterministic, which the matcher relies on for
/// tie-breaking.
pub type DestinationTable = BTreeMap<String, BTreeMap<String, String>>;

/// Settings for one protocol frontend (HTTP or gRPC).
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Address the outer process binds: `host:port` or a bare port.
    pub listen: String,
    #[serde(default)]
    pub destinations: DestinationTable,
}

impl ProtocolConfig {
    /// The socket address to bind. A bare port is expanded to all
    /// interfaces.
    pub fn listen_addr(&self) -> String {
        if self.listen.contains(':') {
            self.listen.clone()
        } else {
            format!("0.0.0.0:{}", self.listen)
        }
    }
}

/// How the raw region value is obtained from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    Static,
    Http,
}

/// Configures how and from where the region value is retrieved.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionRetrieverConfig {
    #[serde(rename = "type")]
    pub kind: RetrieverKind,
    /// Region lookup endpoint (http retriever only).
    #[serde(default)]
    pub url: String,
    /// HTTP method for the lookup; only `GET` is supported.
    #[serde(default)]
    pub method: String,
    /// Name of the query parameter carrying the raw region value.
    #[serde(default)]
    pub query_param: String,
    /// Fixed region returned by the static retriever.
    #[serde(default, rename = "static")]
    pub static_value: String,
    #[serde(default)]
    pub region_resolver: Option<RegionResolverConfig>,
}

/// Configures how the value retrieved over HTTP is translated into a
/// canonical region.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionResolverConfig {
    /// Top-level JSON key holding the raw region in the lookup response.
    pub field: String,
    /// Raw region -> canonical region used to key destination tables.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
}

/// The whole service configuration, loaded once at startup and treated as
/// immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub http: Option<ProtocolConfig>,
    #[serde(default)]
    pub grpc: Option<ProtocolConfig>,
    pub region_retriever: RegionRetrieverConfig,
}

impl ServiceConfig {
    /// Load and validate the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Parse and validate the configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: ServiceConfig = serde_yaml::from_str(data)
            .map_err(|e| PolyRouteError::Config(format!("malformed configuration: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.http.is_none() && self.grpc.is_none() {
            return Err(PolyRouteError::Config(
                "at least one of the http or grpc sections must be configured".into(),
            ));
        }
        Ok(())
    }
}
