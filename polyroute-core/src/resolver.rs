//! Region resolution: turns the raw region value extracted from a request
//! into the canonical region used to key destination tables.

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use crate::config::{RegionRetrieverConfig, RetrieverKind};
use crate::error::{PolyRouteError, Result};

/// A resolver whose only job is to return the correct region for an input.
///
/// Built once from [`RegionRetrieverConfig`] at wiring time and shared by
/// all handlers. The variant is chosen by the configured retriever type.
#[derive(Debug, Clone)]
pub enum RegionResolver {
    Static(StaticResolver),
    Http(HttpResolver),
}

impl RegionResolver {
    pub fn from_config(cfg: &RegionRetrieverConfig) -> Result<Self> {
        match cfg.kind {
            RetrieverKind::Static => Ok(RegionResolver::Static(StaticResolver {
                value: cfg.static_value.clone(),
            })),
            RetrieverKind::Http => Ok(RegionResolver::Http(HttpResolver::from_config(cfg)?)),
        }
    }

    /// Replace the HTTP client used for region lookups, e.g. to plug in a
    /// client with custom timeouts. Does nothing on the static variant.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        if let RegionResolver::Http(resolver) = &mut self {
            resolver.client = client;
        }
        self
    }

    /// Resolve the raw region value into a canonical region.
    pub async fn resolve(&self, input: &str) -> Result<String> {
        match self {
            RegionResolver::Static(resolver) => Ok(resolver.value.clone()),
            RegionResolver::Http(resolver) => resolver.resolve(input).await,
        }
    }
}

/// Always returns the configured region; never fails, never does I/O.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    value: String,
}

/// Resolves the region through an HTTP lookup: the input value is sent as
/// a query parameter, a field is extracted from the JSON response and
/// translated through the configured mapping.
#[derive(Debug, Clone)]
pub struct HttpResolver {
    endpoint: String,
    method: String,
    query_param: String,
    field: String,
    mapping: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl HttpResolver {
    fn from_config(cfg: &RegionRetrieverConfig) -> Result<Self> {
        let resolver = cfg.region_resolver.as_ref().ok_or_else(|| {
            PolyRouteError::Config(
                "the http region retriever requires a region_resolver section".into(),
            )
        })?;
        Ok(HttpResolver {
            endpoint: cfg.url.clone(),
            method: cfg.method.clone(),
            query_param: cfg.query_param.clone(),
            field: resolver.field.clone(),
            mapping: resolver.mapping.clone(),
            client: reqwest::Client::new(),
        })
    }

    async fn resolve(&self, input: &str) -> Result<String> {
        if self.method != "GET" {
            return Err(PolyRouteError::Resolve(format!(
                "unsupported region retriever method: {}",
                self.method
            )));
        }

        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            PolyRouteError::Resolve(format!(
                "failed to parse retriever endpoint ({}): {e}",
                self.endpoint
            ))
        })?;
        set_query_param(&mut url, &self.query_param, input);

        // The response status is deliberately not checked: whatever comes
        // back is parsed as a flat JSON object.
        let response = self.client.get(url).send().await?;
        let body: serde_json::Map<String, Value> = response
            .json()
            .await
            .map_err(|e| PolyRouteError::Resolve(format!("unmarshal response failed: {e}")))?;

        self.translate(&body)
    }

    fn translate(&self, body: &serde_json::Map<String, Value>) -> Result<String> {
        let raw = body.get(&self.field).ok_or_else(|| {
            PolyRouteError::Resolve(format!("region not found at {}", self.field))
        })?;
        let key = raw.as_str().ok_or_else(|| {
            PolyRouteError::Resolve(format!("region at {} is not a string", self.field))
        })?;
        self.mapping
            .get(key)
            .cloned()
            .ok_or_else(|| PolyRouteError::Resolve(format!("no mapping specified for {key}")))
    }
}

/// Set `name=value` on the URL, overwriting any existing value for that
/// name and preserving every other query parameter.
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let existing: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &existing {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(name, value);
}
