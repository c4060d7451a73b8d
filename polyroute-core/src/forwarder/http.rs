use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST, TRANSFER_ENCODING, UPGRADE};
use http::{StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};

use crate::config::DestinationTable;
use crate::resolver::RegionResolver;
use crate::routing;

/// Header carrying the raw region value for HTTP requests.
pub const HEADER_REGION_KEY: &str = "X-Poly-Route-Region";

/// Query parameter carrying the raw region value. Used only when
/// [`HEADER_REGION_KEY`] is absent.
pub const QUERY_PARAM_REGION_KEY: &str = "region";

/// Connection-level headers that must not travel to the backend.
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[CONNECTION, TRANSFER_ENCODING, UPGRADE];

/// Reverse proxy for HTTP requests.
///
/// Every inbound request goes through the same pipeline: extract the raw
/// region, resolve it, match the path against the destination table, then
/// stream the request to the chosen backend and the response back to the
/// caller. The forwarder holds no per-request state and is cheap to clone.
#[derive(Clone)]
pub struct HttpForwarder {
    destinations: Arc<DestinationTable>,
    resolver: Arc<RegionResolver>,
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new(destinations: DestinationTable, resolver: Arc<RegionResolver>) -> Self {
        HttpForwarder {
            destinations: Arc::new(destinations),
            resolver,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// An axum router that hands every request to this forwarder. This is
    /// what the outer process mounts on its HTTP listener.
    pub fn router(self) -> axum::Router {
        axum::Router::new().fallback(forward).with_state(self)
    }

    pub async fn handle(&self, req: Request) -> Response {
        let region = match extract_region(&req) {
            Some(region) => region,
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    format!(
                        "missing region (set {HEADER_REGION_KEY} header or ?{QUERY_PARAM_REGION_KEY}=)"
                    ),
                )
                    .into_response();
            }
        };

        let resolved = match self.resolver.resolve(&region).await {
            Ok(resolved) => resolved,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        };

        let target = match routing::find_backend(&self.destinations, req.uri().path(), &resolved) {
            Some(target) => target,
            None => {
                return (StatusCode::BAD_GATEWAY, "no backend for this path/region")
                    .into_response();
            }
        };

        self.forward(&target, req).await
    }

    /// Rewrite the request onto the backend host and stream it through.
    ///
    /// Scheme and authority come from the matched backend URL; the path and
    /// raw query stay exactly as the caller sent them. Headers are copied
    /// verbatim apart from hop-by-hop headers and `Host`, which is replaced
    /// with the backend authority.
    async fn forward(&self, target: &str, req: Request) -> Response {
        let target_uri = match target.parse::<Uri>() {
            Ok(uri) => uri,
            Err(_) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "bad backend url").into_response()
            }
        };
        let authority = match target_uri.authority() {
            Some(authority) => authority.clone(),
            None => return (StatusCode::INTERNAL_SERVER_ERROR, "bad backend url").into_response(),
        };
        let scheme = target_uri.scheme_str().unwrap_or("http");

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let outbound_uri = match format!("{scheme}://{authority}{path_and_query}").parse::<Uri>() {
            Ok(uri) => uri,
            Err(_) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "bad backend url").into_response()
            }
        };

        debug!(backend = %target, path = %path_and_query, "forwarding HTTP request");

        let (mut parts, body) = req.into_parts();
        parts.uri = outbound_uri;
        for header in HOP_BY_HOP_HEADERS {
            parts.headers.remove(header);
        }
        match HeaderValue::from_str(authority.as_str()) {
            Ok(host) => {
                parts.headers.insert(HOST, host);
            }
            Err(_) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, "bad backend url").into_response()
            }
        }

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(mut response) => {
                for header in HOP_BY_HOP_HEADERS {
                    response.headers_mut().remove(header);
                }
                response.map(Body::new).into_response()
            }
            Err(err) => {
                error!(backend = %target, error = %err, "backend request failed");
                (StatusCode::BAD_GATEWAY, "backend request failed").into_response()
            }
        }
    }
}

async fn forward(State(forwarder): State<HttpForwarder>, req: Request) -> Response {
    forwarder.handle(req).await
}

/// Raw region from the request: header first, query parameter fallback.
fn extract_region(req: &Request) -> Option<String> {
    let from_header = req
        .headers()
        .get(HEADER_REGION_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    from_header
        .or_else(|| query_param(req.uri(), QUERY_PARAM_REGION_KEY))
        .filter(|v| !v.is_empty())
}

/// First value of a query parameter, if any.
fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn region_from_header_wins_over_query() {
        let mut req = request("/x?region=from-query");
        req.headers_mut()
            .insert(HEADER_REGION_KEY, "from-header".parse().unwrap());
        assert_eq!(extract_region(&req), Some("from-header".to_string()));
    }

    #[test]
    fn region_falls_back_to_query_param() {
        let req = request("/x?foo=1&region=eu-west");
        assert_eq!(extract_region(&req), Some("eu-west".to_string()));
    }

    #[test]
    fn empty_header_falls_back_to_query_param() {
        let mut req = request("/x?region=eu-west");
        req.headers_mut()
            .insert(HEADER_REGION_KEY, "".parse().unwrap());
        assert_eq!(extract_region(&req), Some("eu-west".to_string()));
    }

    #[test]
    fn missing_region_is_none() {
        assert_eq!(extract_region(&request("/x")), None);
        assert_eq!(extract_region(&request("/x?region=")), None);
    }
}
