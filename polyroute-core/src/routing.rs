//! Entrypoint matching: picks a backend URL out of a destination table.
//!
//! The entrypoint is the routing key of a request - the URL path for HTTP,
//! the full `/package.Service/Method` string for gRPC. Table keys come in
//! three forms: exact strings, prefix wildcards (`P/*`) and the catch-all
//! `*`.

use tracing::debug;

use crate::config::DestinationTable;

/// Look up the backend URL for an (entrypoint, region) pair.
///
/// Key selection: an exact key always wins. Otherwise every wildcard key
/// that matches is a candidate and the longest one is chosen; `*` matches
/// anything and, being the shortest possible key, only wins when nothing
/// else does. A prefix wildcard `P/*` matches `P` itself as well as
/// anything starting with `P`.
///
/// Once a key is chosen its region mapping is consulted; a region missing
/// there means no backend, the match does not fall through to other keys.
///
/// The returned URL is the configured backend joined with the residual
/// part of the entrypoint: nothing for an exact match, everything after
/// the wildcard prefix for `P/*`, and the whole entrypoint for `*`.
pub fn find_backend(table: &DestinationTable, entrypoint: &str, region: &str) -> Option<String> {
    let key = match_key(table, entrypoint)?;
    let base = table.get(key)?.get(region)?;
    Some(join_backend(base, residual(key, entrypoint)))
}

fn match_key<'a>(table: &'a DestinationTable, entrypoint: &str) -> Option<&'a str> {
    if let Some((key, _)) = table.get_key_value(entrypoint) {
        return Some(key.as_str());
    }

    let mut best: Option<&str> = None;
    for key in table.keys().map(String::as_str) {
        let matches = key == "*"
            || (key.ends_with("/*")
                && (entrypoint.starts_with(&key[..key.len() - 1])
                    || entrypoint.starts_with(&key[..key.len() - 2])));
        if !matches {
            continue;
        }
        match best {
            Some(current) if key.len() == current.len() => {
                // Equal-length candidates are a configuration smell; the
                // table iterates in order, so the smaller key sticks.
                debug!(kept = %current, ignored = %key, "ambiguous wildcard destinations");
            }
            Some(current) if key.len() < current.len() => {}
            _ => best = Some(key),
        }
    }
    best
}

/// The part of the entrypoint not consumed by the winning key.
fn residual<'a>(key: &str, entrypoint: &'a str) -> &'a str {
    if key == "*" {
        entrypoint
    } else if key.ends_with("/*") {
        // Strip through the trailing slash of the prefix. An entrypoint
        // equal to the bare prefix leaves nothing.
        entrypoint.get(key.len() - 1..).unwrap_or("")
    } else {
        ""
    }
}

/// Concatenate base URL and residual with exactly one `/` at the seam.
fn join_backend(base: &str, residual: &str) -> String {
    if residual.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        residual.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table(entries: &[(&str, &[(&str, &str)])]) -> DestinationTable {
        entries
            .iter()
            .map(|(key, mappings)| {
                (
                    key.to_string(),
                    mappings
                        .iter()
                        .map(|(r, u)| (r.to_string(), u.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                )
            })
            .collect()
    }

    #[test]
    fn match_all_wildcard() {
        let t = table(&[("*", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect/test/v1/config".to_string())
        );
    }

    #[test]
    fn match_all_wildcard_with_slash() {
        let t = table(&[("/*", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect/test/v1/config".to_string())
        );
    }

    #[test]
    fn exact_match() {
        let t = table(&[("/test/v1/config", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect".to_string())
        );
    }

    #[test]
    fn partial_wildcard_match() {
        let t = table(&[("/test/*", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect/v1/config".to_string())
        );
    }

    #[test]
    fn partial_wildcard_match_trailing_slash() {
        let t = table(&[("/test/*", &[("region", "http://localhost:8080/redirect/")])]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect/v1/config".to_string())
        );
    }

    #[test]
    fn partial_wildcard_matches_bare_prefix() {
        let t = table(&[("/test/*", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(
            find_backend(&t, "/test", "region"),
            Some("http://localhost:8080/redirect".to_string())
        );
    }

    #[test]
    fn best_match_wins() {
        let t = table(&[
            ("*", &[("region", "http://localhost")]),
            ("/test/*", &[("region", "http://localhost")]),
            ("/test/v1/*", &[("region", "http://localhost")]),
            ("/test/v1/config", &[("region", "http://localhost:8080/redirect")]),
        ]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://localhost:8080/redirect".to_string())
        );
    }

    #[test]
    fn longest_wildcard_wins_without_exact() {
        let t = table(&[
            ("/test/*", &[("region", "http://short")]),
            ("/test/v1/*", &[("region", "http://long")]),
        ]);
        assert_eq!(
            find_backend(&t, "/test/v1/config", "region"),
            Some("http://long/config".to_string())
        );
    }

    #[test]
    fn sibling_wildcards_do_not_interfere() {
        let t = table(&[
            ("/ab/*", &[("region", "http://first")]),
            ("/ac/*", &[("region", "http://second")]),
        ]);
        assert_eq!(
            find_backend(&t, "/ab/x", "region"),
            Some("http://first/x".to_string())
        );
        assert_eq!(
            find_backend(&t, "/ac/x", "region"),
            Some("http://second/x".to_string())
        );
    }

    #[test]
    fn grpc_method_through_match_all() {
        let t = table(&[("*", &[("region", "localhost:8080")])]);
        assert_eq!(
            find_backend(&t, "/mockserver.v1.MockService/Invoke", "region"),
            Some("localhost:8080/mockserver.v1.MockService/Invoke".to_string())
        );
    }

    #[test]
    fn grpc_method_partial_wildcard() {
        let t = table(&[(
            "/mockserver.v1.MockService/*",
            &[("region", "localhost:8080/mockserver.v1.MockService")],
        )]);
        assert_eq!(
            find_backend(&t, "/mockserver.v1.MockService/Invoke", "region"),
            Some("localhost:8080/mockserver.v1.MockService/Invoke".to_string())
        );
    }

    #[test]
    fn no_match() {
        let t = table(&[("/test/v1/config", &[("region", "http://localhost:8080/redirect")])]);
        assert_eq!(find_backend(&t, "/test/v2/config", "region"), None);
    }

    #[test]
    fn empty_table_never_matches() {
        let t = DestinationTable::new();
        assert_eq!(find_backend(&t, "/anything", "region"), None);
    }

    #[test]
    fn missing_region_does_not_fall_through() {
        // The exact key wins the match, so the catch-all mapping for the
        // region must not be consulted.
        let t = table(&[
            ("/test/v1/config", &[("eu", "http://exact")]),
            ("*", &[("us", "http://fallback")]),
        ]);
        assert_eq!(find_backend(&t, "/test/v1/config", "us"), None);
    }
}
