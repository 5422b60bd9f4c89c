//! Outgoing request rewriting for the reverse proxy.
//!
//! Order matters: forwarding headers are derived from the inbound request, then the
//! directive's modifier runs, then the URI is pointed at the upstream. The inbound `Host` is
//! kept so virtual-hosting upstreams see the name the caller used.
use std::net::SocketAddr;

use http::{
    HeaderMap, HeaderName, HeaderValue, Uri, Version, header,
    request::Parts,
    uri::InvalidUri,
};
use url::{Position, Url};

use crate::core::{gateway::RequestModifier, rules::request_host};

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Connection-scoped headers that must not cross the proxy (RFC 9110 §7.6.1).
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Rewrite an inbound request head into the head sent upstream.
pub fn rewrite_request(
    parts: &mut Parts,
    client_addr: Option<SocketAddr>,
    target: &Url,
    modifier: RequestModifier,
) -> Result<(), InvalidUri> {
    let inbound_host = request_host(parts).map(str::to_owned);
    let prior_forwarded_for = forwarded_chain(&parts.headers);

    remove_hop_by_hop(&mut parts.headers);
    parts.headers.remove(&X_FORWARDED_FOR);
    parts.headers.remove(&X_FORWARDED_HOST);
    parts.headers.remove(&X_FORWARDED_PROTO);

    if let Some(addr) = client_addr {
        let chain = match prior_forwarded_for {
            Some(prior) => format!("{prior}, {}", addr.ip()),
            None => addr.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            parts.headers.insert(X_FORWARDED_FOR.clone(), value);
        }
    }
    if let Some(value) = inbound_host
        .as_deref()
        .and_then(|host| HeaderValue::from_str(host).ok())
    {
        parts.headers.insert(X_FORWARDED_HOST.clone(), value.clone());
        parts.headers.insert(header::HOST, value);
    }
    parts
        .headers
        .insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));

    modifier(parts);

    parts.uri = upstream_uri(target, &parts.uri)?;
    parts.version = Version::HTTP_11;
    Ok(())
}

/// Target origin + joined path + merged query.
pub fn upstream_uri(target: &Url, inbound: &Uri) -> Result<Uri, InvalidUri> {
    let origin = &target[..Position::BeforePath];
    let path = join_paths(target.path(), inbound.path());

    let query = match (target.query().filter(|q| !q.is_empty()), inbound.query()) {
        (Some(base), Some(extra)) if !extra.is_empty() => Some(format!("{base}&{extra}")),
        (Some(base), _) => Some(base.to_string()),
        (None, extra) => extra.map(str::to_owned),
    };

    let mut uri = format!("{origin}{path}");
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(&query);
    }
    uri.parse()
}

/// Concatenate two path segments with exactly one slash between them.
fn join_paths(base: &str, suffix: &str) -> String {
    match (base.ends_with('/'), suffix.starts_with('/')) {
        (true, true) => format!("{base}{}", &suffix[1..]),
        (false, false) => format!("{base}/{suffix}"),
        _ => format!("{base}{suffix}"),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    // Body framing is redone by the server side of the proxy.
    headers.remove(header::TRANSFER_ENCODING);
}

fn forwarded_chain(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join(", "))
}

/// Absolute form of the inbound URL, for logging.
pub fn downstream_url(parts: &Parts) -> String {
    if parts.uri.authority().is_some() {
        return parts.uri.to_string();
    }
    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());
    match request_host(parts) {
        Some(host) => format!("http://{host}{path}"),
        None => path.to_string(),
    }
}
