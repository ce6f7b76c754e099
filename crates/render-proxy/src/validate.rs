//! Target URL validation.

use url::Url;

/// Parse `raw` as an absolute URL the proxy is willing to render.
///
/// Returns `None` on any parse failure or when the scheme is anything
/// other than `http` or `https`.
pub fn parse_fetchable(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Whether `raw` is an absolute `http`/`https` URL.
pub fn is_fetchable(raw: &str) -> bool {
    parse_fetchable(raw).is_some()
}

/// Scheme and authority of `url`, e.g. `https://example.com:8443`.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
