//! Transport-security rules applied to every outgoing URL.
//!
//! When the client runs in a secure context, nothing may leave over plain
//! `http://`. Base URL and path are checked individually and then again as
//! the joined URL, because two harmless-looking halves (`"http:"` and
//! `"//api.example.com/v1"`) can still join into an insecure address.

use reqwest::Url;

const INSECURE_SCHEME: &str = "http://";
const SECURE_SCHEME: &str = "https://";

/// True when `url` would leave over plain http.
///
/// The URL is read the way reqwest will read it, so `http:/host` and
/// `http:host` count as insecure too. Text that does not parse as an
/// absolute URL falls back to a literal prefix check.
pub fn is_insecure(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.scheme() == "http",
        Err(_) => has_insecure_prefix(url),
    }
}

fn has_insecure_prefix(url: &str) -> bool {
    url.trim_start()
        .get(..INSECURE_SCHEME.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(INSECURE_SCHEME))
}

/// Rewrite a leading `http://` to `https://`; anything else is returned unchanged.
pub fn upgrade(url: &str) -> String {
    let trimmed = url.trim_start();
    match trimmed.get(INSECURE_SCHEME.len()..) {
        Some(rest) if has_insecure_prefix(trimmed) => format!("{SECURE_SCHEME}{rest}"),
        _ => url.to_string(),
    }
}

/// `scheme://...` with an RFC 3986 scheme.
pub fn is_absolute(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Join a base URL and a request path with exactly one separating slash.
/// An absolute path wins over the base.
pub fn combine(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    if base.is_empty() || is_absolute(path) {
        return path.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Coerce `(base, path)` so that neither half nor their join uses http.
///
/// If the join still resolves to an http URL after the per-field upgrade, it
/// is switched to https and split back into origin and path.
pub fn enforce(base: &str, path: &str) -> (String, String) {
    let base = upgrade(base);
    let path = upgrade(path);

    let joined = combine(&base, &path);
    match Url::parse(joined.trim()) {
        Ok(mut url) if url.scheme() == "http" => {
            if url.set_scheme("https").is_ok() {
                tracing::debug!("Re-split insecure request URL into secure origin and path");
                split_parsed(&url)
            } else {
                (base, path)
            }
        }
        Ok(_) => (base, path),
        Err(_) if has_insecure_prefix(&joined) => split(&upgrade(&joined)),
        Err(_) => (base, path),
    }
}

/// Split an absolute URL into `(origin, path?query#fragment)`.
pub fn split(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => split_parsed(&parsed),
        _ => (String::new(), url.to_string()),
    }
}

fn split_parsed(url: &Url) -> (String, String) {
    let mut rest = url.path().to_string();
    if let Some(query) = url.query() {
        rest.push('?');
        rest.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        rest.push('#');
        rest.push_str(fragment);
    }
    (url.origin().ascii_serialization(), rest)
}

/// Normalise the configured API base: trimmed, no trailing slash, upgraded when secure.
pub fn normalize_base(raw: &str, secure_context: bool) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if secure_context {
        upgrade(trimmed)
    } else {
        trimmed.to_string()
    }
}
