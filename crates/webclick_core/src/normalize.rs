use url::Url;

/// Schemes that are written without `//` after the colon.
const OPAQUE_SCHEMES: &[&str] = &["mailto", "tel", "javascript", "data", "about", "blob"];

/// Schemes the archive pipeline refuses outright.
const UNSUPPORTED_SCHEMES: &[&str] = &["mailto", "tel"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("invalid url {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error("unsupported scheme {scheme:?} in {input:?}")]
    UnsupportedScheme { scheme: String, input: String },
}

/// Canonicalizes user input into the absolute URL string used as identity key.
///
/// - `https://` is prepended when no scheme is present.
/// - `mailto:` and `tel:` are rejected.
/// - The fragment is dropped, and a bare-host URL keeps no trailing slash, so
///   `"example.com"` becomes `"https://example.com"`.
///
/// Normalizing an already-normalized URL returns it unchanged.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::InvalidUrl {
            input: raw.to_string(),
            reason: "empty input".to_string(),
        });
    }
    check_supported_scheme(trimmed)?;

    let candidate = if explicit_scheme(trimmed).is_some() {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|err| UrlError::InvalidUrl {
        input: raw.to_string(),
        reason: err.to_string(),
    })?;
    url.set_fragment(None);
    Ok(canonical_string(&url))
}

/// Rejects `mailto:` and `tel:` targets.
pub fn check_supported_scheme(raw: &str) -> Result<(), UrlError> {
    if let Some(scheme) = explicit_scheme(raw.trim()) {
        if UNSUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(UrlError::UnsupportedScheme {
                scheme,
                input: raw.to_string(),
            });
        }
    }
    Ok(())
}

/// True for absolute `http`/`https` URLs with a host.
pub fn is_web_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Lowercased scheme when `input` carries one explicitly.
///
/// `localhost:8080/x` has no explicit scheme: only `scheme://` and the known
/// opaque schemes count.
fn explicit_scheme(input: &str) -> Option<String> {
    let (head, rest) = input.split_once(':')?;
    let mut chars = head.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    let scheme = head.to_ascii_lowercase();
    if rest.starts_with("//") || OPAQUE_SCHEMES.contains(&scheme.as_str()) {
        Some(scheme)
    } else {
        None
    }
}

/// Drops the single `/` path of a bare-host URL. Host-less URLs such as
/// `file:///` keep it, since `file:` would no longer parse back to them.
fn canonical_string(url: &Url) -> String {
    let text = url.as_str();
    let has_host = url.host_str().is_some_and(|host| !host.is_empty());
    if has_host && url.path() == "/" && url.query().is_none() {
        text.strip_suffix('/').unwrap_or(text).to_string()
    } else {
        text.to_string()
    }
}
