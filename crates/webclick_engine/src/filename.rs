use std::collections::HashSet;

use url::Url;

const MAX_STEM_LEN: usize = 80;

/// Hands out archive entry names that are unique within one archive.
///
/// Names are derived from the page title, or from a shortened URL when there
/// is none, and made portable across Windows and Unix filesystems. A repeated
/// name gets a `-2`, `-3`, ... suffix; comparison ignores case.
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    taken: HashSet<String>,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_for(&mut self, url: &str, title: Option<&str>, extension: &str) -> String {
        let stem = title
            .map(sanitize_stem)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| sanitize_stem(&short_url(url)));
        let stem = if stem.is_empty() { "page".to_string() } else { stem };

        let mut candidate = format!("{stem}.{extension}");
        let mut n = 2;
        while !self.taken.insert(candidate.to_lowercase()) {
            candidate = format!("{stem}-{n}.{extension}");
            n += 1;
        }
        candidate
    }
}

/// `host` without `www.` followed by the path, e.g. `example.com/docs/intro`.
pub fn short_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            let host = host.strip_prefix("www.").unwrap_or(host);
            let path = parsed.path().trim_end_matches('/');
            format!("{host}{path}")
        }
        Err(_) => url.to_string(),
    }
}

fn sanitize_stem(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) || c.is_whitespace() { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut stem = compacted.trim_matches(&['_', ' ', '.'][..]).to_string();
    if stem.chars().count() > MAX_STEM_LEN {
        stem = stem.chars().take(MAX_STEM_LEN).collect();
        stem = stem.trim_end_matches(&['_', '.'][..]).to_string();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    stem
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
