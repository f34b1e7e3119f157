use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;
use webclick_core::{is_web_url, normalize_url, ChildLink};

const DEFAULT_MAX_LINKS: usize = 5_000;

/// Extensions of resources that are downloads rather than pages.
const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "apk", "avi", "bmp", "bz2", "css", "dmg", "doc", "docx", "eot", "epub", "exe", "flac",
    "gif", "gz", "ico", "iso", "jpeg", "jpg", "js", "json", "m4a", "mkv", "mov", "mp3", "mp4",
    "msi", "odp", "ods", "odt", "ogg", "pdf", "png", "ppt", "pptx", "rar", "rss", "svg", "tar",
    "tgz", "tif", "tiff", "ttf", "wav", "webm", "webp", "woff", "woff2", "xls", "xlsx", "xml",
    "xz", "zip",
];

/// Which anchors of a page become child links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFilter {
    pub max_links: usize,
    pub same_host_only: bool,
    pub skip_binary_links: bool,
}

impl Default for LinkFilter {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            same_host_only: false,
            skip_binary_links: true,
        }
    }
}

/// Extracts the outbound page links of one document, in document order.
///
/// Relative hrefs resolve against `<base href>` when present, otherwise
/// against `page_url`. Every result is normalized, http(s), distinct and
/// different from `page_url`; the first title seen for a URL wins.
pub fn extract_links(html: &str, page_url: &Url, filter: &LinkFilter) -> Vec<ChildLink> {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);
    let self_url = normalize_url(page_url.as_str()).ok();

    let Some(anchor_sel) = Selector::parse("a[href]").ok() else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    if let Some(own) = &self_url {
        seen.insert(own.clone());
    }

    let mut links = Vec::new();
    for anchor in document.select(&anchor_sel) {
        if links.len() >= filter.max_links {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_href(href, &base) else {
            continue;
        };
        if filter.skip_binary_links && looks_binary(&url) {
            continue;
        }
        if filter.same_host_only && !same_host(&url, page_url) {
            continue;
        }
        let Ok(normalized) = normalize_url(url.as_str()) else {
            continue;
        };
        if !is_web_url(&normalized) || !seen.insert(normalized.clone()) {
            continue;
        }
        let title = anchor_title(anchor).unwrap_or_else(|| normalized.clone());
        links.push(ChildLink::new(normalized, title));
    }
    links
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn resolve_href(reference: &str, base: &Url) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return None;
    }
    let url = base.join(trimmed).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn looks_binary(url: &Url) -> bool {
    let Some(last) = url.path_segments().and_then(|mut segments| segments.next_back()) else {
        return false;
    };
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

fn same_host(url: &Url, page_url: &Url) -> bool {
    fn bare(host: Option<&str>) -> Option<String> {
        host.map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    }
    bare(url.host_str()) == bare(page_url.host_str())
}

/// Anchor text, then its `title` attribute, then the `alt` of a nested image.
fn anchor_title(anchor: ElementRef) -> Option<String> {
    let text = collapse_whitespace(&anchor.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }
    if let Some(title) = anchor.value().attr("title").map(collapse_whitespace) {
        if !title.is_empty() {
            return Some(title);
        }
    }
    let img_sel = Selector::parse("img[alt]").ok()?;
    anchor
        .select(&img_sel)
        .filter_map(|img| img.value().attr("alt"))
        .map(collapse_whitespace)
        .find(|alt| !alt.is_empty())
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
