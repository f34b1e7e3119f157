use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// How far into the document a `<meta charset>` declaration is looked for.
const META_PRESCAN_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHtml {
    pub html: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

/// Decode raw bytes into UTF-8 using: BOM -> Content-Type charset -> meta charset -> chardetng.
///
/// Decoding is lossy; link discovery prefers a page with a few replacement
/// characters over no page at all.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> DecodedHtml {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    let declared = content_type
        .and_then(charset_param)
        .or_else(|| meta_charset(bytes))
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()));
    if let Some(encoding) = declared {
        return decode_with(bytes, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    decode_with(bytes, detector.guess(None, true))
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(META_PRESCAN_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        .collect();
    (!label.is_empty()).then_some(label)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedHtml {
    let (text, used, had_errors) = enc.decode(bytes);
    DecodedHtml {
        html: text.into_owned(),
        encoding_label: used.name().to_string(),
        had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_wins_over_header() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("<p>é</p>".as_bytes());
        let decoded = decode_html(&bytes, Some("text/html; charset=iso-8859-1"));
        assert_eq!(decoded.encoding_label, "UTF-8");
        assert_eq!(decoded.html, "<p>é</p>");
    }

    #[test]
    fn header_charset_is_used() {
        let bytes = [b'<', b'p', b'>', 0xE9, b'<', b'/', b'p', b'>'];
        let decoded = decode_html(&bytes, Some("text/html; Charset=\"ISO-8859-1\""));
        assert_eq!(decoded.encoding_label, "windows-1252");
        assert_eq!(decoded.html, "<p>é</p>");
    }

    #[test]
    fn meta_charset_is_used_without_header() {
        let mut bytes = b"<html><head><meta charset=\"windows-1252\"></head><p>".to_vec();
        bytes.push(0xE9);
        let decoded = decode_html(&bytes, Some("text/html"));
        assert_eq!(decoded.encoding_label, "windows-1252");
        assert!(decoded.html.ends_with("<p>é"));
        assert!(!decoded.had_errors);
    }
}
