//! Response body decoding with charset detection from the bytes themselves.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Decodes `bytes` into text, detecting the charset from content.
///
/// A byte-order mark wins; otherwise the detector guesses, using the host's
/// top-level domain as a hint. Malformed sequences become U+FFFD.
/// Returns the decoded text and the name of the encoding used.
#[must_use]
pub fn decode_body(bytes: &[u8], host: Option<&str>) -> (String, &'static str) {
    if bytes.is_empty() {
        return (String::new(), encoding_rs::UTF_8.name());
    }

    let encoding = Encoding::for_bom(bytes).map_or_else(
        || {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            let tld = host.and_then(|h| h.rsplit('.').next()).map(str::as_bytes);
            detector.guess(tld, true)
        },
        |(encoding, _bom_len)| encoding,
    );

    let (text, used, _had_errors) = encoding.decode(bytes);
    (text.into_owned(), used.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_utf8() {
        let (text, name) = decode_body("héllo wörld".as_bytes(), Some("example.com"));
        assert_eq!(text, "héllo wörld");
        assert_eq!(name, "UTF-8");
    }

    #[test]
    fn test_gbk_bytes_without_header() {
        let (bytes, _, _) = encoding_rs::GBK.encode("中文网页内容，这里有一些中文文本用于检测编码。");
        let (text, _) = decode_body(&bytes, Some("blog.csdn.net"));
        assert!(text.contains("中文网页内容"), "decoded: {text}");
    }

    #[test]
    fn test_bom_wins() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "hi".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, name) = decode_body(&bytes, None);
        assert_eq!(text, "hi");
        assert_eq!(name, "UTF-16LE");
    }

    #[test]
    fn test_empty_body() {
        let (text, _) = decode_body(&[], None);
        assert!(text.is_empty());
    }
}
