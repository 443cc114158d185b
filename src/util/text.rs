use html_escape::decode_html_entities;

/// Decodes HTML character entities and trims surrounding whitespace.
///
/// Feed publishers frequently double-escape markup, so after the XML layer has
/// resolved `&amp;` a title can still read `Rust &#39;s &quot;new&quot; release`.
/// Both named (`&quot;`) and numeric (`&#39;`, `&#x27;`) entities are resolved.
///
/// # Examples
///
/// ```
/// use feedagg::util::decode_entities;
///
/// assert_eq!(decode_entities("&lt;b&gt;bold&lt;/b&gt;"), "<b>bold</b>");
/// assert_eq!(decode_entities("It&#39;s  "), "It's");
/// ```
pub fn decode_entities(s: &str) -> String {
    decode_html_entities(s).trim().to_string()
}

/// Maps an empty (or whitespace-only) string to `None`.
///
/// Posts store missing titles and descriptions as absent values rather than
/// empty strings.
pub fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_named_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&quot;quoted&quot;"), "\"quoted\"");
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_entities("It&#39;s"), "It's");
        assert_eq!(decode_entities("It&#x27;s"), "It's");
    }

    #[test]
    fn test_decode_leaves_plain_text() {
        assert_eq!(decode_entities("plain text"), "plain text");
        assert_eq!(decode_entities(""), "");
    }

    #[test]
    fn test_decode_trims() {
        assert_eq!(decode_entities("\n  Title\t"), "Title");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(String::new()), None);
        assert_eq!(non_empty(" \n ".to_string()), None);
        assert_eq!(non_empty("x".to_string()), Some("x".to_string()));
    }

    proptest! {
        #[test]
        fn decode_is_identity_without_ampersands(s in "[a-zA-Z0-9 ,.!?]{0,64}") {
            prop_assert_eq!(decode_entities(&s), s.trim());
        }

        #[test]
        fn decode_never_panics(s in "\\PC{0,128}") {
            let _ = decode_entities(&s);
        }
    }
}
