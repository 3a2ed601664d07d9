//! Canonical lookup-identifier extraction from hyperlink URLs

use regex::Regex;
use std::sync::OnceLock;

/// TSRC/CMS content identifiers: prefix, a dash-free middle, and exactly
/// six digits. The right-side non-digit guard is applied manually since
/// the regex engine has no lookaround.
fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:TSRC|CMS)-[^-]+-[0-9]{6}").expect("id pattern is valid")
    })
}

fn docid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)docid=").expect("docid pattern is valid"))
}

/// Extract the canonical lookup identifier from a hyperlink's address and
/// sub-address (URL fragment).
///
/// Rules, in order:
/// 1. A TSRC/CMS identifier anywhere in the combined URL, uppercased. A
///    seventh trailing digit disqualifies the candidate.
/// 2. The value of the first `docid=` query parameter, up to the next
///    `&`, trimmed and percent-decoded exactly once.
/// 3. Otherwise empty: the hyperlink is not a lookup candidate.
///
/// The function is pure and total; it never fails on malformed input.
pub fn extract_lookup_id(address: &str, sub_address: &str) -> String {
    let full = if sub_address.is_empty() {
        address.to_string()
    } else {
        format!("{}#{}", address, sub_address)
    };

    for m in id_pattern().find_iter(&full) {
        let next_is_digit = full[m.end()..]
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false);
        if !next_is_digit {
            return m.as_str().to_uppercase();
        }
    }

    if let Some(m) = docid_pattern().find(&full) {
        let rest = &full[m.end()..];
        let value = rest.split('&').next().unwrap_or(rest).trim();
        return match urlencoding::decode(value) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => value.to_string(),
        };
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tsrc_id_uppercased() {
        assert_eq!(
            extract_lookup_id("https://host/page?ref=tsrc-abc-123456", ""),
            "TSRC-ABC-123456"
        );
    }

    #[test]
    fn test_cms_id_in_fragment() {
        assert_eq!(
            extract_lookup_id("https://host/view", "!/doc/CMS-Policy-654321"),
            "CMS-POLICY-654321"
        );
    }

    #[test]
    fn test_seven_digit_tail_rejected() {
        // Six-digit rule must not fire on a seven-digit tail
        assert_eq!(extract_lookup_id("https://host/TSRC-ABC-1234567", ""), "");
    }

    #[test]
    fn test_seven_digit_candidate_does_not_mask_later_id() {
        assert_eq!(
            extract_lookup_id("https://host/TSRC-ABC-1234567/CMS-X-111222", ""),
            "CMS-X-111222"
        );
    }

    #[test]
    fn test_docid_fallback() {
        assert_eq!(
            extract_lookup_id("https://host/x?docid=ABC-1", ""),
            "ABC-1"
        );
    }

    #[test]
    fn test_docid_case_insensitive_and_ampersand_bounded() {
        assert_eq!(
            extract_lookup_id("https://host/x?DocID=abc-9&view=full", ""),
            "abc-9"
        );
    }

    #[test]
    fn test_docid_percent_decoded_once() {
        assert_eq!(
            extract_lookup_id("https://host/x?docid=AB%20CD%2520E", ""),
            "AB CD%20E"
        );
    }

    #[test]
    fn test_docid_in_sub_address() {
        assert_eq!(
            extract_lookup_id("https://host/nuxeo/thesource/", "!/view?docid=DOC-7"),
            "DOC-7"
        );
    }

    #[test]
    fn test_tsrc_takes_precedence_over_docid() {
        assert_eq!(
            extract_lookup_id("https://host/x?docid=TSRC-AA-000111", ""),
            "TSRC-AA-000111"
        );
    }

    #[test]
    fn test_no_candidate() {
        assert_eq!(extract_lookup_id("https://host/plain/page", ""), "");
        assert_eq!(extract_lookup_id("", ""), "");
    }
}
