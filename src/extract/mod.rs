//! Invite-link extraction from raw page text
//!
//! Scans arbitrary text or HTML for Telegram invite links (`t.me/...`),
//! normalizes the scheme and returns a deduplicated set. Pure string
//! processing: no network, no disk, no panics on malformed input.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// Permissive invite-link pattern: optional scheme, fixed host,
    /// path of alphanumerics and `_+/?=-`. Case-insensitive.
    static ref INVITE_LINK_RE: Regex =
        Regex::new(r"(?i)(?:https?://)?t\.me/[A-Za-z0-9_+/?=-]+").unwrap();
}

/// Extract all Telegram invite links from the given text.
///
/// Every returned link starts with `https://`; matches without a scheme are
/// prefixed. Path case is preserved, so `t.me/abc` and `T.ME/ABC` are two
/// distinct results while `t.me/abc` and `https://t.me/abc` collapse into
/// one.
///
/// # Examples
///
/// ```
/// use tgcollect::extract::extract_invite_links;
///
/// let links = extract_invite_links("join t.me/rustlang today");
/// assert!(links.contains("https://t.me/rustlang"));
/// ```
pub fn extract_invite_links(text: &str) -> HashSet<String> {
    INVITE_LINK_RE
        .find_iter(text)
        .map(|m| normalize_scheme(m.as_str()))
        .collect()
}

/// Ensure a matched link carries the `https://` scheme, preserving the
/// case of everything after it.
fn normalize_scheme(link: &str) -> String {
    let lower = link.to_ascii_lowercase();
    if let Some(idx) = lower.find("://") {
        format!("https://{}", &link[idx + 3..])
    } else {
        format!("https://{link}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_normalization_and_dedup() {
        let links = extract_invite_links("join t.me/abc and T.ME/ABC and https://t.me/abc");

        assert_eq!(links.len(), 2);
        assert!(links.contains("https://t.me/abc"));
        assert!(links.contains("https://T.ME/ABC"));
    }

    #[test]
    fn test_http_scheme_upgraded() {
        let links = extract_invite_links("old link http://t.me/legacy and HTTPS://t.me/legacy");

        assert_eq!(links.len(), 1);
        assert!(links.contains("https://t.me/legacy"));
    }

    #[test]
    fn test_extraction_from_html() {
        let html = r#"<div><a href="https://t.me/+AbCd_123">channel</a>
            <span>backup: t.me/joinchat?start=xyz</span></div>"#;

        let links = extract_invite_links(html);

        assert!(links.contains("https://t.me/+AbCd_123"));
        assert!(links.contains("https://t.me/joinchat?start=xyz"));
    }

    #[test]
    fn test_path_terminates_at_disallowed_chars() {
        let links = extract_invite_links("see t.me/group! and (t.me/other).");

        assert!(links.contains("https://t.me/group"));
        assert!(links.contains("https://t.me/other"));
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_no_matches() {
        assert!(extract_invite_links("no links here").is_empty());
        assert!(extract_invite_links("").is_empty());
        // Host alone has no path to join
        assert!(extract_invite_links("just t.me and nothing else").is_empty());
    }

    #[test]
    fn test_tolerates_malformed_html() {
        let broken = "<a href='t.me/ok <div><<>> \u{0000}\u{FFFD} t.me/also_ok";
        let links = extract_invite_links(broken);

        assert!(links.contains("https://t.me/ok"));
        assert!(links.contains("https://t.me/also_ok"));
    }
}
