use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;

lazy_static! {
    static ref BARE_URL: Regex = Regex::new(r"https?://[^\s<>\[\]()]+").expect("valid url regex");
}

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', '"', '\''];

/// Validate a link target: http(s) only, with a dotted host.
pub fn sanitize_url(raw: &str) -> Option<String> {
    let url = raw
        .trim()
        .trim_matches(|c| c == '<' || c == '>')
        .trim_matches(|c| c == '"' || c == '\'');

    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return None;
    }

    let parsed = Url::parse(url).ok()?;
    match parsed.host_str() {
        Some(host) if host.contains('.') => Some(url.to_string()),
        _ => None,
    }
}

/// Split text into fragments, pairing each bare URL with its link target.
pub fn split_bare_urls(text: &str) -> Vec<(String, Option<String>)> {
    let mut fragments = Vec::new();
    let mut last_end = 0;

    for found in BARE_URL.find_iter(text) {
        let raw = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        let Some(url) = sanitize_url(raw) else {
            continue;
        };

        if found.start() > last_end {
            fragments.push((text[last_end..found.start()].to_string(), None));
        }
        fragments.push((raw.to_string(), Some(url)));
        last_end = found.start() + raw.len();
    }

    if last_end < text.len() {
        fragments.push((text[last_end..].to_string(), None));
    }

    fragments
}
