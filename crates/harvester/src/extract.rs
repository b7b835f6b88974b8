use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;
use url::Url;

use amoe_core::VerificationItem;

const VERIFY_PATH: &str = "/verify_your_email";
const TOKEN_KEY: &str = "token";

static LABELED_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)one[\s-]*time\s+password(?:\s+code)?\s*:?\s*(?:<[^>]*>\s*)*(\d{6})\b").unwrap()
});

static EMPHASIZED_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(?:strong|b)\b[^>]*>\s*(\d{6})\s*</(?:strong|b)>").unwrap()
});

// Leading '#' and '&' rule out hex colors (#333333) and numeric entities (&#123456;)
static BARE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^#&\w])(\d{6})\b").unwrap());

static ANY_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Which rule produced a code, most specific first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Labeled,
    Emphasized,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub value: String,
    pub source: CodeSource,
}

/// Pulls the verification link and one-time code out of a decoded message body
pub struct Extractor {
    host: String,
    link_re: Regex,
}

impl Extractor {
    pub fn new(verification_host: &str) -> Result<Self, regex::Error> {
        let host = verification_host.trim().to_ascii_lowercase();
        let link_re = Regex::new(&format!(
            r#"https://(?i:{}){}\?{}=[^\s<>"']+"#,
            regex::escape(&host),
            regex::escape(VERIFY_PATH),
            TOKEN_KEY
        ))?;

        Ok(Self { host, link_re })
    }

    /// Both halves of an item, or nothing
    pub fn extract(&self, body: &str) -> Option<VerificationItem> {
        let link = self.extract_link(body);
        let code = extract_code(body);

        match (link, code) {
            (Some(link), Some(code)) => {
                debug!("code {} taken from {:?} rule", code.value, code.source);
                VerificationItem::new(link, code.value)
            }
            (link, code) => {
                debug!(
                    "dropping message: link={}, code={}",
                    link.is_some(),
                    code.is_some()
                );
                None
            }
        }
    }

    /// First verification link in the body, if it has the exact host/path/token shape
    pub fn extract_link(&self, body: &str) -> Option<String> {
        let candidate = self.link_re.find(body)?.as_str();
        let cleaned = candidate
            .replace("&amp;", "&")
            .trim_end_matches(&[')', ']', '.', ',', ';'][..])
            .to_string();

        if self.is_verification_url(&cleaned) {
            Some(cleaned)
        } else {
            debug!("rejecting malformed verification link {}", cleaned);
            None
        }
    }

    fn is_verification_url(&self, link: &str) -> bool {
        let Ok(url) = Url::parse(link) else {
            return false;
        };

        url.scheme() == "https"
            && url.host_str() == Some(self.host.as_str())
            && url.path() == VERIFY_PATH
            && url
                .query_pairs()
                .any(|(key, value)| key == TOKEN_KEY && !value.is_empty())
    }
}

/// Six-digit code by rule precedence: labeled, then emphasized, then an unambiguous bare
/// number outside any URL or tag
pub fn extract_code(body: &str) -> Option<ExtractedCode> {
    if let Some(value) = first_capture(&LABELED_CODE_RE, body) {
        return Some(ExtractedCode {
            value,
            source: CodeSource::Labeled,
        });
    }

    if let Some(value) = first_capture(&EMPHASIZED_CODE_RE, body) {
        return Some(ExtractedCode {
            value,
            source: CodeSource::Emphasized,
        });
    }

    fallback_code(body).map(|value| ExtractedCode {
        value,
        source: CodeSource::Fallback,
    })
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn fallback_code(body: &str) -> Option<String> {
    let without_urls = ANY_URL_RE.replace_all(body, " ");
    // Attribute values (bgcolor="000000", width="100000") are markup, not text
    let text = HTML_TAG_RE.replace_all(&without_urls, " ");

    let candidates: BTreeSet<String> = BARE_CODE_RE
        .captures_iter(&text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if candidates.len() > 1 {
        debug!("ambiguous fallback code, candidates: {:?}", candidates);
        return None;
    }

    candidates.into_iter().next()
}
