//! Fetcher stage: resolve a source locator, retrieve the bytes and make sure
//! the payload is tabular text rather than an HTML error page.

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{ImportError, Result};
use crate::object_store::ObjectStore;

/// How many leading characters of a body are inspected for HTML markers.
const SNIFF_WINDOW: usize = 1000;
/// Length of the body preview carried in `InvalidPayload` errors.
const PREVIEW_LEN: usize = 200;

const HTML_MARKERS: &[&str] = &["<html", "<!doctype", "<head>", "<body>", "<title>"];
const ERROR_PHRASES: &[&str] = &[
    "bad gateway",
    "not found",
    "forbidden",
    "internal server error",
    "service unavailable",
    "gateway timeout",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// An object in our own storage, fetched directly.
    Storage { bucket: String, path: String },
    /// Any other URL, fetched with a plain GET.
    Url(String),
}

impl SourceLocator {
    /// Classify `raw` as own-storage or external.
    ///
    /// `storage://<bucket>/<path>` and URLs under `public_prefix` are own
    /// storage. Anything else must be an http(s) URL.
    pub fn resolve(raw: &str, public_prefix: Option<&str>) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImportError::Locator("csvUrl is empty".to_string()));
        }

        if let Some(rest) = raw.strip_prefix("storage://") {
            return split_bucket_path(rest, raw);
        }
        if let Some(prefix) = public_prefix {
            if let Some(rest) = raw.strip_prefix(prefix) {
                let rest = rest.split(['?', '#']).next().unwrap_or_default();
                return split_bucket_path(rest, raw);
            }
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(SourceLocator::Url(raw.to_string()));
        }
        Err(ImportError::Locator(format!(
            "unsupported source '{}': expected http(s):// or storage:// locator",
            raw
        )))
    }
}

impl std::fmt::Display for SourceLocator {
    /// Canonical form: own-storage objects always print as
    /// `storage://<bucket>/<path>` however they were addressed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocator::Storage { bucket, path } => write!(f, "storage://{}/{}", bucket, path),
            SourceLocator::Url(url) => f.write_str(url),
        }
    }
}

fn split_bucket_path(rest: &str, raw: &str) -> Result<SourceLocator> {
    match rest.split_once('/') {
        Some((bucket, path)) if !bucket.is_empty() && !path.is_empty() => Ok(SourceLocator::Storage {
            bucket: bucket.to_string(),
            path: path.to_string(),
        }),
        _ => Err(ImportError::Locator(format!(
            "storage locator '{}' must name a bucket and a path",
            raw
        ))),
    }
}

/// Decoded payload of one import.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub text: String,
    /// `sha256:<hex>` of the raw bytes.
    pub content_hash: String,
    pub size_bytes: usize,
}

impl FetchedPayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            text: decode_text(bytes),
            content_hash: format!("sha256:{:x}", hasher.finalize()),
            size_bytes: bytes.len(),
        }
    }
}

pub struct Fetcher<'a> {
    client: &'a reqwest::Client,
    objects: &'a dyn ObjectStore,
}

impl<'a> Fetcher<'a> {
    pub fn new(client: &'a reqwest::Client, objects: &'a dyn ObjectStore) -> Self {
        Self { client, objects }
    }

    pub async fn fetch(&self, locator: &SourceLocator) -> Result<FetchedPayload> {
        match locator {
            SourceLocator::Storage { bucket, path } => {
                info!(bucket = %bucket, path = %path, "Downloading CSV from storage");
                let bytes = self
                    .objects
                    .download(bucket, path)
                    .await
                    .map_err(|e| ImportError::StorageFetch {
                        bucket: bucket.clone(),
                        path: path.clone(),
                        reason: format!("{:#}", e),
                    })?;
                Ok(FetchedPayload::from_bytes(&bytes))
            }
            SourceLocator::Url(url) => self.fetch_url(url).await,
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<FetchedPayload> {
        info!(url = %url, "Fetching CSV");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImportError::http(url, e))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = resp.bytes().await.map_err(|e| ImportError::http(url, e))?;
        let payload = FetchedPayload::from_bytes(&bytes);

        // An error page is more useful to report than the bare status code.
        check_payload(&payload.text, &content_type)?;
        if !status.is_success() {
            return Err(ImportError::http(url, format!("HTTP {}", status)));
        }

        info!(
            bytes = payload.size_bytes,
            content_type = %content_type,
            hash = %payload.content_hash,
            "Downloaded CSV"
        );
        Ok(payload)
    }
}

/// Reject HTML error pages, by body sniff first and declared type second.
pub fn check_payload(text: &str, content_type: &str) -> Result<()> {
    if looks_like_html(text) || content_type.to_ascii_lowercase().contains("text/html") {
        let err = ImportError::InvalidPayload {
            title: extract_title(text),
            preview: preview(text),
        };
        warn!(content_type = %content_type, "{}", err);
        return Err(err);
    }
    Ok(())
}

pub fn looks_like_html(text: &str) -> bool {
    let head: String = text.chars().take(SNIFF_WINDOW).collect::<String>().to_ascii_lowercase();
    if HTML_MARKERS.iter().any(|m| head.contains(m)) {
        return true;
    }
    head.contains('<') && ERROR_PHRASES.iter().any(|p| head.contains(p))
}

/// Text between the first `<title>` and `</title>`, if any.
pub fn extract_title(text: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    let title = text[start..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > PREVIEW_LEN {
        let cut: String = collapsed.chars().take(PREVIEW_LEN).collect();
        format!("{}...", cut)
    } else {
        collapsed
    }
}

/// UTF-8 (BOM stripped) when valid, Windows-1252 otherwise.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://files.example.com/storage/v1/object/public/";

    #[test]
    fn resolve_storage_scheme() {
        let loc = SourceLocator::resolve("storage://csv-imports/2024/ga.csv", None).unwrap();
        assert_eq!(
            loc,
            SourceLocator::Storage {
                bucket: "csv-imports".into(),
                path: "2024/ga.csv".into()
            }
        );
    }

    #[test]
    fn resolve_own_public_url_as_storage() {
        let url = format!("{}csv-imports/ga.csv?t=123", PREFIX);
        let loc = SourceLocator::resolve(&url, Some(PREFIX)).unwrap();
        assert_eq!(
            loc,
            SourceLocator::Storage {
                bucket: "csv-imports".into(),
                path: "ga.csv".into()
            }
        );
    }

    #[test]
    fn resolve_external_url() {
        let loc = SourceLocator::resolve(" https://lottery.example.org/games.csv ", Some(PREFIX)).unwrap();
        assert_eq!(loc, SourceLocator::Url("https://lottery.example.org/games.csv".into()));
    }

    #[test]
    fn public_url_and_storage_scheme_share_canonical_form() {
        let url = format!("{}csv-imports/ga.csv", PREFIX);
        let via_url = SourceLocator::resolve(&url, Some(PREFIX)).unwrap();
        let via_scheme = SourceLocator::resolve("storage://csv-imports/ga.csv", Some(PREFIX)).unwrap();
        assert_eq!(via_url.to_string(), "storage://csv-imports/ga.csv");
        assert_eq!(via_url.to_string(), via_scheme.to_string());
    }

    #[test]
    fn resolve_rejects_garbage() {
        assert!(matches!(SourceLocator::resolve("", None), Err(ImportError::Locator(_))));
        assert!(matches!(SourceLocator::resolve("ftp://x/y.csv", None), Err(ImportError::Locator(_))));
        assert!(matches!(SourceLocator::resolve("storage://bucket-only", None), Err(ImportError::Locator(_))));
    }

    #[test]
    fn sniff_detects_doctype_and_title() {
        let body = "<!DOCTYPE html><html><title>502 Bad Gateway</title></html>";
        let err = check_payload(body, "text/plain").unwrap_err();
        match &err {
            ImportError::InvalidPayload { title, .. } => {
                assert_eq!(title.as_deref(), Some("502 Bad Gateway"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("502 Bad Gateway"));
    }

    #[test]
    fn sniff_detects_error_phrase_with_angle_bracket() {
        assert!(looks_like_html("<h1>404 Not Found</h1>"));
        assert!(looks_like_html("<p>Forbidden</p>"));
        // The phrase alone, with no markup, may legitimately appear in data.
        assert!(!looks_like_html("game_name\nNot Found Yet\n"));
    }

    #[test]
    fn sniff_only_looks_at_leading_window() {
        let mut body = "game_number,game_name,state\n".to_string();
        while body.len() < 1200 {
            body.push_str("1,Lucky,GA\n");
        }
        body.push_str("<html>");
        assert!(!looks_like_html(&body));
    }

    #[test]
    fn content_type_html_is_rejected_even_when_body_looks_fine() {
        let err = check_payload("game_number,game_name\n1,Lucky\n", "text/html; charset=utf-8").unwrap_err();
        assert!(matches!(err, ImportError::InvalidPayload { title: None, .. }));
    }

    #[test]
    fn csv_passes_checks() {
        check_payload("game_number,game_name,state\n1,Lucky,GA\n", "text/csv").unwrap();
    }

    #[test]
    fn preview_is_truncated() {
        let body = format!("<html>{}", "x".repeat(500));
        match check_payload(&body, "").unwrap_err() {
            ImportError::InvalidPayload { preview, .. } => {
                assert!(preview.ends_with("..."));
                assert_eq!(preview.chars().count(), PREVIEW_LEN + 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn decode_strips_bom_and_falls_back_to_cp1252() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFgame"), "game");
        // 0xE9 is 'é' in Windows-1252 and invalid as standalone UTF-8.
        assert_eq!(decode_text(b"Caf\xE9"), "Café");
    }

    #[test]
    fn payload_hash_is_prefixed_sha256() {
        let payload = FetchedPayload::from_bytes(b"abc");
        assert_eq!(
            payload.content_hash,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(payload.size_bytes, 3);
    }
}
