use std::thread;
use std::time::Duration;

use chrono::DateTime;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue, LAST_MODIFIED, USER_AGENT};

use crate::error::CatalogError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadInfo {
    pub size: Option<u64>,
    pub last_modified: Option<String>,
}

pub trait DownloadProbe: Send + Sync {
    fn probe(&self, url: &str) -> Result<DownloadInfo, CatalogError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl DownloadProbe for NoProbe {
    fn probe(&self, url: &str) -> Result<DownloadInfo, CatalogError> {
        Err(CatalogError::ProbeHttp(format!("offline, not probing {url}")))
    }
}

#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("rescat/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::ProbeHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::ProbeHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, CatalogError> {
        const MAX_RETRIES: usize = 2;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.head(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && err.is_connect() {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::ProbeHttp(err.to_string()));
                }
            }
        }
    }
}

impl DownloadProbe for HttpProbe {
    fn probe(&self, url: &str) -> Result<DownloadInfo, CatalogError> {
        let response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            return Err(CatalogError::ProbeStatus {
                status: response.status().as_u16(),
                message: format!("HEAD {url}"),
            });
        }
        Ok(info_from_headers(response.headers()))
    }
}

pub fn info_from_headers(headers: &HeaderMap) -> DownloadInfo {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok());
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(http_date_to_day);
    DownloadInfo {
        size,
        last_modified,
    }
}

/// `Tue, 15 Nov 1994 08:12:31 GMT` → `1994-11-15`.
pub fn http_date_to_day(value: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_http_dates() {
        assert_eq!(
            http_date_to_day("Tue, 15 Nov 1994 08:12:31 GMT").as_deref(),
            Some("1994-11-15")
        );
        assert_eq!(http_date_to_day("yesterday"), None);
    }

    #[test]
    fn reads_size_and_date_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1024"));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let info = info_from_headers(&headers);
        assert_eq!(info.size, Some(1024));
        assert_eq!(info.last_modified.as_deref(), Some("2015-10-21"));
    }
}
