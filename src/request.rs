use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use url::Url;

use crate::query::QueryParams;
use crate::sign::{SignedRequest, Signer, SIGNATURE_METHOD, SIGNATURE_VERSION};
use crate::{Config, Error, Result};

pub const ACTION: &str = "TopSites";
pub const RESPONSE_GROUP: &str = "Country";
const RETRY_MAX_DELAY_SECS: u64 = 10;

/// One page of a country's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub country: String,
    /// 1-based offset of the first record on the page.
    pub start: u32,
    pub page_size: u32,
}

impl PageWindow {
    /// Every parameter of the listing call, `Signature` excluded.
    pub fn params(&self, access_key_id: &str, timestamp: DateTime<Utc>) -> QueryParams {
        let mut params = QueryParams::new();
        params
            .insert("Action", ACTION)
            .insert("AWSAccessKeyId", access_key_id)
            .insert("Timestamp", timestamp)
            .insert("ResponseGroup", RESPONSE_GROUP)
            .insert("CountryCode", self.country.as_str())
            .insert("Start", self.start)
            .insert("Count", self.page_size)
            .insert("SignatureVersion", SIGNATURE_VERSION)
            .insert("SignatureMethod", SIGNATURE_METHOD);
        params
    }
}

/// Splits `count` records from `start` into whole pages.
/// `count / page_size` pages are produced; a trailing partial page is not requested.
/// Stops early at the first page whose offset doesn't fit in a `u32`.
pub fn page_windows(country: &str, count: u32, start: u32, page_size: u32) -> Vec<PageWindow> {
    if page_size == 0 {
        return Vec::new();
    }
    (0..count / page_size)
        .map_while(|i| i.checked_mul(page_size).and_then(|off| start.checked_add(off)))
        .map(|start| PageWindow {
            country: country.to_string(),
            start,
            page_size,
        })
        .collect()
}

/// Signs and issues page requests. `Client` uses Arc inside, so cloning it is cheap.
pub struct PageFetcher {
    client: Client,
    endpoint: Url,
    access_key_id: String,
    signer: Signer,
    max_retries: usize,
}

impl PageFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            access_key_id: config.credentials.access_key_id.clone(),
            signer: Signer::new(
                config.signing_host(),
                config.credentials.secret_access_key.clone(),
            ),
            max_retries: config.max_retries,
        }
    }

    pub fn signed_request(&self, window: &PageWindow, timestamp: DateTime<Utc>) -> SignedRequest {
        self.signer
            .sign(&window.params(&self.access_key_id, timestamp))
    }

    /// Returns the response body of one page.
    /// Transport errors, 5xx and 429 are retried with exponential backoff.
    pub async fn fetch(&self, window: &PageWindow) -> Result<String> {
        // 100 ms, 200 ms, 400 ms, ...
        let retry_strategy = ExponentialBackoff::from_millis(2)
            .factor(50)
            .max_delay(Duration::from_secs(RETRY_MAX_DELAY_SECS))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            retry_strategy,
            || self.fetch_once(window),
            |err: &Error| {
                let retry = err.is_retriable();
                if retry {
                    tracing::warn!(country = %window.country, start = window.start, "retrying page: {err}");
                }
                retry
            },
        )
        .await
    }

    async fn fetch_once(&self, window: &PageWindow) -> Result<String> {
        // Signed afresh per attempt so the timestamp stays current.
        let url = self.signed_request(window, Utc::now()).url(&self.endpoint);
        tracing::debug!(%url, "requesting page");

        let res = self.client.get(url.clone()).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(res.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Credentials;
    use chrono::TimeZone;

    #[test]
    fn windows_cover_whole_pages() {
        let windows = page_windows("us", 1000, 1, 100);
        assert_eq!(windows.len(), 10);
        let starts: Vec<u32> = windows.iter().map(|w| w.start).collect();
        assert_eq!(starts, [1, 101, 201, 301, 401, 501, 601, 701, 801, 901]);
        assert!(windows.iter().all(|w| w.page_size == 100 && w.country == "us"));
    }

    #[test]
    fn windows_respect_start_offset() {
        let starts: Vec<u32> = page_windows("jp", 300, 51, 100).iter().map(|w| w.start).collect();
        assert_eq!(starts, [51, 151, 251]);
    }

    #[test]
    fn partial_page_is_dropped() {
        assert_eq!(page_windows("us", 150, 1, 100).len(), 1);
        assert!(page_windows("us", 99, 1, 100).is_empty());
        assert!(page_windows("us", 100, 1, 0).is_empty());
    }

    #[test]
    fn offsets_past_u32_are_not_produced() {
        let start = u32::MAX - 50;
        let windows = page_windows("us", 200, start, 100);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, start);

        let last = page_windows("us", 200, u32::MAX - 100, 100);
        assert_eq!(last.iter().map(|w| w.start).collect::<Vec<_>>(), [u32::MAX - 100, u32::MAX]);
    }

    #[test]
    fn params_include_every_required_field() {
        let window = PageWindow {
            country: "br".into(),
            start: 101,
            page_size: 100,
        };
        let ts = Utc.with_ymd_and_hms(2013, 7, 31, 0, 0, 0).unwrap();
        let canonical = window.params("AKID", ts).canonical();
        assert_eq!(
            canonical,
            "AWSAccessKeyId=AKID&Action=TopSites&Count=100&CountryCode=br\
             &ResponseGroup=Country&SignatureMethod=HmacSHA1&SignatureVersion=2&Start=101\
             &Timestamp=2013-07-31T00%3A00%3A00.000Z"
        );
    }

    #[test]
    fn signed_url_targets_endpoint_root() {
        let creds = Credentials::new(Some("AKID".into()), Some("secret".into())).unwrap();
        let mut config = Config::new(creds);
        config.endpoint = Url::parse("http://localhost:9000/api").unwrap();
        let fetcher = PageFetcher::with_client(Client::new(), &config);
        let window = page_windows("us", 100, 1, 100).remove(0);
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap();

        let signed = fetcher.signed_request(&window, ts);
        assert_eq!(signed.host(), "localhost:9000");
        let url = signed.url(&config.endpoint);
        assert_eq!(url.as_str(), format!("http://localhost:9000/?{}", signed.query()));
        assert!(url.query().unwrap().contains("&Signature="));
    }
}
