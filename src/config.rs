//! Run configuration.
//!
//! Everything the pipeline needs is carried in [`Config`] and validated once,
//! before any HTTP client exists.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::{
    Error, Result, COUNT_PER_PAGE, DEFAULT_CONCURRENCY, DEFAULT_COUNT, DEFAULT_COUNTRIES,
    DEFAULT_MAX_RETRIES, DEFAULT_START, DEFAULT_TIMEOUT_SECS, SERVICE_HOST,
};

/// Key pair used to sign every request.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    /// Blank or missing values are rejected.
    pub fn new(access_key_id: Option<String>, secret_access_key: Option<String>) -> Result<Self> {
        let access_key_id = non_blank(access_key_id)
            .ok_or_else(|| Error::Config("missing AWS_ACCESS_KEY_ID".into()))?;
        let secret_access_key = non_blank(secret_access_key)
            .ok_or_else(|| Error::Config("missing AWS_SECRET_ACCESS_KEY".into()))?;
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// Base URL requests are sent to. Its host (and non-default port) is what gets signed.
    pub endpoint: Url,
    pub countries: Vec<String>,
    /// Records wanted per country. Only whole pages are fetched.
    pub count: u32,
    /// 1-based offset of the first record.
    pub start: u32,
    pub page_size: u32,
    pub output_dir: PathBuf,
    pub max_concurrency: usize,
    pub max_retries: usize,
    pub timeout: Duration,
}

impl Config {
    /// Builds a config with defaults for everything but the credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoint: default_endpoint(),
            countries: DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            count: DEFAULT_COUNT,
            start: DEFAULT_START,
            page_size: COUNT_PER_PAGE,
            output_dir: PathBuf::from("."),
            max_concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        Credentials::new(
            Some(self.credentials.access_key_id.clone()),
            Some(self.credentials.secret_access_key.clone()),
        )?;
        if self.countries.is_empty() {
            return Err(Error::Config("no country codes given".into()));
        }
        if self.page_size == 0 || self.page_size > COUNT_PER_PAGE {
            return Err(Error::Config(format!(
                "page size must be between 1 and {COUNT_PER_PAGE}, got {}",
                self.page_size
            )));
        }
        if self.start == 0 {
            return Err(Error::Config("start offset is 1-based".into()));
        }
        if self.last_page_start().is_none() {
            return Err(Error::Config(format!(
                "start offset {} plus count {} runs past the largest offset",
                self.start, self.count
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.countries.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(Error::Config(format!("country {dup} listed more than once")));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.endpoint.host_str().is_none() {
            return Err(Error::Config(format!(
                "endpoint {} has no host",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// `host[:port]` as it appears in the string to sign.
    pub fn signing_host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or(SERVICE_HOST);
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Number of pages fetched per country. A remainder smaller than a page is dropped.
    pub fn pages_per_country(&self) -> u32 {
        self.count / self.page_size
    }

    /// Offset of the last page fetched, `None` when it overflows a `u32`.
    fn last_page_start(&self) -> Option<u32> {
        let pages = self.pages_per_country();
        if pages == 0 {
            return Some(self.start);
        }
        (pages - 1)
            .checked_mul(self.page_size)
            .and_then(|off| self.start.checked_add(off))
    }
}

fn default_endpoint() -> Url {
    Url::parse(&format!("https://{SERVICE_HOST}/")).expect("static endpoint URL is valid")
}

/// Splits a comma separated list of country codes, tolerating whitespace and empty items.
/// Repeated codes are kept once, at their first position.
pub fn parse_countries(list: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    list.split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}
