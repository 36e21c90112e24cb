//! Pulls ranked top-site listings per country from the Alexa Top Sites
//! service and writes one CSV report per country.
//!
//! Pipeline: `query` builds the canonical query, `sign` appends the HMAC
//! signature, `request` walks the pages, `parse` pulls the records out of
//! each response and `report` writes them. `process` ties it together.

mod error;
mod macros;

pub mod config;
pub mod parse;
pub mod process;
pub mod query;
pub mod report;
pub mod request;
pub mod sign;

pub use config::{Config, Credentials};
pub use error::{Error, Result};
pub use parse::SiteRecord;
pub use process::{run, CountryJob};

/// Host the signature is computed against when no endpoint override is given.
pub const SERVICE_HOST: &str = "ats.amazonaws.com";
/// Upstream caps every call at this many records.
pub const COUNT_PER_PAGE: u32 = 100;
pub const DEFAULT_COUNT: u32 = 1000;
pub const DEFAULT_START: u32 = 1;
pub const DEFAULT_COUNTRIES: [&str; 7] = ["us", "au", "br", "ca", "cn", "in", "jp"];
pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
