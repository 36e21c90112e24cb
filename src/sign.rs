//! Signature version 2 request signing (HMAC-SHA1).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

use crate::query::{percent_encode, QueryParams};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_VERSION: u32 = 2;
pub const SIGNATURE_METHOD: &str = "HmacSHA1";
/// The listing call is always made against the root path.
pub const REQUEST_PATH: &str = "/";

/// A fully signed request. Built once per page and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    host: String,
    path: &'static str,
    canonical_query: String,
    signature: String,
}

impl SignedRequest {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        self.path
    }

    pub fn canonical_query(&self) -> &str {
        &self.canonical_query
    }

    /// The escaped signature, ready to go in a query string.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Canonical query with `&Signature=` appended.
    pub fn query(&self) -> String {
        format!("{}&Signature={}", self.canonical_query, self.signature)
    }

    /// Request URL on `endpoint` (scheme, host and port are taken from it).
    pub fn url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        url.set_path(self.path);
        url.set_query(Some(&self.query()));
        url
    }
}

pub struct Signer {
    host: String,
    secret: String,
}

impl Signer {
    pub fn new(host: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secret: secret.into(),
        }
    }

    /// `GET\n{host}\n/\n{canonical query}`, no trailing newline.
    pub fn string_to_sign(&self, canonical_query: &str) -> String {
        format!("GET\n{}\n{REQUEST_PATH}\n{canonical_query}", self.host)
    }

    /// Base64 of the raw HMAC-SHA1 digest, not yet escaped.
    pub fn signature(&self, canonical_query: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(self.string_to_sign(canonical_query).as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Escaped signature of an already canonical query.
    pub fn sign_canonical(&self, canonical_query: &str) -> String {
        percent_encode(&self.signature(canonical_query)).into_owned()
    }

    /// Signs `params`. They must not already contain a `Signature` entry.
    pub fn sign(&self, params: &QueryParams) -> SignedRequest {
        debug_assert!(params.get("Signature").is_none());
        let canonical_query = params.canonical();
        tracing::debug!(
            string_to_sign = %self.string_to_sign(&canonical_query),
            "signing request"
        );
        let signature = self.sign_canonical(&canonical_query);
        SignedRequest {
            host: self.host.clone(),
            path: REQUEST_PATH,
            canonical_query,
            signature,
        }
    }
}
