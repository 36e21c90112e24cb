use std::sync::Arc;

use roxmltree::{Document, Node};
use tokio::task::spawn_blocking;

use crate::request::PageWindow;
use crate::{Error, Result};

/// One ranked site, as it ends up in a report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    pub rank: u32,
    pub site: String,
    pub country: String,
}

/// Parses a response body off the async runtime.
pub(crate) async fn parse_page(xml: Arc<String>, window: PageWindow) -> Result<Vec<SiteRecord>> {
    spawn_blocking(move || extract_sites(&xml, &window)).await?
}

/// Pulls every `Site` element out of a `Country` response group, in document order.
///
/// Elements are matched on local name, so both prefixed (`aws:Site`) and
/// default-namespace documents work. A well-formed document without any
/// sites (an exhausted listing, or an error document) gives an empty `Vec`.
/// Only a document that isn't well-formed XML is an error.
pub fn extract_sites(xml: &str, window: &PageWindow) -> Result<Vec<SiteRecord>> {
    let doc = Document::parse(xml).map_err(|err| Error::MalformedResponse {
        offset: window.start,
        reason: err.to_string(),
    })?;

    let mut records = Vec::with_capacity(window.page_size as usize);
    for site in doc.descendants().filter(|n| is_named(n, "Site")) {
        let Some(url) = child(site, "DataUrl").and_then(text) else {
            tracing::debug!(country = %window.country, "site without DataUrl, skipping");
            continue;
        };
        let rank = child(site, "Country")
            .and_then(|c| child(c, "Rank"))
            .and_then(text)
            .and_then(|r| r.parse::<u32>().ok())
            .filter(|r| *r > 0);
        let Some(rank) = rank else {
            tracing::debug!(country = %window.country, site = url, "site without a usable rank, skipping");
            continue;
        };

        records.push(SiteRecord {
            rank,
            site: url.to_string(),
            country: window.country.clone(),
        });
    }
    Ok(records)
}

#[inline]
fn is_named(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_named(n, name))
}

fn text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}
