#![forbid(unsafe_code)]

//! Server-side pagination position.
//!
//! List endpoints answer with absolute links for the neighbouring pages, e.g.
//! `https://api.example.com/v1/users?page=2`. Only the `page` query parameter
//! is kept; the rest of the link is rebuilt by the endpoint builder on the
//! next request.

use serde::{Deserialize, Deserializer};
use url::Url;

/// Pagination position returned with every page.
///
/// `next_page == None` means the listing is exhausted. A cursor is replaced
/// wholesale after each successful fetch and never edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PageCursor {
    /// Total number of items the server reports for the listing.
    #[serde(rename = "count", default)]
    pub total_count: u64,
    #[serde(rename = "next", default, deserialize_with = "deserialize_page_link")]
    pub next_page: Option<u32>,
    #[serde(
        rename = "previous",
        default,
        deserialize_with = "deserialize_page_link"
    )]
    pub previous_page: Option<u32>,
}

impl PageCursor {
    #[must_use]
    pub const fn new(total_count: u64, next_page: Option<u32>, previous_page: Option<u32>) -> Self {
        Self {
            total_count,
            next_page,
            previous_page,
        }
    }

    /// True when the server reported no further page.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.next_page.is_none()
    }
}

/// Extract the `page` query parameter from a pagination link.
///
/// Relative links are resolved against a placeholder origin. When the
/// parameter appears more than once the last occurrence wins. Returns `None`
/// for unparsable links, a missing parameter, or a non-numeric value.
#[must_use]
pub fn page_token(link: &str) -> Option<u32> {
    let url = Url::parse(link)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(link)))
        .ok()?;
    url.query_pairs()
        .filter(|(key, _)| key == "page")
        .last()
        .and_then(|(_, value)| value.parse().ok())
}

fn deserialize_page_link<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let link: Option<String> = Option::deserialize(deserializer)?;
    Ok(link.as_deref().and_then(page_token))
}
