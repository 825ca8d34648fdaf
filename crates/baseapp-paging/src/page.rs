#![forbid(unsafe_code)]

//! Paginated response envelope.
//!
//! Wire shape:
//!
//! ```json
//! { "count": 60, "next": "…?page=2", "previous": null, "results": [ … ] }
//! ```

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::cursor::PageCursor;

/// One decoded page: the server's cursor plus its items in server order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Page<T> {
    #[serde(flatten)]
    pub cursor: PageCursor,
    #[serde(rename = "results")]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(cursor: PageCursor, items: Vec<T>) -> Self {
        Self { cursor, items }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: DeserializeOwned> Page<T> {
    /// Decode a page envelope from a JSON body.
    pub fn decode(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}
