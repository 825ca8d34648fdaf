#![forbid(unsafe_code)]

//! Page envelope and user fixtures.
//!
//! Users are numbered from 1. Page `n` of a listing with `per_page` items
//! holds ids `(n - 1) * per_page + 1 ..= n * per_page`, clipped to `total`.

use serde_json::{Value, json};
use url::Url;

use crate::stub_server::StubServer;

/// JSON for one user record.
#[must_use]
pub fn user_json(id: u64) -> Value {
    json!({
        "id": id,
        "email": format!("user{id}@example.com"),
        "first_name": format!("First{id}"),
        "last_name": format!("Last{id}"),
        "avatar": format!("https://cdn.example.com/avatars/{id}.png"),
        "referral_code": format!("REF{id:04}"),
        "is_email_verified": id % 2 == 0,
    })
}

/// Link to `page` of the listing at `path` under `base`.
#[must_use]
pub fn page_link(base: &Url, path: &str, page: u32) -> String {
    let mut url = base.join(path).unwrap_or_else(|_| base.clone());
    url.query_pairs_mut().append_pair("page", &page.to_string());
    url.to_string()
}

/// A page envelope around `results`.
#[must_use]
pub fn page_json(
    results: Vec<Value>,
    total: u64,
    next: Option<String>,
    previous: Option<String>,
) -> Value {
    json!({
        "count": total,
        "next": next,
        "previous": previous,
        "results": results,
    })
}

/// Number of pages a listing of `total` items spans.
#[must_use]
pub fn page_count(per_page: u32, total: u64) -> u32 {
    if per_page == 0 {
        return 0;
    }
    u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
}

/// Page `page` (1-based) of the user listing at `path`.
#[must_use]
pub fn users_page_json(path: &str, page: u32, per_page: u32, total: u64, base: &Url) -> Value {
    let first = u64::from(page.saturating_sub(1)) * u64::from(per_page) + 1;
    let last = (u64::from(page) * u64::from(per_page)).min(total);
    let results = (first..=last).map(user_json).collect();
    let pages = page_count(per_page, total);
    let next = (page < pages).then(|| page_link(base, path, page + 1));
    let previous = (page > 1).then(|| page_link(base, path, page - 1));
    page_json(results, total, next, previous)
}

/// Register every page of the user listing at `path` on `server`.
///
/// Page 1 answers both the bare request and `page=1`. An empty listing still
/// answers the bare request with an empty first page.
pub fn serve_users(server: &StubServer, path: &str, per_page: u32, total: u64, base: &Url) {
    server.route_json(path, None, &users_page_json(path, 1, per_page, total, base));
    for page in 1..=page_count(per_page, total) {
        server.route_json(
            path,
            Some(page),
            &users_page_json(path, page, per_page, total, base),
        );
    }
}
