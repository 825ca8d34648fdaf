#![forbid(unsafe_code)]

//! User listing endpoints and the user paginator.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use baseapp_paging::{
    ApiConfig, CleanPolicy, Endpoint, LoadingState, LocalCache, PageCursor, PageFetcher,
    PaginationError, Paginator, Settled,
};

use crate::user::User;

/// Path of the user listing.
pub const USERS_PATH: &str = "users";

/// `GET users`, with `page` when a page token is known and `q` when the
/// search term is non-empty.
#[must_use]
pub fn users_endpoint(query: Option<&str>, page: Option<u32>) -> Endpoint {
    let endpoint = Endpoint::get(USERS_PATH).with_page(page);
    match query.filter(|q| !q.is_empty()) {
        Some(q) => endpoint.with_query("q", q),
        None => endpoint,
    }
}

/// `GET users/{id}`.
#[must_use]
pub fn user_endpoint(id: u64) -> Endpoint {
    Endpoint::get(format!("{USERS_PATH}/{id}"))
}

/// Paginator over registered users, optionally filtered by a search term.
///
/// Cached users are never removed on reset.
pub struct UserPaginator {
    inner: Paginator<User>,
    query: Rc<RefCell<Option<String>>>,
}

impl UserPaginator {
    pub fn new(fetcher: Arc<dyn PageFetcher<User>>) -> Self {
        let query = Rc::new(RefCell::new(None::<String>));
        let term = Rc::clone(&query);
        let inner = Paginator::new(USERS_PATH, fetcher, move |cursor: Option<&PageCursor>| {
            users_endpoint(term.borrow().as_deref(), cursor.and_then(|c| c.next_page))
        })
        .with_clean_policy(CleanPolicy::KeepAll);
        Self { inner, query }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn LocalCache<User>>) -> Self {
        self.inner = self.inner.with_cache(cache);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: &ApiConfig) -> Self {
        self.inner = self.inner.with_config(config);
        self
    }

    /// Search term used by the next request.
    #[must_use]
    pub fn query(&self) -> Option<String> {
        self.query.borrow().clone()
    }

    /// Change the search term. Takes effect on the next request; callers
    /// normally follow with a reset fetch.
    pub fn set_query(&self, query: Option<String>) {
        *self.query.borrow_mut() = query;
    }

    pub fn fetch_next_page(
        &mut self,
        reset: bool,
        on_done: impl FnOnce(Result<Vec<User>, PaginationError>) + 'static,
    ) {
        self.inner.fetch_next_page(reset, on_done);
    }

    pub fn cancel_current_request(&mut self) {
        self.inner.cancel_current_request();
    }

    pub fn process_completions(&mut self) -> usize {
        self.inner.process_completions()
    }

    pub fn take_completed(&mut self) -> Settled<User> {
        self.inner.take_completed()
    }

    pub fn wait_completed(&mut self, timeout: Duration) -> Settled<User> {
        self.inner.wait_completed(timeout)
    }

    #[must_use]
    pub fn state(&self) -> LoadingState {
        self.inner.state()
    }

    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        self.inner.total_count()
    }

    #[must_use]
    pub fn cursor(&self) -> Option<&PageCursor> {
        self.inner.cursor()
    }

    #[must_use]
    pub fn clean_policy(&self) -> &CleanPolicy<User> {
        self.inner.clean_policy()
    }
}

impl std::fmt::Debug for UserPaginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPaginator")
            .field("inner", &self.inner)
            .field("query", &self.query.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baseapp_paging::{CancelToken, FetchError, Page};
    use std::sync::Mutex;

    #[test]
    fn users_endpoint_parameters() {
        let first = users_endpoint(None, None);
        assert_eq!(first.path(), "users");
        assert!(first.query().is_empty());

        let searched = users_endpoint(Some("ann"), Some(3));
        assert_eq!(searched.query_value("page"), Some("3"));
        assert_eq!(searched.query_value("q"), Some("ann"));

        assert_eq!(users_endpoint(Some(""), None).query_value("q"), None);
    }

    #[test]
    fn user_endpoint_path() {
        assert_eq!(user_endpoint(12).path(), "users/12");
    }

    #[derive(Default)]
    struct Recording {
        endpoints: Mutex<Vec<Endpoint>>,
    }

    impl PageFetcher<User> for Recording {
        fn fetch(&self, endpoint: &Endpoint, _: &CancelToken) -> Result<Page<User>, FetchError> {
            self.endpoints.lock().unwrap().push(endpoint.clone());
            Ok(Page::new(PageCursor::new(1, Some(2), None), vec![User::new(1)]))
        }
    }

    #[test]
    fn search_term_reaches_next_request() {
        let fetcher = Arc::new(Recording::default());
        let mut paginator = UserPaginator::new(Arc::clone(&fetcher) as _);
        assert!(matches!(paginator.clean_policy(), CleanPolicy::KeepAll));

        paginator.set_query(Some("lee".into()));
        paginator.fetch_next_page(true, |_| {});
        assert_eq!(
            paginator.wait_completed(Duration::from_secs(5)).deliver(),
            1
        );
        paginator.fetch_next_page(false, |_| {});
        assert_eq!(
            paginator.wait_completed(Duration::from_secs(5)).deliver(),
            1
        );

        let endpoints = fetcher.endpoints.lock().unwrap();
        assert_eq!(endpoints[0].query_value("q"), Some("lee"));
        assert_eq!(endpoints[0].query_value("page"), None);
        assert_eq!(endpoints[1].query_value("page"), Some("2"));
        assert_eq!(paginator.query().as_deref(), Some("lee"));
    }
}
