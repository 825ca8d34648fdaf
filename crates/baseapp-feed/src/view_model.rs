#![forbid(unsafe_code)]

//! State and behavior behind the user feed screen.
//!
//! Views read four binders: the user count, the positions of freshly
//! appended users, the last fetch error, and whether the listing is
//! exhausted. They drive the model with [`UserFeedViewModel::fetch_users`]
//! and pump it with [`UserFeedViewModel::process_events`] from their event
//! loop.
//!
//! Page results are queued and applied after the paginator borrow is
//! released, so binder listeners may call back into the view model.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use baseapp_paging::{LocalCache, PageFetcher, PaginationError, Settled};
use baseapp_reactive::{Binder, BinderInterface};
use tracing::debug;

use crate::paginator::UserPaginator;
use crate::user::User;

type Inbox = Rc<RefCell<VecDeque<(bool, Result<Vec<User>, PaginationError>)>>>;

/// View model for the paginated user feed.
pub struct UserFeedViewModel {
    users: RefCell<Vec<User>>,
    paginator: RefCell<UserPaginator>,
    inbox: Inbox,
    number_of_users: Binder<usize>,
    insertion_positions: Binder<Option<Vec<usize>>>,
    fetch_users_error: Binder<Option<PaginationError>>,
    end_of_users: Binder<bool>,
}

impl UserFeedViewModel {
    pub fn new(fetcher: Arc<dyn PageFetcher<User>>) -> Self {
        Self::with_paginator(UserPaginator::new(fetcher))
    }

    pub fn with_cache(
        fetcher: Arc<dyn PageFetcher<User>>,
        cache: Arc<dyn LocalCache<User>>,
    ) -> Self {
        Self::with_paginator(UserPaginator::new(fetcher).with_cache(cache))
    }

    #[must_use]
    pub fn with_paginator(paginator: UserPaginator) -> Self {
        Self {
            users: RefCell::new(Vec::new()),
            paginator: RefCell::new(paginator),
            inbox: Rc::default(),
            number_of_users: Binder::new(0),
            insertion_positions: Binder::new(None),
            fetch_users_error: Binder::new(None),
            end_of_users: Binder::new(false),
        }
    }

    /// Number of users loaded so far.
    #[must_use]
    pub fn number_of_users(&self) -> BinderInterface<usize> {
        self.number_of_users.interface()
    }

    /// Indices of users appended by the last page, or `None` when the list
    /// was (re)filled from empty.
    #[must_use]
    pub fn insertion_positions(&self) -> BinderInterface<Option<Vec<usize>>> {
        self.insertion_positions.interface()
    }

    #[must_use]
    pub fn fetch_users_error(&self) -> BinderInterface<Option<PaginationError>> {
        self.fetch_users_error.interface()
    }

    #[must_use]
    pub fn end_of_users(&self) -> BinderInterface<bool> {
        self.end_of_users.interface()
    }

    /// Request the next page of users. `clean` restarts from the first page
    /// and replaces the loaded list when it arrives.
    pub fn fetch_users(&self, clean: bool) {
        let inbox = Rc::clone(&self.inbox);
        self.paginator
            .borrow_mut()
            .fetch_next_page(clean, move |result| {
                inbox.borrow_mut().push_back((clean, result));
            });
        self.drain_inbox();
    }

    /// Set the search term used by subsequent fetches.
    pub fn set_search_query(&self, query: Option<String>) {
        self.paginator.borrow().set_query(query);
    }

    /// Drop the in-flight request, if any.
    pub fn cancel(&self) {
        self.paginator.borrow_mut().cancel_current_request();
    }

    /// Apply finished fetches. Returns how many results were applied.
    pub fn process_events(&self) -> usize {
        let settled = self.paginator.borrow_mut().take_completed();
        self.deliver(settled)
    }

    /// Block until the in-flight fetch settles or `timeout` elapses, then
    /// apply it.
    pub fn wait_for_events(&self, timeout: Duration) -> usize {
        let settled = self.paginator.borrow_mut().wait_completed(timeout);
        self.deliver(settled)
    }

    /// The user at `index`, if loaded.
    #[must_use]
    pub fn user_at(&self, index: usize) -> Option<User> {
        self.users.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.paginator.borrow().state().is_loading()
    }

    /// Total users the server reports, once a page has arrived.
    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        self.paginator.borrow().total_count()
    }

    fn deliver(&self, settled: Settled<User>) -> usize {
        settled.deliver();
        self.drain_inbox()
    }

    fn drain_inbox(&self) -> usize {
        let mut applied = 0;
        loop {
            let Some((clean, result)) = self.inbox.borrow_mut().pop_front() else {
                break;
            };
            self.apply(clean, result);
            applied += 1;
        }
        applied
    }

    fn apply(&self, clean: bool, result: Result<Vec<User>, PaginationError>) {
        match result {
            Ok(fetched) => self.append(clean, fetched),
            Err(PaginationError::EndOfPagination) => self.end_of_users.set(true),
            Err(PaginationError::StillLoading) => {
                debug!("user fetch ignored: still loading");
            }
            Err(err) => self.fetch_users_error.set(Some(err)),
        }
    }

    fn append(&self, clean: bool, fetched: Vec<User>) {
        let (count, positions) = {
            let mut users = self.users.borrow_mut();
            if clean {
                users.clear();
            }
            let start = users.len();
            users.extend(fetched);
            let positions = (start > 0).then(|| (start..users.len()).collect());
            (users.len(), positions)
        };
        debug!(count, clean, "users updated");
        if clean && self.end_of_users.get() {
            self.end_of_users.set(false);
        }
        self.number_of_users.set(count);
        self.insertion_positions.set(positions);
    }
}

impl std::fmt::Debug for UserFeedViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFeedViewModel")
            .field("users", &self.users.borrow().len())
            .field("paginator", &self.paginator.borrow())
            .field("end_of_users", &self.end_of_users.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baseapp_paging::{ApiError, CancelToken, Endpoint, FetchError, Page, PageCursor};
    use std::sync::Mutex;

    const WAIT: Duration = Duration::from_secs(5);

    /// Pages of two users; page numbers follow the `page` parameter.
    struct TwoPerPage {
        pages: u32,
        fail: Mutex<bool>,
    }

    impl PageFetcher<User> for TwoPerPage {
        fn fetch(&self, endpoint: &Endpoint, _: &CancelToken) -> Result<Page<User>, FetchError> {
            if *self.fail.lock().unwrap() {
                return Err(ApiError::new(500, "Server down.").into());
            }
            let page: u32 = endpoint
                .query_value("page")
                .and_then(|p| p.parse().ok())
                .unwrap_or(1);
            let first = u64::from(page - 1) * 2 + 1;
            Ok(Page::new(
                PageCursor::new(
                    u64::from(self.pages) * 2,
                    (page < self.pages).then_some(page + 1),
                    None,
                ),
                vec![User::new(first), User::new(first + 1)],
            ))
        }
    }

    fn model(pages: u32) -> (UserFeedViewModel, Arc<TwoPerPage>) {
        let fetcher = Arc::new(TwoPerPage {
            pages,
            fail: Mutex::new(false),
        });
        (UserFeedViewModel::new(Arc::clone(&fetcher) as _), fetcher)
    }

    #[test]
    fn initial_state() {
        let (model, _) = model(1);
        assert_eq!(model.number_of_users().get(), 0);
        assert_eq!(model.insertion_positions().get(), None);
        assert!(model.fetch_users_error().get().is_none());
        assert!(!model.end_of_users().get());
        assert!(model.user_at(0).is_none());
    }

    #[test]
    fn first_page_fills_without_positions_then_appends_with_positions() {
        let (model, _) = model(3);
        let positions = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&positions);
        model
            .insertion_positions()
            .bind(move |p| sink.borrow_mut().push(p.clone()));

        model.fetch_users(false);
        assert_eq!(model.wait_for_events(WAIT), 1);
        model.fetch_users(false);
        assert_eq!(model.wait_for_events(WAIT), 1);

        assert_eq!(model.number_of_users().get(), 4);
        assert_eq!(*positions.borrow(), vec![None, Some(vec![2, 3])]);
        assert_eq!(model.user_at(3).map(|u| u.id), Some(4));
    }

    #[test]
    fn clean_fetch_replaces_list() {
        let (model, _) = model(3);
        model.fetch_users(false);
        model.wait_for_events(WAIT);
        model.fetch_users(false);
        model.wait_for_events(WAIT);

        model.fetch_users(true);
        model.wait_for_events(WAIT);
        assert_eq!(model.number_of_users().get(), 2);
        assert_eq!(model.insertion_positions().get(), None);
        assert_eq!(model.user_at(0).map(|u| u.id), Some(1));
    }

    #[test]
    fn end_of_pagination_sets_flag_and_clean_clears_it() {
        let (model, _) = model(1);
        model.fetch_users(false);
        model.wait_for_events(WAIT);
        model.fetch_users(false);
        assert!(model.end_of_users().get());
        assert!(model.fetch_users_error().get().is_none());

        model.fetch_users(true);
        model.wait_for_events(WAIT);
        assert!(!model.end_of_users().get());
    }

    #[test]
    fn still_loading_is_ignored() {
        let (model, _) = model(2);
        model.fetch_users(false);
        model.fetch_users(false);
        assert!(model.fetch_users_error().get().is_none());
        model.wait_for_events(WAIT);
        assert_eq!(model.number_of_users().get(), 2);
    }

    #[test]
    fn other_errors_are_published() {
        let (model, fetcher) = model(2);
        *fetcher.fail.lock().unwrap() = true;
        model.fetch_users(false);
        model.wait_for_events(WAIT);
        let err = model.fetch_users_error().get().unwrap();
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.user_message(), "Server down.");
        assert_eq!(model.number_of_users().get(), 0);
    }

    #[test]
    fn listener_may_fetch_again() {
        let (model, _) = model(2);
        let model = Rc::new(model);
        let weak = Rc::downgrade(&model);
        model.number_of_users().bind(move |count| {
            if *count == 2 {
                if let Some(model) = weak.upgrade() {
                    model.fetch_users(false);
                }
            }
        });

        model.fetch_users(false);
        model.wait_for_events(WAIT);
        assert!(model.is_loading());
        model.wait_for_events(WAIT);
        assert_eq!(model.number_of_users().get(), 4);
    }
}
