#![forbid(unsafe_code)]

//! Cursor-driven pagination engine.
//!
//! A [`Paginator`] walks a server listing page by page. Each fetch runs on its
//! own worker thread; the result travels back over a channel and is applied
//! on the thread that owns the paginator when it calls
//! [`Paginator::process_completions`] (or [`Paginator::wait_for_completion`]).
//!
//! # Invariants
//!
//! 1. At most one request is in flight. A second `fetch_next_page` while
//!    loading fails with [`PaginationError::StillLoading`] and issues nothing.
//! 2. Once the cursor reports no next page, append fetches fail with
//!    [`PaginationError::EndOfPagination`] until a reset fetch.
//! 3. Every request carries a generation number. Completions whose
//!    generation is not the pending one are dropped unseen.
//! 4. Cancellation never reaches a callback. A cancelled call's callback is
//!    dropped without being invoked.
//! 5. Every settled fetch leaves the paginator `Idle`.
//!
//! # Callback re-entrancy
//!
//! Callbacks run inside [`Settled::deliver`], after the paginator's own state
//! has been updated. Owners that keep the paginator behind a `RefCell` should
//! call [`Paginator::take_completed`], release the borrow, then deliver, so
//! callbacks may start the next fetch.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, warn};

use crate::cache::{CleanPolicy, Identified, LocalCache, NoCache, reconcile};
use crate::config::ApiConfig;
use crate::cursor::PageCursor;
use crate::endpoint::Endpoint;
use crate::error::{FetchError, PaginationError};
use crate::fetch::{CancelToken, PageFetcher};
use crate::page::Page;

/// Callback receiving the outcome of one `fetch_next_page` call.
pub type PageCallback<T> = Box<dyn FnOnce(Result<Vec<T>, PaginationError>)>;

/// Builds the request for the next page from the current cursor.
///
/// `None` means the first page is wanted.
pub type EndpointBuilder = Box<dyn Fn(Option<&PageCursor>) -> Endpoint>;

/// Whether a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    Loading,
}

impl LoadingState {
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }
}

enum Outcome<T> {
    Cancelled,
    Ready(Page<T>),
    Failed {
        error: PaginationError,
        total_count: Option<u64>,
    },
}

struct Completion<T> {
    generation: u64,
    outcome: Outcome<T>,
}

struct Pending<T> {
    generation: u64,
    cancel: CancelToken,
    on_done: PageCallback<T>,
}

/// Work executed on a fetch worker thread.
struct FetchJob<T> {
    resource: String,
    generation: u64,
    endpoint: Endpoint,
    reset: bool,
    cancel: CancelToken,
    fetcher: Arc<dyn PageFetcher<T>>,
    cache: Arc<dyn LocalCache<T>>,
    clean_policy: CleanPolicy<T>,
}

impl<T: Identified + 'static> FetchJob<T> {
    fn run(self) -> Completion<T> {
        let _span = debug_span!(
            "page_fetch",
            resource = %self.resource,
            generation = self.generation,
            reset = self.reset
        )
        .entered();
        Completion {
            generation: self.generation,
            outcome: self.execute(),
        }
    }

    fn execute(&self) -> Outcome<T> {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let page = match self.fetcher.fetch(&self.endpoint, &self.cancel) {
            Ok(page) => page,
            Err(FetchError::Cancelled) => return Outcome::Cancelled,
            Err(err) => {
                return match PaginationError::from_fetch(err) {
                    Some(error) => Outcome::Failed {
                        error,
                        total_count: None,
                    },
                    None => Outcome::Cancelled,
                };
            }
        };
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        if self.reset {
            if let Err(err) = reconcile(self.cache.as_ref(), &self.clean_policy, &page.items) {
                return Outcome::Failed {
                    error: err.into(),
                    total_count: Some(page.cursor.total_count),
                };
            }
        }
        Outcome::Ready(page)
    }
}

/// Callbacks ready to run, taken out of a paginator.
#[must_use = "settled callbacks only run when delivered"]
pub struct Settled<T> {
    ready: Vec<(PageCallback<T>, Result<Vec<T>, PaginationError>)>,
}

impl<T> Settled<T> {
    fn empty() -> Self {
        Self { ready: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    /// Invoke every callback in completion order. Returns how many ran.
    pub fn deliver(self) -> usize {
        let count = self.ready.len();
        for (on_done, result) in self.ready {
            on_done(result);
        }
        count
    }
}

impl<T> fmt::Debug for Settled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("ready", &self.ready.len())
            .finish()
    }
}

/// Pagination engine for one listing.
///
/// The endpoint builder and the cache clean policy are the only per-listing
/// pieces; everything else is shared behavior.
pub struct Paginator<T> {
    resource: String,
    fetcher: Arc<dyn PageFetcher<T>>,
    cache: Arc<dyn LocalCache<T>>,
    clean_policy: CleanPolicy<T>,
    endpoint: EndpointBuilder,
    worker_name: String,
    state: LoadingState,
    cursor: Option<PageCursor>,
    total_count: Option<u64>,
    generation: u64,
    pending: Option<Pending<T>>,
    sender: Sender<Completion<T>>,
    receiver: Receiver<Completion<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T> Paginator<T>
where
    T: Identified + Send + 'static,
{
    /// Create a paginator with no cache and the default clean policy.
    ///
    /// `resource` names the listing in logs.
    pub fn new(
        resource: impl Into<String>,
        fetcher: Arc<dyn PageFetcher<T>>,
        endpoint: impl Fn(Option<&PageCursor>) -> Endpoint + 'static,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            resource: resource.into(),
            fetcher,
            cache: Arc::new(NoCache),
            clean_policy: CleanPolicy::default(),
            endpoint: Box::new(endpoint),
            worker_name: ApiConfig::default().worker_name,
            state: LoadingState::Idle,
            cursor: None,
            total_count: None,
            generation: 0,
            pending: None,
            sender,
            receiver,
            workers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn LocalCache<T>>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_clean_policy(mut self, policy: CleanPolicy<T>) -> Self {
        self.clean_policy = policy;
        self
    }

    #[must_use]
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    #[must_use]
    pub fn with_config(self, config: &ApiConfig) -> Self {
        self.with_worker_name(config.worker_name.clone())
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn state(&self) -> LoadingState {
        self.state
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    /// Cursor of the last successful fetch since the last reset.
    #[must_use]
    pub fn cursor(&self) -> Option<&PageCursor> {
        self.cursor.as_ref()
    }

    /// Total reported by the server, once any page has been seen.
    #[must_use]
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    #[must_use]
    pub fn clean_policy(&self) -> &CleanPolicy<T> {
        &self.clean_policy
    }

    /// True when the cursor says no further page exists.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_some_and(|cursor| cursor.is_exhausted())
    }

    /// Request the next page, or the first page when `reset` is set.
    ///
    /// Guard failures (`StillLoading`, `EndOfPagination`, `Worker`) invoke
    /// `on_done` before returning. Otherwise `on_done` runs when the owner
    /// processes the completion; it is never invoked for a cancelled call.
    pub fn fetch_next_page(
        &mut self,
        reset: bool,
        on_done: impl FnOnce(Result<Vec<T>, PaginationError>) + 'static,
    ) {
        if self.state.is_loading() {
            debug!(resource = %self.resource, "fetch rejected: still loading");
            on_done(Err(PaginationError::StillLoading));
            return;
        }
        if reset {
            self.cursor = None;
        }
        if self.is_exhausted() {
            debug!(resource = %self.resource, "fetch rejected: end of pagination");
            self.state = LoadingState::Idle;
            on_done(Err(PaginationError::EndOfPagination));
            return;
        }

        let endpoint = (self.endpoint)(self.cursor.as_ref());
        self.generation += 1;
        let generation = self.generation;
        let cancel = CancelToken::new();
        let job = FetchJob {
            resource: self.resource.clone(),
            generation,
            endpoint,
            reset,
            cancel: cancel.clone(),
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            clean_policy: self.clean_policy.clone(),
        };
        debug!(
            resource = %self.resource,
            generation,
            reset,
            page = ?job.endpoint.query_value("page"),
            "fetch started"
        );

        let sender = self.sender.clone();
        let spawned = thread::Builder::new()
            .name(self.worker_name.clone())
            .spawn(move || {
                let completion = panic::catch_unwind(AssertUnwindSafe(|| job.run()))
                    .unwrap_or_else(|_| {
                        warn!(generation, "fetch worker panicked");
                        Completion {
                            generation,
                            outcome: Outcome::Failed {
                                error: PaginationError::Worker(Arc::new(io::Error::other(
                                    "fetch worker panicked",
                                ))),
                                total_count: None,
                            },
                        }
                    });
                let _ = sender.send(completion);
            });
        match spawned {
            Ok(handle) => {
                self.workers.push(handle);
                self.state = LoadingState::Loading;
                self.pending = Some(Pending {
                    generation,
                    cancel,
                    on_done: Box::new(on_done),
                });
            }
            Err(err) => {
                warn!(resource = %self.resource, error = %err, "fetch worker failed to start");
                on_done(Err(PaginationError::Worker(Arc::new(err))));
            }
        }
    }

    /// Abandon the in-flight request.
    ///
    /// The paginator is `Idle` on return and a new fetch may start at once.
    /// The abandoned call's callback is dropped without being invoked.
    pub fn cancel_current_request(&mut self) {
        if !self.state.is_loading() {
            return;
        }
        if let Some(pending) = self.pending.take() {
            debug!(
                resource = %self.resource,
                generation = pending.generation,
                "fetch cancelled"
            );
            pending.cancel.cancel();
        }
        self.state = LoadingState::Idle;
    }

    /// Apply every completion already received and run its callback.
    ///
    /// Returns the number of callbacks invoked.
    pub fn process_completions(&mut self) -> usize {
        self.take_completed().deliver()
    }

    /// Apply every completion already received without running callbacks.
    pub fn take_completed(&mut self) -> Settled<T> {
        let mut settled = Settled::empty();
        while let Ok(completion) = self.receiver.try_recv() {
            self.settle(completion, &mut settled);
        }
        self.reap_workers();
        settled
    }

    /// Block until the pending fetch settles or `timeout` elapses, then run
    /// every callback that became ready.
    ///
    /// Returns `false` if nothing was delivered in time.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        self.wait_completed(timeout).deliver() > 0
    }

    /// Like [`Self::wait_for_completion`] but returns the callbacks instead
    /// of running them.
    pub fn wait_completed(&mut self, timeout: Duration) -> Settled<T> {
        let deadline = Instant::now() + timeout;
        let mut settled = self.take_completed();
        while settled.is_empty() && self.pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(completion) => {
                    self.settle(completion, &mut settled);
                    while let Ok(completion) = self.receiver.try_recv() {
                        self.settle(completion, &mut settled);
                    }
                    self.reap_workers();
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.reap_workers();
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        settled
    }

    fn settle(&mut self, completion: Completion<T>, settled: &mut Settled<T>) {
        let Completion {
            generation,
            outcome,
        } = completion;
        let Some(pending) = self
            .pending
            .take_if(|pending| pending.generation == generation)
        else {
            debug!(resource = %self.resource, generation, "stale completion dropped");
            return;
        };
        self.state = LoadingState::Idle;

        match outcome {
            Outcome::Ready(page) => {
                self.total_count = Some(page.cursor.total_count);
                self.cursor = Some(page.cursor);
                debug!(
                    resource = %self.resource,
                    generation,
                    items = page.items.len(),
                    total = page.cursor.total_count,
                    next = ?page.cursor.next_page,
                    "page delivered"
                );
                settled.ready.push((pending.on_done, Ok(page.items)));
            }
            Outcome::Failed { error, total_count } => {
                if total_count.is_some() {
                    self.total_count = total_count;
                }
                warn!(resource = %self.resource, generation, error = %error, "fetch failed");
                settled.ready.push((pending.on_done, Err(error)));
            }
            Outcome::Cancelled => {
                debug!(resource = %self.resource, generation, "cancelled fetch settled");
            }
        }
    }

    fn reap_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        let mut remaining = Vec::with_capacity(self.workers.len());
        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                remaining.push(handle);
            }
        }
        self.workers = remaining;
    }
}

impl<T> fmt::Debug for Paginator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("total_count", &self.total_count)
            .field("generation", &self.generation)
            .field("clean_policy", &self.clean_policy)
            .finish_non_exhaustive()
    }
}

impl<T> Drop for Paginator<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
    }
}
