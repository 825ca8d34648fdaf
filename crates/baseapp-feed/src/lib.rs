#![forbid(unsafe_code)]

//! User feed for BaseApp.
//!
//! Ties the pagination engine to reactive view state:
//!
//! - [`User`]: the entity decoded from `users` listings.
//! - [`UserPaginator`]: pages through `GET users` with an optional search
//!   term; reset fetches keep every cached user.
//! - [`UserFeedViewModel`]: exposes the loaded list through binders.

pub mod paginator;
pub mod user;
pub mod view_model;

pub use paginator::{USERS_PATH, UserPaginator, user_endpoint, users_endpoint};
pub use user::{UNIDENTIFIED_FIRST_NAME, UNIDENTIFIED_LAST_NAME, User};
pub use view_model::UserFeedViewModel;
