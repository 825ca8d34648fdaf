#![forbid(unsafe_code)]

//! Test harness for BaseApp paging.
//!
//! - [`StubServer`]: scripted transport with a pause gate and request log.
//! - [`fixtures`]: user records and page envelopes matching the API shape.
//! - [`init_tracing`]: subscriber writing through the test harness.

pub mod fixtures;
pub mod logging;
pub mod stub_server;

pub use fixtures::{serve_users, user_json, users_page_json};
pub use logging::init_tracing;
pub use stub_server::StubServer;
