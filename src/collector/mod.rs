//! Callback fetch engine.
//!
//! The collector owns the request/response lifecycle: callbacks, rate
//! limiting, redirect hop surfacing, retries, and context propagation.
//! The crawler in [`crate::crawler`] builds its worker pool on top of it.

pub mod context;
pub mod core;
pub mod handlers;
pub mod request;

pub use context::Context;
pub use self::core::{Collector, FetchOutcome};
pub use handlers::{HtmlElement, XmlElement};
pub use request::{RedirectHop, Request, Response};
