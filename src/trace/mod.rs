//! Structured tracing hook for crawl observability.
//!
//! Implementations receive every lifecycle transition of every request.
//! The default [`LogTracer`] forwards to the `log` facade; [`NoOpTracer`]
//! compiles away entirely for callers that don't care.

use log::{debug, trace};

/// Observer for per-request lifecycle events.
///
/// Implementations must be cheap; they run inline on worker tasks.
pub trait Tracer: Send + Sync {
    /// A request entered the queue.
    fn on_enqueued(&self, url: &str, depth: u16);

    /// A request passed the rate limiter and is about to hit the transport.
    fn on_dispatch(&self, url: &str, retry: u8);

    /// A redirect hop was observed.
    fn on_redirect(&self, from: &str, to: &str);

    /// A terminal response arrived.
    fn on_response(&self, url: &str, status: u16, elapsed_ms: u128);

    /// A request failed terminally.
    fn on_failed(&self, url: &str, error: &str);

    /// A request was re-enqueued by the retry policy.
    fn on_retry(&self, url: &str, attempt: u8);
}

/// Tracer that does nothing. All methods are no-ops and will be inlined
/// away by the compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTracer;

impl Tracer for NoOpTracer {
    #[inline(always)]
    fn on_enqueued(&self, _url: &str, _depth: u16) {}

    #[inline(always)]
    fn on_dispatch(&self, _url: &str, _retry: u8) {}

    #[inline(always)]
    fn on_redirect(&self, _from: &str, _to: &str) {}

    #[inline(always)]
    fn on_response(&self, _url: &str, _status: u16, _elapsed_ms: u128) {}

    #[inline(always)]
    fn on_failed(&self, _url: &str, _error: &str) {}

    #[inline(always)]
    fn on_retry(&self, _url: &str, _attempt: u8) {}
}

/// Tracer backed by the `log` facade under the `sitehound::trace` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_enqueued(&self, url: &str, depth: u16) {
        trace!(target: "sitehound::trace", "enqueued depth={depth} {url}");
    }

    fn on_dispatch(&self, url: &str, retry: u8) {
        trace!(target: "sitehound::trace", "dispatch retry={retry} {url}");
    }

    fn on_redirect(&self, from: &str, to: &str) {
        debug!(target: "sitehound::trace", "redirect {from} -> {to}");
    }

    fn on_response(&self, url: &str, status: u16, elapsed_ms: u128) {
        debug!(target: "sitehound::trace", "response {status} in {elapsed_ms}ms {url}");
    }

    fn on_failed(&self, url: &str, error: &str) {
        debug!(target: "sitehound::trace", "failed {url}: {error}");
    }

    fn on_retry(&self, url: &str, attempt: u8) {
        debug!(target: "sitehound::trace", "retry #{attempt} {url}");
    }
}
