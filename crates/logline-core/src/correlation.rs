//! Correlation context for request tracking
//!
//! A correlation ID ties together every log line produced while handling one
//! logical request, including the calls that request makes to downstream
//! services.
//!
//! The active ID lives in a slot local to the current thread. Work that hops
//! between threads (an async task resumed on another worker, a closure handed
//! to a pool) has to carry the ID across explicitly: wrap the future with
//! [`CorrelationFutureExt::with_correlation`] and the ID is re-installed on
//! every poll, whichever worker runs it. Work that does not carry it still
//! logs, but under a freshly generated, unrelated ID.
//!
//! # Example
//!
//! ```rust
//! use logline_core::correlation::{CorrelationContext, CorrelationFutureExt};
//!
//! # async fn handler() {}
//! # async fn run() {
//! let id = CorrelationContext::current();
//! tokio::spawn(handler().with_correlation(id));
//! # }
//! ```

use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Header carrying the correlation ID between services
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Opaque per-request correlation token
///
/// Generated IDs are 128 random bits rendered as 32 lowercase hex characters
/// without separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept an externally supplied ID, rejecting blank values
    ///
    /// Surrounding whitespace is trimmed.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Use `value` if it is a usable ID, otherwise generate one
    pub fn parse_or_generate(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_else(Self::generate)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the ID, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

thread_local! {
    static CURRENT: RefCell<Option<CorrelationId>> = const { RefCell::new(None) };
}

/// Swap the slot contents, returning what was there before.
fn replace_slot(value: Option<CorrelationId>) -> Option<CorrelationId> {
    CURRENT
        .try_with(|slot| slot.replace(value))
        .unwrap_or(None)
}

fn peek_slot() -> Option<CorrelationId> {
    CURRENT
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or(None)
}

/// Access to the correlation ID bound to the current execution unit
pub struct CorrelationContext;

impl CorrelationContext {
    /// Get the active ID, generating and installing one if none is active
    ///
    /// Never returns an empty value.
    pub fn current() -> CorrelationId {
        if let Some(id) = peek_slot() {
            return id;
        }
        let id = CorrelationId::generate();
        replace_slot(Some(id.clone()));
        id
    }

    /// Get the active ID without generating one
    pub fn get() -> Option<CorrelationId> {
        peek_slot()
    }

    /// Install `id`, or a freshly generated ID when `id` is missing or blank
    ///
    /// Returns the ID that is now active.
    pub fn set(id: Option<&str>) -> CorrelationId {
        let id = CorrelationId::parse_or_generate(id);
        replace_slot(Some(id.clone()));
        id
    }

    /// Install an already validated ID
    pub fn install(id: CorrelationId) {
        replace_slot(Some(id));
    }

    /// Remove the binding for the current execution unit
    pub fn clear() {
        replace_slot(None);
    }

    /// Whether an ID is bound, without the generate-on-read side effect
    pub fn is_set() -> bool {
        CURRENT
            .try_with(|slot| slot.borrow().is_some())
            .unwrap_or(false)
    }

    /// Bind `id` until the returned guard is dropped
    ///
    /// The previous binding (or its absence) is restored on drop, so a
    /// thread-per-request host can wrap each request in a scope.
    pub fn scope(id: CorrelationId) -> CorrelationGuard {
        CorrelationGuard {
            previous: replace_slot(Some(id)),
        }
    }
}

/// Restores the previous binding when dropped
#[must_use = "the correlation ID is unbound as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CorrelationGuard {
    previous: Option<CorrelationId>,
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        replace_slot(self.previous.take());
    }
}

pin_project! {
    /// Future that re-installs its correlation ID on every poll
    ///
    /// Created by [`CorrelationFutureExt::with_correlation`].
    #[must_use = "futures do nothing unless polled"]
    pub struct WithCorrelation<F> {
        #[pin]
        inner: F,
        id: CorrelationId,
    }
}

impl<F> WithCorrelation<F> {
    /// The ID installed while the inner future runs
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.id
    }
}

impl<F: Future> Future for WithCorrelation<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let previous = replace_slot(Some(this.id.clone()));
        let poll = this.inner.poll(cx);

        // The inner future may have re-bound the ID; keep following it.
        if let Some(rebound) = replace_slot(previous) {
            if rebound != *this.id {
                *this.id = rebound;
            }
        }
        poll
    }
}

/// Extension methods for carrying a correlation ID across await points
pub trait CorrelationFutureExt: Future + Sized {
    /// Run this future with `id` bound on whatever thread polls it
    fn with_correlation(self, id: CorrelationId) -> WithCorrelation<Self> {
        WithCorrelation { inner: self, id }
    }

    /// Run this future with the caller's active ID (generated if none)
    fn in_current_correlation(self) -> WithCorrelation<Self> {
        self.with_correlation(CorrelationContext::current())
    }
}

impl<F: Future> CorrelationFutureExt for F {}
