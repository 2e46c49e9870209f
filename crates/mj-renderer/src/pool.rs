//! Server pool with randomized failover.
//!
//! Networked backends keep their endpoints in a [`ServerPool`]. Each call
//! walks the endpoints in a fresh random order and stops at the first
//! endpoint that completes an exchange:
//!
//! ```text
//! selection_order() -> [2, 0, 1]
//!         |
//!         v
//! endpoint 2: timed out    -> count, next
//! endpoint 0: unreachable  -> skip, next
//! endpoint 1: exchanged    -> return its result (success or compile error)
//! ```
//!
//! Exhausting the pool yields [`RenderError::NoServerAvailable`].

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::seq::SliceRandom;

use crate::error::{RenderError, Transport};

/// Outcome of one attempt against one endpoint.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The endpoint completed an exchange; its result is final.
    Done(Result<T, RenderError>),
    /// Connecting or exchanging timed out; try the next endpoint.
    TimedOut,
    /// The endpoint could not be connected to; try the next endpoint.
    Unreachable(String),
}

/// Ordered, immutable list of endpoints plus per-call random traversal.
#[derive(Debug)]
pub struct ServerPool<E> {
    endpoints: Vec<E>,
    via: Transport,
    /// Lifetime timeout count, for diagnostics only.
    timeouts: AtomicU64,
}

impl<E: Display> ServerPool<E> {
    /// Create a pool over `endpoints` for the given transport.
    #[must_use]
    pub fn new(endpoints: Vec<E>, via: Transport) -> Self {
        Self {
            endpoints,
            via,
            timeouts: AtomicU64::new(0),
        }
    }

    /// Configured endpoints in their original order.
    #[must_use]
    pub fn endpoints(&self) -> &[E] {
        &self.endpoints
    }

    /// Number of configured endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when no endpoints are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// A fresh random permutation of endpoint indices.
    #[must_use]
    pub fn selection_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.endpoints.len()).collect();
        order.shuffle(&mut rand::rng());
        order
    }

    /// Timeouts observed across all calls since construction.
    #[must_use]
    pub fn total_timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Run `attempt` against endpoints in random order until one completes.
    ///
    /// Timeouts are counted and skipped, unreachable endpoints are skipped,
    /// and the first [`Attempt::Done`] result is returned as-is.
    pub fn attempt_each<T>(
        &self,
        attempt: impl FnMut(&E) -> Attempt<T>,
    ) -> Result<T, RenderError> {
        self.attempt_in_order(self.selection_order(), attempt)
    }

    /// Failover loop over an explicit index order.
    fn attempt_in_order<T>(
        &self,
        order: Vec<usize>,
        mut attempt: impl FnMut(&E) -> Attempt<T>,
    ) -> Result<T, RenderError> {
        let mut timeouts = 0;

        for index in order {
            let endpoint = &self.endpoints[index];
            tracing::debug!(%endpoint, via = %self.via, "trying renderer endpoint");

            match attempt(endpoint) {
                Attempt::Done(result) => return result,
                Attempt::TimedOut => {
                    timeouts += 1;
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%endpoint, via = %self.via, "renderer endpoint timed out");
                }
                Attempt::Unreachable(reason) => {
                    tracing::warn!(%endpoint, via = %self.via, "renderer endpoint unreachable: {reason}");
                }
            }
        }

        Err(RenderError::NoServerAvailable {
            via: self.via,
            servers: self.endpoints.len(),
            timeouts,
        })
    }
}
