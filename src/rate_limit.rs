//! Token-bucket admission control for outbound model calls.
//!
//! The bucket starts full. On every check the elapsed time since the last
//! refill is converted into whole tokens with
//! `floor(elapsed_ms / 60000 * refill_per_minute)`; when that is positive the
//! tokens are added (capped at `max_tokens`) and the refill clock advances.
//! Partial tokens are not carried over, so at low rates admission can stall
//! for up to a full refill interval.
//!
//! Refill, check, and consume run under one lock so concurrent requests can
//! never both observe the last token.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Point-in-time view of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateBucket {
    pub tokens: u32,
    pub max_tokens: u32,
    pub refill_per_minute: u32,
}

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    last_refill_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: u32,
    refill_per_minute: u32,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(max_tokens: u32, refill_per_minute: u32) -> Self {
        Self::starting_at(max_tokens, refill_per_minute, Instant::now())
    }

    fn starting_at(max_tokens: u32, refill_per_minute: u32, now: Instant) -> Self {
        Self {
            max_tokens,
            refill_per_minute,
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill_at: now,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // The critical section cannot panic mid-update, so a poisoned lock
        // still holds a consistent bucket.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed_ms = now.saturating_duration_since(state.last_refill_at).as_millis();
        let to_add = elapsed_ms * u128::from(self.refill_per_minute) / 60_000;
        if to_add > 0 {
            let to_add = u32::try_from(to_add).unwrap_or(u32::MAX);
            state.tokens = state.tokens.saturating_add(to_add).min(self.max_tokens);
            state.last_refill_at = now;
        }
    }

    /// Refill, then report whether a token is available.
    pub fn can_admit(&self) -> bool {
        self.can_admit_at(Instant::now())
    }

    fn can_admit_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);
        state.tokens > 0
    }

    /// Take one token. Only meaningful after [`can_admit`](Self::can_admit)
    /// returned true; an empty bucket stays at zero.
    pub fn consume(&self) {
        let mut state = self.lock();
        state.tokens = state.tokens.saturating_sub(1);
    }

    /// Refill, check, and consume as one atomic step. This is what the
    /// pipeline uses; the split `can_admit`/`consume` pair is kept for
    /// callers that need to decide between the two.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);
        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }

    pub fn snapshot(&self) -> RateBucket {
        let state = self.lock();
        RateBucket {
            tokens: state.tokens,
            max_tokens: self.max_tokens,
            refill_per_minute: self.refill_per_minute,
        }
    }
}
