//! Request context: everything a call needs, passed explicitly.
//!
//! No module-level singletons. The dispatcher builds one `Ctx` per request
//! and threads it through the operation runtime into host functions, so
//! tests can pin the clock, seed the RNG, and inject fake storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::storage::Storage;

pub struct Ctx {
    pub trace_id: String,
    pub clock: Clock,
    pub random: Random,
    pub cancel: CancelToken,
    pub access_token: Option<String>,
    pub storage: Option<Arc<dyn Storage>>,
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            clock: Clock::System,
            random: Random::from_entropy(),
            cancel: CancelToken::new(),
            access_token: None,
            storage: None,
        }
    }

    /// Deterministic context for tests: pinned clock, seeded RNG.
    pub fn fixed(now: NaiveDateTime, seed: u64) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            clock: Clock::Fixed(now),
            random: Random::seeded(seed),
            cancel: CancelToken::new(),
            access_token: None,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall clock, truncated to the wire precision (seconds).
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Self::System => {
                let now = Utc::now().naive_utc();
                now.with_nanosecond(0).unwrap_or(now)
            }
            Self::Fixed(now) => *now,
        }
    }
}

/// Shared random source; seedable so Lingo evaluation stays reproducible
/// under test.
pub struct Random(Mutex<StdRng>);

impl Random {
    pub fn from_entropy() -> Self {
        Self(Mutex::new(StdRng::from_entropy()))
    }

    pub fn seeded(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    pub fn randint(&self, low: i64, high: i64) -> i64 {
        if low >= high {
            return low;
        }
        match self.0.lock() {
            Ok(mut rng) => rng.gen_range(low..=high),
            Err(_) => low,
        }
    }

    pub fn random(&self) -> f64 {
        match self.0.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(_) => 0.0,
        }
    }
}

/// Cooperative cancellation flag checked at every evaluator node boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
