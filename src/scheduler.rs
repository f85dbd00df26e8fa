// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rate limited work queue of reconcile keys.
//!
//! A key is either queued, being processed or absent. Adding a queued key is a no-op and a key
//! added while it is processed is queued again once [`WorkQueue::done`] releases it, so no two
//! workers ever hold the same key.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

pub const BASE_DELAY: Duration = Duration::from_secs(5);
pub const MAX_DELAY: Duration = Duration::from_secs(60);
pub const BUCKET_QPS: f64 = 10.0;
pub const BUCKET_BURST: u32 = 100;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decides how long a failed key waits before it is queued again.
pub trait RateLimiter: Send + Sync {
    fn when(&self, key: &str) -> Duration;

    fn forget(&self, key: &str);

    fn retries(&self, key: &str) -> u32;
}

/// Per key exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ItemExponential {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponential {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ItemExponential {
    fn when(&self, key: &str) -> Duration {
        let mut failures = lock(&self.failures);
        let count = failures.entry(key.to_owned()).or_default();
        let exp = *count;
        *count = count.saturating_add(1);

        self.base
            .checked_mul(2u32.saturating_pow(exp))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, key: &str) {
        lock(&self.failures).remove(key);
    }

    fn retries(&self, key: &str) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or_default()
    }
}

struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Token bucket shared by every key, bounding the overall retry rate.
pub struct Bucket {
    qps: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl Bucket {
    pub fn new(qps: f64, burst: u32) -> Self {
        Self {
            qps,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for Bucket {
    fn when(&self, _key: &str) -> Duration {
        let mut state = lock(&self.state);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.qps).min(self.burst);
        state.last = now;

        // reserve a token, a negative balance is paid back over time
        state.tokens -= 1.0;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.qps)
        }
    }

    fn forget(&self, _key: &str) {}

    fn retries(&self, _key: &str) -> u32 {
        0
    }
}

/// The longest delay of all limiters.
pub struct MaxOf(Vec<Box<dyn RateLimiter>>);

impl MaxOf {
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self(limiters)
    }
}

impl RateLimiter for MaxOf {
    fn when(&self, key: &str) -> Duration {
        self.0
            .iter()
            .map(|limiter| limiter.when(key))
            .max()
            .unwrap_or_default()
    }

    fn forget(&self, key: &str) {
        self.0.iter().for_each(|limiter| limiter.forget(key));
    }

    fn retries(&self, key: &str) -> u32 {
        self.0
            .iter()
            .map(|limiter| limiter.retries(key))
            .max()
            .unwrap_or_default()
    }
}

pub fn default_rate_limiter() -> MaxOf {
    MaxOf::new(vec![
        Box::new(ItemExponential::new(BASE_DELAY, MAX_DELAY)),
        Box::new(Bucket::new(BUCKET_QPS, BUCKET_BURST)),
    ])
}

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    shutting_down: bool,
}

pub struct WorkQueue {
    name: &'static str,
    state: Mutex<State>,
    notify: Notify,
    limiter: Box<dyn RateLimiter>,
}

impl WorkQueue {
    pub fn new(name: &'static str, limiter: Box<dyn RateLimiter>) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            limiter,
        })
    }

    pub fn with_default_limiter(name: &'static str) -> Arc<Self> {
        Self::new(name, Box::new(default_rate_limiter()))
    }

    pub fn add(&self, key: &str) {
        let mut state = lock(&self.state);
        if state.shutting_down || !state.dirty.insert(key.to_owned()) {
            return;
        }
        trace!(queue = self.name, key, "queued");

        // picked up again by done()
        if state.processing.contains(key) {
            return;
        }
        state.queue.push_back(key.to_owned());
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for the next key and marks it as processing. Returns `None` once shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = lock(&self.state);
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Releases a key returned by [`WorkQueue::get`].
    pub fn done(&self, key: &str) {
        let mut state = lock(&self.state);
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_owned());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Clears the backoff history of `key`.
    pub fn forget(&self, key: &str) {
        self.limiter.forget(key);
    }

    pub fn retries(&self, key: &str) -> u32 {
        self.limiter.retries(key)
    }

    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let delay = self.limiter.when(key);
        self.add_after(key, delay);
    }

    pub fn add_after(self: &Arc<Self>, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = Arc::clone(self);
        let key = key.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    pub fn len(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        lock(&self.state).shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.state).shutting_down
    }
}
