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

use crate::error::Error;
use crate::reconcile::Action;
use crate::scheduler::WorkQueue;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Schedules `key` again according to the outcome of its reconcile pass.
pub fn error_policy(queue: &Arc<WorkQueue>, key: &str, result: &Result<Action, Error>) {
    match result {
        Ok(Action::Done) => queue.forget(key),
        Ok(Action::RequeueAfter(delay)) => {
            debug!(tenant = key, ?delay, "requeue");
            queue.forget(key);
            queue.add_after(key, *delay);
        }
        Ok(Action::Restart) => {
            debug!(tenant = key, "servers restarting, check back later");
            queue.add_rate_limited(key);
        }
        Err(e) if e.is_terminal() => {
            error!(tenant = key, "reconcile failed, not retried: {e}");
            queue.forget(key);
        }
        Err(e) => {
            warn!(tenant = key, retries = queue.retries(key), "reconcile failed: {e}");
            queue.add_rate_limited(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MultipleTenantsSnafu;
    use crate::scheduler::BASE_DELAY;
    use std::time::Duration;
    use tokio::time::Instant;

    const KEY: &str = "default/test-tenant";

    #[tokio::test(start_paused = true)]
    async fn test_requeue_after_clears_backoff() {
        let queue = WorkQueue::with_default_limiter("test");
        queue.add_rate_limited(KEY);
        let key = queue.get().await.unwrap();
        queue.done(&key);
        assert_eq!(queue.retries(KEY), 1);

        let start = Instant::now();
        error_policy(&queue, KEY, &Ok(Action::RequeueAfter(Duration::from_secs(30))));
        assert_eq!(queue.retries(KEY), 0);
        assert_eq!(queue.get().await.as_deref(), Some(KEY));
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_backs_off() {
        let queue = WorkQueue::with_default_limiter("test");
        let start = Instant::now();

        error_policy(&queue, KEY, &Err(Error::WaitingForPools));

        assert_eq!(queue.get().await.as_deref(), Some(KEY));
        assert!(start.elapsed() >= BASE_DELAY);
        assert_eq!(queue.retries(KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_backs_off() {
        let queue = WorkQueue::with_default_limiter("test");
        error_policy(&queue, KEY, &Ok(Action::Restart));
        assert_eq!(queue.get().await.as_deref(), Some(KEY));
        assert_eq!(queue.retries(KEY), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_dropped() {
        let queue = WorkQueue::with_default_limiter("test");
        let err = MultipleTenantsSnafu {
            namespace: "default",
        }
        .build();

        error_policy(&queue, KEY, &Err(err));

        assert!(
            tokio::time::timeout(Duration::from_secs(120), queue.get())
                .await
                .is_err()
        );
        assert_eq!(queue.retries(KEY), 0);
    }
}
