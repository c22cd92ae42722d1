//! Rate-limited, deduplicating work queue.
//!
//! An item is either pending (in `queue` and `dirty`), being processed (in
//! `processing`), or both when it was re-added while a worker held it. In the
//! last case it only goes back on the queue once the worker calls
//! [`WorkQueue::done`], so a given item is never processed concurrently.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::trace;
use tokio::sync::Notify;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(5);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(1000);

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ExponentialBackoff<T> {
    base: Duration,
    max: Duration,
    failures: HashMap<T, u32>,
}

impl<T: Eq + Hash + Clone> ExponentialBackoff<T> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Returns the delay for the next retry of `item` and records the failure.
    pub fn when(&mut self, item: &T) -> Duration {
        let failures = self.failures.entry(item.clone()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.failures.get(item).copied().unwrap_or_default()
    }

    pub fn forget(&mut self, item: &T) {
        self.failures.remove(item);
    }
}

impl<T: Eq + Hash + Clone> Default for ExponentialBackoff<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

#[derive(Debug)]
struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    backoff: ExponentialBackoff<T>,
    shutting_down: bool,
}

#[derive(Debug)]
pub struct WorkQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>, backoff: ExponentialBackoff<T>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                backoff,
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues `item` unless it's already pending. Ignored once the queue is shutting down.
    pub fn add(&self, item: T) {
        let mut state = self.state();

        if state.shutting_down || !state.dirty.insert(item.clone()) {
            return;
        }

        if state.processing.contains(&item) {
            // picked up again by `done`
            return;
        }

        state.queue.push_back(item);
        drop(state);

        self.notify.notify_one();
    }

    /// Waits for the next item. Returns `None` once the queue has been shut down
    /// and everything still pending was handed out.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();

                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());

                    return Some(item);
                }

                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks `item` as processed, re-queueing it if it was added in the meantime.
    pub fn done(&self, item: &T) {
        let mut state = self.state();
        state.processing.remove(item);

        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);

            self.notify.notify_one();
        }
    }

    /// Clears the backoff history of `item`.
    pub fn forget(&self, item: &T) {
        self.state().backoff.forget(item);
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.state().backoff.num_requeues(item)
    }

    /// Re-adds `item` once its backoff delay passes.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.state().backoff.when(&item);

        self.add_after(item, delay);
    }

    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }

        if delay.is_zero() {
            self.add(item);
            return;
        }

        trace!("Queue '{}' will re-add an item in {delay:?}", self.name);

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Stops accepting new items and wakes every pending [`WorkQueue::get`].
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{ExponentialBackoff, WorkQueue};

    fn queue() -> Arc<WorkQueue<&'static str>> {
        Arc::new(WorkQueue::new("test", ExponentialBackoff::default()))
    }

    #[test]
    fn pending_duplicates_collapse() {
        let queue = queue();

        queue.add("a");
        queue.add("a");
        queue.add("b");

        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn item_readded_while_processing_waits_for_done() {
        let queue = queue();
        queue.add("a");

        let item = queue.get().await.unwrap();
        queue.add("a");
        assert!(queue.is_empty());

        queue.done(&item);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("a"));
    }

    #[tokio::test]
    async fn done_without_readd_leaves_queue_empty() {
        let queue = queue();
        queue.add("a");

        let item = queue.get().await.unwrap();
        queue.done(&item);

        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn get_waits_for_an_item() {
        let queue = queue();
        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.get().await }
        });

        tokio::task::yield_now().await;
        queue.add("a");

        assert_eq!(consumer.await.unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn shut_down_wakes_pending_get() {
        let queue = queue();
        let consumer = tokio::spawn({
            let queue = queue.clone();
            async move { queue.get().await }
        });

        tokio::task::yield_now().await;
        queue.shut_down();

        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn shut_down_drains_pending_items_then_ignores_adds() {
        let queue = queue();
        queue.add("a");
        queue.shut_down();
        queue.add("b");

        assert_eq!(queue.get().await, Some("a"));
        assert_eq!(queue.get().await, None);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(30));

        assert_eq!(backoff.when(&"a"), Duration::from_millis(5));
        assert_eq!(backoff.when(&"a"), Duration::from_millis(10));
        assert_eq!(backoff.when(&"a"), Duration::from_millis(20));
        assert_eq!(backoff.when(&"a"), Duration::from_millis(30));
        assert_eq!(backoff.when(&"b"), Duration::from_millis(5));
        assert_eq!(backoff.num_requeues(&"a"), 4);

        backoff.forget(&"a");
        assert_eq!(backoff.num_requeues(&"a"), 0);
        assert_eq!(backoff.when(&"a"), Duration::from_millis(5));
    }

    #[test]
    fn backoff_saturates_at_max_for_huge_exponents() {
        let mut backoff = ExponentialBackoff::default();

        for _ in 0..100 {
            backoff.when(&"a");
        }

        assert_eq!(backoff.when(&"a"), super::DEFAULT_BACKOFF_MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_add_lands_after_backoff() {
        let queue = queue();

        queue.add_rate_limited("a");
        queue.add_rate_limited("a");
        assert!(queue.is_empty());
        assert_eq!(queue.num_requeues(&"a"), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 1);

        queue.forget(&"a");
        assert_eq!(queue.num_requeues(&"a"), 0);
    }
}
