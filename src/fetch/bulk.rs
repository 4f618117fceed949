// src/fetch/bulk.rs

//! Bulk fetching under a concurrency cap.
//!
//! Two interchangeable backends implement the same contract: exactly one
//! outcome per input URL, returned in input order regardless of completion
//! order, with in-flight requests bounded by the configured cap.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, mpsc};

use crate::models::ConcurrencyBackend;

use super::{FetchFailure, FetchOutcome, Fetcher};

/// Fetch a batch of URLs with bounded concurrency.
#[async_trait]
pub trait BulkFetcher: Send + Sync {
    async fn fetch_many(&self, urls: Vec<String>) -> Vec<FetchOutcome>;
}

/// Build the configured backend over the given fetcher.
pub fn build_backend(
    backend: ConcurrencyBackend,
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
) -> Arc<dyn BulkFetcher> {
    match backend {
        ConcurrencyBackend::Cooperative => Arc::new(CooperativeFetcher::new(fetcher, concurrency)),
        ConcurrencyBackend::WorkerPool => Arc::new(WorkerPoolFetcher::new(fetcher, concurrency)),
    }
}

/// Buffered-stream backend: requests interleave on the caller's task.
pub struct CooperativeFetcher {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
}

impl CooperativeFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }
}

#[async_trait]
impl BulkFetcher for CooperativeFetcher {
    async fn fetch_many(&self, urls: Vec<String>) -> Vec<FetchOutcome> {
        let total = urls.len();
        let originals = urls.clone();
        let mut slots: Vec<Option<FetchOutcome>> = vec![None; total];

        let mut results = stream::iter(urls.into_iter().enumerate())
            .map(|(index, url)| {
                let fetcher = Arc::clone(&self.fetcher);
                async move { (index, fetcher.fetch(&url).await) }
            })
            .buffer_unordered(self.concurrency);

        while let Some((index, outcome)) = results.next().await {
            slots[index] = Some(outcome);
        }
        fill_missing(slots, &originals)
    }
}

/// Worker-pool backend: N spawned tasks drain a shared job queue and report
/// over a channel.
pub struct WorkerPoolFetcher {
    fetcher: Arc<dyn Fetcher>,
    workers: usize,
}

impl WorkerPoolFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }
}

#[async_trait]
impl BulkFetcher for WorkerPoolFetcher {
    async fn fetch_many(&self, urls: Vec<String>) -> Vec<FetchOutcome> {
        let total = urls.len();
        if total == 0 {
            return Vec::new();
        }
        let originals = urls.clone();

        let queue: Arc<Mutex<VecDeque<(usize, String)>>> =
            Arc::new(Mutex::new(urls.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::channel::<(usize, FetchOutcome)>(total);

        let workers = self.workers.min(total);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = queue.lock().await.pop_front();
                    let Some((index, url)) = job else { break };
                    let outcome = fetcher.fetch(&url).await;
                    if tx.send((index, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut slots: Vec<Option<FetchOutcome>> = vec![None; total];
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                log::warn!("bulk fetch worker terminated abnormally: {e}");
            }
        }
        fill_missing(slots, &originals)
    }
}

/// Every input slot gets an outcome, even if a worker died mid-batch.
fn fill_missing(slots: Vec<Option<FetchOutcome>>, urls: &[String]) -> Vec<FetchOutcome> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                Err(FetchFailure {
                    url: urls.get(index).cloned().unwrap_or_default(),
                    status: None,
                    attempts: 0,
                    error: "fetch worker terminated before reporting".to_string(),
                })
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::fetch::FetchResponse;

    /// Succeeds or fails per URL, with a small delay so completion order
    /// scrambles under concurrency.
    struct StubFetcher {
        fail: HashSet<String>,
    }

    impl StubFetcher {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            let jitter = (url.len() % 5) as u64;
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            if self.fail.contains(url) {
                Err(FetchFailure {
                    url: url.to_string(),
                    status: Some(500),
                    attempts: 1,
                    error: "HTTP status 500".to_string(),
                })
            } else {
                Ok(FetchResponse {
                    url: url.to_string(),
                    status: 200,
                    body: format!("body of {url}"),
                    attempts: 1,
                })
            }
        }
    }

    /// Tracks the peak number of concurrent calls.
    struct GaugeFetcher {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugeFetcher {
        fn new() -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for GaugeFetcher {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchResponse {
                url: url.to_string(),
                status: 200,
                body: String::new(),
                attempts: 1,
            })
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/p{i}")).collect()
    }

    async fn assert_ordered_outcomes(bulk: &dyn BulkFetcher) {
        let input = vec![
            "https://example.com/a".to_string(),
            "https://example.com/bb".to_string(),
            "https://example.com/ccc".to_string(),
            "https://example.com/dddd".to_string(),
        ];
        let outcomes = bulk.fetch_many(input.clone()).await;
        assert_eq!(outcomes.len(), input.len());
        for (url, outcome) in input.iter().zip(&outcomes) {
            match outcome {
                Ok(response) => assert_eq!(&response.url, url),
                Err(failure) => assert_eq!(&failure.url, url),
            }
        }
    }

    #[tokio::test]
    async fn test_cooperative_preserves_input_order() {
        let bulk = CooperativeFetcher::new(Arc::new(StubFetcher::new(&[])), 3);
        assert_ordered_outcomes(&bulk).await;
    }

    #[tokio::test]
    async fn test_worker_pool_preserves_input_order() {
        let bulk = WorkerPoolFetcher::new(Arc::new(StubFetcher::new(&[])), 3);
        assert_ordered_outcomes(&bulk).await;
    }

    #[tokio::test]
    async fn test_failures_stay_in_their_slot() {
        let stub = StubFetcher::new(&["https://example.com/p2"]);
        let bulk = CooperativeFetcher::new(Arc::new(stub), 4);
        let outcomes = bulk.fetch_many(urls(5)).await;
        assert!(outcomes[2].is_err());
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 4);
    }

    #[tokio::test]
    async fn test_cooperative_respects_cap() {
        let gauge = Arc::new(GaugeFetcher::new());
        let bulk = CooperativeFetcher::new(Arc::clone(&gauge) as Arc<dyn Fetcher>, 2);
        bulk.fetch_many(urls(8)).await;
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_worker_pool_respects_cap() {
        let gauge = Arc::new(GaugeFetcher::new());
        let bulk = WorkerPoolFetcher::new(Arc::clone(&gauge) as Arc<dyn Fetcher>, 2);
        bulk.fetch_many(urls(8)).await;
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let bulk = WorkerPoolFetcher::new(Arc::new(StubFetcher::new(&[])), 2);
        assert!(bulk.fetch_many(Vec::new()).await.is_empty());
    }
}
