//! Frontier queue distributing pending URLs to crawl workers.
//!
//! The frontier is the only channel between link discovery and fetching:
//! producers [`push`](Frontier::push) without blocking, workers block in
//! [`next_item`](Frontier::next_item) until work arrives or the queue is
//! closed and drained. It also carries the crawl's quiescence accounting:
//! every accepted item must be balanced by a [`task_done`](Frontier::task_done)
//! call once fully processed (children enqueued), and [`idle`](Frontier::idle)
//! resolves only when that balance reaches zero. The balance cannot hit zero
//! while a worker still holds an item, which is what makes quiescence
//! detection race-free.

use futures_util::task::AtomicWaker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

/// A unit of pending work: a normalized URL and the hop count at which it
/// was discovered. Depth is diagnostic only; cycle safety comes from the
/// visited set, not from depth limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlItem {
    /// Normalized page address.
    pub url: String,
    /// Link hops from the start URL.
    pub depth: u32,
}

impl CrawlItem {
    /// Creates a new frontier entry.
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Unbounded FIFO work queue shared by all workers.
pub struct Frontier {
    tx: StdMutex<Option<UnboundedSender<CrawlItem>>>,
    rx: Mutex<UnboundedReceiver<CrawlItem>>,
    pending: AtomicUsize,
    unfinished: AtomicUsize,
    idle_waker: AtomicWaker,
}

impl Frontier {
    /// Constructs a new, open frontier.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: StdMutex::new(Some(tx)),
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
            unfinished: AtomicUsize::new(0),
            idle_waker: AtomicWaker::new(),
        }
    }

    /// Number of items queued and not yet popped.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Enqueues an item without blocking.
    ///
    /// Returns `false` once the frontier is closed; the item is dropped.
    pub fn push(&self, item: CrawlItem) -> bool {
        let guard = self.tx.lock().expect("frontier sender lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        self.unfinished.fetch_add(1, Ordering::AcqRel);
        self.pending.fetch_add(1, Ordering::AcqRel);
        if tx.send(item).is_err() {
            // Receiver gone; roll the accounting back so idle() still fires.
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.task_done();
            return false;
        }
        true
    }

    /// Blocks until an item is available, or returns `None` once the
    /// frontier is closed and every queued item has been handed out.
    pub async fn next_item(&self) -> Option<CrawlItem> {
        let mut rx = self.rx.lock().await;
        let item = rx.recv().await;
        if item.is_some() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        item
    }

    /// Marks one previously pushed item as fully processed.
    pub fn task_done(&self) {
        if self.unfinished.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle_waker.wake();
        }
    }

    /// Resolves when every pushed item has been balanced by `task_done`.
    ///
    /// Single-waiter: only the coordinator awaits this.
    pub async fn idle(&self) {
        WaitForIdle { frontier: self }.await;
    }

    /// Closes the frontier. Idempotent.
    ///
    /// Already-queued items keep draining through `next_item`; once they are
    /// gone, every blocked worker observes `None` and exits.
    pub fn close(&self) {
        let mut guard = self.tx.lock().expect("frontier sender lock poisoned");
        guard.take();
    }

    fn is_idle(&self) -> bool {
        self.unfinished.load(Ordering::Acquire) == 0
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

struct WaitForIdle<'a> {
    frontier: &'a Frontier,
}

impl core::future::Future for WaitForIdle<'_> {
    type Output = ();

    fn poll(
        self: core::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Self::Output> {
        if self.frontier.is_idle() {
            return core::task::Poll::Ready(());
        }
        self.frontier.idle_waker.register(cx.waker());
        if self.frontier.is_idle() {
            core::task::Poll::Ready(())
        } else {
            core::task::Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "current_thread")]
    async fn items_drain_in_fifo_order() {
        let frontier = Frontier::new();
        assert!(frontier.push(CrawlItem::new("https://example.com/a", 0)));
        assert!(frontier.push(CrawlItem::new("https://example.com/b", 1)));

        assert_eq!(frontier.next_item().await.unwrap().url, "https://example.com/a");
        assert_eq!(frontier.next_item().await.unwrap().url, "https://example.com/b");
        assert_eq!(frontier.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocked_worker_wakes_on_push() {
        let frontier = Arc::new(Frontier::new());
        let waiter = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move { frontier.next_item().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(frontier.push(CrawlItem::new("https://wake.test/", 0)));

        let item = waiter.await.unwrap().expect("push wakes the waiter");
        assert_eq!(item.url, "https://wake.test/");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn close_drains_queued_items_first() {
        let frontier = Frontier::new();
        frontier.push(CrawlItem::new("https://example.com/a", 0));
        frontier.push(CrawlItem::new("https://example.com/b", 0));
        frontier.close();
        frontier.close();

        assert!(frontier.next_item().await.is_some());
        assert!(frontier.next_item().await.is_some());
        assert!(frontier.next_item().await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn push_after_close_is_rejected() {
        let frontier = Frontier::new();
        frontier.close();
        assert!(!frontier.push(CrawlItem::new("https://late.test/", 0)));
        assert!(frontier.next_item().await.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn idle_resolves_only_after_every_task_done() {
        let frontier = Arc::new(Frontier::new());
        frontier.push(CrawlItem::new("https://example.com/a", 0));
        frontier.push(CrawlItem::new("https://example.com/b", 0));

        let watchdog = {
            let frontier = Arc::clone(&frontier);
            tokio::spawn(async move {
                frontier.idle().await;
            })
        };

        let _ = frontier.next_item().await.unwrap();
        let _ = frontier.next_item().await.unwrap();
        frontier.task_done();
        assert!(!watchdog.is_finished());

        frontier.task_done();
        tokio::time::timeout(Duration::from_secs(1), watchdog)
            .await
            .expect("idle resolves once the balance is zero")
            .unwrap();
    }
}
