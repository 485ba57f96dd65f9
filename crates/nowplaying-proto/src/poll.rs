//! Periodic title polling for one stream.
//!
//! The fetcher is one-shot; this is the caller side of the contract: look up
//! the title right away, then again every `interval`, until cancelled.
//! Switching stations means cancelling the poller and spawning a new one.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fetch::IcyFetcher;

/// Shortest interval between lookups.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct TitlePoller {
    url: String,
    rx: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TitlePoller {
    /// Start polling `url`.  Must be called inside a tokio runtime.
    /// `interval` is raised to [`MIN_INTERVAL`] if shorter.
    pub fn spawn(fetcher: IcyFetcher, url: impl Into<String>, interval: Duration) -> Self {
        let url = url.into();
        let interval = interval.max(MIN_INTERVAL);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            fetcher,
            url.clone(),
            interval,
            tx,
            cancel.clone(),
        ));

        Self {
            url,
            rx,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receiver notified after the first lookup (even one that found no
    /// title) and then whenever the title changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.rx.clone()
    }

    pub fn latest(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Stop polling and wait for the task to exit.  An in-flight lookup is
    /// dropped, which closes its connection.
    pub async fn cancel(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TitlePoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    fetcher: IcyFetcher,
    url: String,
    interval: Duration,
    tx: watch::Sender<Option<String>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let title = tokio::select! {
            _ = cancel.cancelled() => break,
            title = fetcher.fetch_title(&url) => title,
        };

        tx.send_if_modified(|current| {
            if *current == title && !first {
                return false;
            }
            debug!("poll: {} title now {:?}", url, title);
            *current = title;
            true
        });
        first = false;
    }

    debug!("poll: stopped polling {}", url);
}
