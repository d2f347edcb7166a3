//! Ordered feed collection and the coordinating context for refreshes.
//!
//! Background refreshes never touch a [`Feed`]. Each one runs
//! [`load_feed`] on a tokio task and sends a [`Completion`] back over a
//! channel; the owner of the [`Registry`] drains that channel with
//! [`Registry::next_completion`] and applies results with
//! [`Registry::complete`]. All feed mutation and listener calls therefore
//! happen on whichever task owns the registry.

use crate::feed::{load_feed, Fetcher, RefreshError, RefreshOptions};
use crate::model::{Feed, FeedId, ParsedFeed};
use crate::storage::{self, Subscription};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Observer of registry changes. Every method defaults to a no-op.
pub trait Listener {
    /// A feed's unread count, loading flag or error changed.
    fn feed_status_changed(&mut self, _feed: &Feed) {}
    fn feed_loading(&mut self, _feed: &Feed) {}
    /// Fired after the feed's items have been replaced, on success or failure.
    fn feed_loaded(&mut self, _feed: &Feed) {}
    /// Fraction of the current batch that has finished, in `0.0..=1.0`.
    fn loading_progress(&mut self, _fraction: f32) {}
    /// Indices are about to become invalid.
    fn structural_change_started(&mut self) {}
    fn structural_change_ended(&mut self) {}
}

/// Result of one background refresh, handed to the coordinating context.
#[derive(Debug)]
pub struct Completion {
    pub id: FeedId,
    pub result: Result<ParsedFeed, RefreshError>,
}

/// Counters of the refresh batch in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub loading: usize,
    pub finished: usize,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.loading == 0 {
            return 1.0;
        }
        self.finished as f32 / self.loading as f32
    }
}

pub struct Registry {
    feeds: Vec<Feed>,
    listeners: Vec<Box<dyn Listener>>,
    fetcher: Arc<dyn Fetcher>,
    options: RefreshOptions,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    progress: Progress,
    next_id: u64,
}

impl Registry {
    pub fn new(fetcher: Arc<dyn Fetcher>, options: RefreshOptions) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            feeds: Vec::new(),
            listeners: Vec::new(),
            fetcher,
            options,
            completions_tx,
            completions_rx,
            progress: Progress::default(),
            next_id: 1,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    // --- lookup ---

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Feed> {
        self.feeds.get(index)
    }

    pub fn feed(&self, id: FeedId) -> Option<&Feed> {
        self.feeds.iter().find(|f| f.id() == id)
    }

    pub fn position(&self, id: FeedId) -> Option<usize> {
        self.feeds.iter().position(|f| f.id() == id)
    }

    pub fn unread_total(&self) -> usize {
        self.feeds.iter().map(Feed::unread_count).sum()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Whether any refresh is still waiting to be applied.
    pub fn is_busy(&self) -> bool {
        self.progress.loading > self.progress.finished
    }

    // --- structure ---

    /// Appends a feed. A `feed://` scheme is rewritten to `http://`.
    pub fn add(&mut self, url: &str, title: &str, codeset: Option<&str>) -> FeedId {
        let url = match url.strip_prefix("feed://") {
            Some(rest) => format!("http://{rest}"),
            None => url.to_owned(),
        };
        let id = FeedId(self.next_id);
        self.next_id += 1;

        self.notify(|l| l.structural_change_started());
        self.feeds.push(Feed::new(id, url, title, codeset));
        self.notify(|l| l.structural_change_ended());
        id
    }

    pub fn remove(&mut self, id: FeedId) -> Option<Feed> {
        self.notify(|l| l.structural_change_started());
        let removed = self.position(id).map(|index| self.feeds.remove(index));
        self.notify(|l| l.structural_change_ended());
        removed
    }

    /// Moves a feed so that it ends up at `target` (clamped to the end).
    pub fn move_to(&mut self, id: FeedId, target: usize) {
        self.notify(|l| l.structural_change_started());
        if let Some(index) = self.position(id) {
            let feed = self.feeds.remove(index);
            let target = target.min(self.feeds.len());
            self.feeds.insert(target, feed);
        }
        self.notify(|l| l.structural_change_ended());
    }

    // --- per-feed edits ---

    pub fn set_user_title(&mut self, id: FeedId, title: &str) {
        if let Some(index) = self.position(id) {
            self.feeds[index].set_user_title(title);
            self.notify_status(index);
        }
    }

    /// Marks one item read or unread, updating the feed's read-id set.
    pub fn set_item_read(&mut self, id: FeedId, item: usize, read: bool) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let changed = self.feeds[index].set_item_read(item, read);
        if changed {
            self.notify_status(index);
        }
        changed
    }

    pub fn mark_all_read(&mut self, id: FeedId) {
        let Some(index) = self.position(id) else {
            return;
        };
        let feed = &mut self.feeds[index];
        let mut changed = false;
        for item in 0..feed.items().len() {
            changed |= feed.set_item_read(item, true);
        }
        if changed {
            self.notify_status(index);
        }
    }

    // --- refresh ---

    /// Starts a background refresh of one feed.
    ///
    /// Returns `false` when the feed is unknown or already loading. The
    /// feed's items are cleared and listeners told before the task starts.
    pub fn refresh(&mut self, id: FeedId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let Some(request) = self.feeds[index].begin_refresh() else {
            tracing::debug!(feed = %self.feeds[index].url(), "Refresh already in progress");
            return false;
        };
        self.progress.loading += 1;

        let fraction = self.progress.fraction();
        let feed = &self.feeds[index];
        for listener in &mut self.listeners {
            listener.feed_status_changed(feed);
            listener.feed_loading(feed);
            listener.loading_progress(fraction);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.completions_tx.clone();
        let options = self.options;
        tokio::spawn(async move {
            let id = request.id;
            let result = match catch_task_panic(load_feed(fetcher.as_ref(), &request, options))
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    tracing::error!(feed = %request.url, panic = %panic, "Refresh task panicked");
                    Err(RefreshError::Aborted(panic))
                }
            };
            // The registry may have been dropped.
            let _ = tx.send(Completion { id, result });
        });
        true
    }

    /// Refreshes every feed not already loading. Returns how many started.
    pub fn refresh_all(&mut self) -> usize {
        let ids: Vec<FeedId> = self.feeds.iter().map(Feed::id).collect();
        let started = ids.into_iter().filter(|&id| self.refresh(id)).count();
        tracing::info!(started, total = self.feeds.len(), "Refresh batch started");
        started
    }

    /// Waits for the next background refresh to finish.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completions_rx.recv().await
    }

    /// Applies a finished refresh and notifies listeners.
    pub fn complete(&mut self, completion: Completion) {
        let Completion { id, result } = completion;
        self.progress.finished += 1;
        let fraction = self.progress.fraction();

        match self.position(id) {
            Some(index) => {
                let feed = &mut self.feeds[index];
                match &result {
                    Ok(parsed) => {
                        tracing::debug!(feed = %feed.url(), items = parsed.items.len(), "Feed loaded")
                    }
                    Err(e) => tracing::warn!(feed = %feed.url(), error = %e, "Feed refresh failed"),
                }
                feed.finish_refresh(result);

                let feed = &self.feeds[index];
                for listener in &mut self.listeners {
                    listener.feed_status_changed(feed);
                    listener.feed_loaded(feed);
                    listener.loading_progress(fraction);
                }
            }
            None => {
                tracing::debug!(feed = %id, "Dropping result for removed feed");
                self.notify(|l| l.loading_progress(fraction));
            }
        }

        if self.progress.finished >= self.progress.loading {
            tracing::info!(feeds = self.progress.loading, "Refresh batch finished");
            self.progress = Progress::default();
        }
    }

    /// Applies completions until no refresh is in flight.
    pub async fn wait_idle(&mut self) {
        while self.is_busy() {
            match self.next_completion().await {
                Some(completion) => self.complete(completion),
                None => break,
            }
        }
    }

    // --- persistence ---

    /// Appends the feeds listed in the subscription file at `path`.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn load(&mut self, path: &Path) {
        let subscriptions = match storage::load(path) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load subscriptions");
                return;
            }
        };

        let count = subscriptions.len();
        for sub in subscriptions {
            let id = self.add(&sub.url, &sub.title, sub.codeset.as_deref());
            if let Some(index) = self.position(id) {
                self.feeds[index].extend_read_ids(sub.read_ids);
            }
        }
        tracing::info!(path = %path.display(), feeds = count, "Subscriptions loaded");
    }

    /// Writes every feed to the subscription file at `path`.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn save(&self, path: &Path) {
        let subscriptions: Vec<Subscription> = self
            .feeds
            .iter()
            .map(|feed| Subscription {
                url: feed.url().to_owned(),
                title: feed.user_title().to_owned(),
                codeset: feed.codeset().map(str::to_owned),
                read_ids: feed.read_ids().iter().cloned().collect(),
            })
            .collect();

        match storage::save(path, &subscriptions) {
            Ok(()) => {
                tracing::info!(path = %path.display(), feeds = subscriptions.len(), "Subscriptions saved")
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save subscriptions")
            }
        }
    }

    fn notify(&mut self, mut event: impl FnMut(&mut dyn Listener)) {
        for listener in &mut self.listeners {
            event(listener.as_mut());
        }
    }

    fn notify_status(&mut self, index: usize) {
        let feed = &self.feeds[index];
        for listener in &mut self.listeners {
            listener.feed_status_changed(feed);
        }
    }
}

/// Runs a future, turning a panic into its message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_owned()
        }
    })
}
