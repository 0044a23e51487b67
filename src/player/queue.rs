use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{common::types::UserId, player::track::{AuthoredTrack, TrackRef}};

/// FIFO of authored tracks. Index 0 is the track that is loading or playing.
///
/// Only the dispatch loop removes entries, and only ever the front one.
#[derive(Default)]
pub struct TrackQueue {
    entries: Mutex<VecDeque<AuthoredTrack>>,
    next_id: AtomicU64,
    ready: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track and wake the dispatch loop.
    pub fn enqueue(
        &self,
        track: TrackRef,
        author_id: UserId,
        author_name: impl Into<String>,
    ) -> AuthoredTrack {
        let entry = AuthoredTrack {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            track,
            author_id,
            author_name: author_name.into(),
        };
        self.entries.lock().push_back(entry.clone());
        self.ready.notify_one();
        entry
    }

    pub fn front(&self) -> Option<AuthoredTrack> {
        self.peek(0)
    }

    pub fn peek(&self, index: usize) -> Option<AuthoredTrack> {
        self.entries.lock().get(index).cloned()
    }

    /// Remove the front entry. No-op on an empty queue.
    pub fn dequeue_front(&self) -> Option<AuthoredTrack> {
        self.entries.lock().pop_front()
    }

    /// Remove the front entry only if it is still `id`.
    pub fn dequeue_if_front(&self, id: u64) -> Option<AuthoredTrack> {
        let mut entries = self.entries.lock();
        match entries.front() {
            Some(e) if e.id == id => entries.pop_front(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the whole queue, in play order.
    pub fn snapshot(&self) -> Vec<AuthoredTrack> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Wait until the queue has a front entry and return it (without removing it).
    pub async fn next_ready(&self) -> AuthoredTrack {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue in between is not lost.
            notified.as_mut().enable();

            if let Some(front) = self.front() {
                return front;
            }
            notified.await;
        }
    }
}
