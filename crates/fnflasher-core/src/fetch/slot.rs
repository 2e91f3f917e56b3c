//! Fetch slots
//!
//! A slot is a reusable fetch channel such as "the current release list".
//! Issuing a new request on a slot cancels the previous one, and every
//! result is tagged with the id of the request that produced it so the owner
//! can drop anything that is no longer current, even when cancellation loses
//! the race with delivery.

use super::{ArtifactFetcher, FetchResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of a slot request, delivered on the owner's event channel
#[derive(Debug)]
pub struct SlotEvent<K> {
    /// Slot the request was issued on
    pub slot: K,
    /// Id of the request within that slot
    pub request_id: u64,
    /// Fetch outcome
    pub result: FetchResult,
}

#[derive(Debug)]
struct Outstanding {
    id: u64,
    cancel: CancellationToken,
}

/// One logical fetch channel
#[derive(Debug)]
pub struct FetchSlot<K> {
    key: K,
    last_id: u64,
    outstanding: Option<Outstanding>,
}

impl<K> FetchSlot<K>
where
    K: Copy + Send + 'static,
{
    /// Create an idle slot identified by `key`
    pub fn new(key: K) -> Self {
        Self {
            key,
            last_id: 0,
            outstanding: None,
        }
    }

    /// Start a fetch on this slot, superseding any outstanding request
    ///
    /// The result is sent on `events` once available. Returns the id that
    /// will tag it.
    pub fn issue(
        &mut self,
        fetcher: &ArtifactFetcher,
        url: Url,
        use_cache: bool,
        events: &mpsc::UnboundedSender<SlotEvent<K>>,
    ) -> u64 {
        self.cancel();

        self.last_id += 1;
        let request_id = self.last_id;
        let handle = fetcher.fetch(url, use_cache);
        self.outstanding = Some(Outstanding {
            id: request_id,
            cancel: handle.cancellation_token(),
        });

        let slot = self.key;
        let events = events.clone();
        tokio::spawn(async move {
            let result = handle.result().await;
            // The owner may already be gone; nothing left to notify then
            let _ = events.send(SlotEvent {
                slot,
                request_id,
                result,
            });
        });

        request_id
    }

    /// Cancel the outstanding request, if any
    ///
    /// Its result will no longer be accepted.
    pub fn cancel(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            log::debug!("Cancelling fetch request #{}", outstanding.id);
            outstanding.cancel.cancel();
        }
    }

    /// Whether a request is outstanding
    pub fn is_pending(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Accept the result of `request_id` if it is the current request
    ///
    /// Returns `false` for superseded, cancelled or already accepted
    /// requests. Accepting completes the request.
    pub fn accept(&mut self, request_id: u64) -> bool {
        match &self.outstanding {
            Some(outstanding) if outstanding.id == request_id => {
                self.outstanding = None;
                true
            }
            _ => false,
        }
    }
}
