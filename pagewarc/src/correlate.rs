// Copyright 2025 Janek Bevendorff
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

//! Correlation of asynchronously delivered request and response events.
//!
//! Browsers report requests and responses as independent events. [`Correlator`]
//! joins them by (URL, request ID) into [`ResourceEntry`] values. Every URL has
//! its own bucket with its own lock, so events for different URLs never wait for
//! each other. The bucket index itself is only write-locked to add a new URL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::model::{RequestRecord, ResourceEntry, ResponseRecord};

/// Receiver of network exchange events.
///
/// Implementations must accept events from several threads at once and in any order.
pub trait ExchangeObserver: Send + Sync {
    fn on_request_started(&self, url: &str, request: RequestRecord);
    fn on_response_received(&self, url: &str, response: ResponseRecord);
}

struct Slot {
    order: u64,
    entry: ResourceEntry,
}

#[derive(Default)]
struct BucketState {
    // Set once the bucket has been handed out by `drain`.
    drained: bool,
    slots: HashMap<String, Slot>,
}

struct Bucket {
    order: u64,
    state: Mutex<BucketState>,
}

/// Joins request and response events into resource entries.
#[derive(Default)]
pub struct Correlator {
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
    sequence: AtomicU64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_order(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn bucket(&self, url: &str) -> Arc<Bucket> {
        if let Some(bucket) = self.buckets.read().get(url) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(url.to_string()).or_insert_with(|| {
            Arc::new(Bucket {
                order: self.next_order(),
                state: Mutex::new(BucketState::default()),
            })
        });
        Arc::clone(bucket)
    }

    /// Run `update` on the entry for (url, id), creating it if necessary.
    fn update_entry(&self, url: &str, id: &str, update: impl FnOnce(&mut ResourceEntry)) {
        let mut update = Some(update);
        loop {
            let bucket = self.bucket(url);
            let mut state = bucket.state.lock();
            if state.drained {
                // Lost a race against `drain`; the URL now lives in a fresh bucket.
                continue;
            }
            let slot = state.slots.entry(id.to_string()).or_insert_with(|| Slot {
                order: self.next_order(),
                entry: ResourceEntry::new(id),
            });
            if let Some(update) = update.take() {
                update(&mut slot.entry);
            }
            return;
        }
    }

    /// Register a request under (url, request.id).
    ///
    /// A second request event for the same pair is ignored.
    pub fn on_request_started(&self, url: &str, request: RequestRecord) {
        let id = request.id.clone();
        self.update_entry(url, &id, |entry| {
            if entry.request.is_some() {
                debug!(url, id = %entry.id, "ignoring duplicate request event");
                return;
            }
            entry.request = Some(request);
        });
    }

    /// Attach a response to the entry for (url, response.id).
    ///
    /// If no request was seen for the pair, a response-only entry is created.
    /// A second response event for the same pair is ignored.
    pub fn on_response_received(&self, url: &str, response: ResponseRecord) {
        let id = response.id.clone();
        self.update_entry(url, &id, |entry| {
            if entry.response.is_some() {
                debug!(url, id = %entry.id, "ignoring duplicate response event");
                return;
            }
            if entry.request.is_none() {
                debug!(url, id = %entry.id, "response without matching request");
            }
            entry.response = Some(response);
        });
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .values()
            .map(|bucket| bucket.state.lock().slots.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take all entries collected so far.
    ///
    /// The returned table lists URLs and, within a URL, entries in the order they
    /// were first observed. Events arriving after this call start a new table.
    pub fn drain(&self) -> ResourceTable {
        let buckets = std::mem::take(&mut *self.buckets.write());

        let mut urls: Vec<(u64, String, Vec<ResourceEntry>)> = buckets
            .into_iter()
            .map(|(url, bucket)| {
                let slots = {
                    let mut state = bucket.state.lock();
                    state.drained = true;
                    std::mem::take(&mut state.slots)
                };
                let mut slots: Vec<Slot> = slots.into_values().collect();
                slots.sort_by_key(|slot| slot.order);
                let entries = slots.into_iter().map(|slot| slot.entry).collect();
                (bucket.order, url, entries)
            })
            .collect();
        urls.sort_by_key(|(order, _, _)| *order);

        ResourceTable {
            urls: urls.into_iter().map(|(_, url, entries)| (url, entries)).collect(),
        }
    }
}

impl ExchangeObserver for Correlator {
    fn on_request_started(&self, url: &str, request: RequestRecord) {
        Correlator::on_request_started(self, url, request);
    }

    fn on_response_received(&self, url: &str, response: ResponseRecord) {
        Correlator::on_response_received(self, url, response);
    }
}

/// Snapshot of correlated entries, grouped by URL.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    urls: Vec<(String, Vec<ResourceEntry>)>,
}

impl ResourceTable {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.urls.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.iter().all(|(_, entries)| entries.is_empty())
    }

    /// URLs in first-observation order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(|(url, _)| url.as_str())
    }

    /// Entries recorded for `url`.
    pub fn entries_for(&self, url: &str) -> &[ResourceEntry] {
        self.urls
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or_default()
    }

    pub fn get(&self, url: &str, id: &str) -> Option<&ResourceEntry> {
        self.entries_for(url).iter().find(|entry| entry.id == id)
    }

    /// First request observed for `url`, usually the main document request.
    pub fn main_request(&self, url: &str) -> Option<&RequestRecord> {
        self.entries_for(url).iter().find_map(|entry| entry.request.as_ref())
    }

    /// All (url, entry) pairs in first-observation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceEntry)> {
        self.urls
            .iter()
            .flat_map(|(url, entries)| entries.iter().map(move |entry| (url.as_str(), entry)))
    }
}
