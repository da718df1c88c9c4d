/*
 * Created on Tue Jul 28 2026
 *
 * This file is a part of pathspace
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Event multiplexer
//!
//! Per-node pub-sub fanout (spec.md §4.4), grounded on
//! `original_source/broadcast.go`'s `EventMultiplexer`/`run` pump: an input
//! channel feeds a single task that iterates registered subscribers and
//! either sends the event or, if the send would block, evicts the
//! subscriber and closes its sink. `connections: map<sink, recursive>`
//! becomes `subscribers: HashMap<u64, Subscriber>` here since Rust sinks
//! (`mpsc::Sender`) aren't hashable the way Go channel values are.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::event::{ChangeKind, ElementChange, WatchEvent};
use crate::metrics::{NamespaceMetrics, NoopMetrics};
use crate::mutex::TrackedMutex;

const MULTIPLEXER_INPUT_BUFFER: usize = 100;
const SUBSCRIBER_BUFFER: usize = 16;
const ASYNC_BROADCAST_WATCHDOG: Duration = Duration::from_secs(5);

struct Subscriber {
    sink: mpsc::Sender<WatchEvent>,
    recursive: bool,
}

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// per-node pub-sub fanout; created lazily on first subscription or first
/// emit (spec.md §3 "created lazily")
pub struct EventMultiplexer {
    owner_path: String,
    input: mpsc::Sender<ElementChange>,
    subscribers: Arc<TrackedMutex<HashMap<u64, Subscriber>>>,
}

impl EventMultiplexer {
    /// `owner_path` is used only to decide whether a non-recursive
    /// subscriber should see an event (spec.md §4.4 "`event.origin !=
    /// multiplexer.owner`") and for diagnostics.
    pub fn new(owner_path: String) -> Self {
        Self::with_metrics(owner_path, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(owner_path: String, metrics: Arc<dyn NamespaceMetrics>) -> Self {
        let (tx, rx) = mpsc::channel(MULTIPLEXER_INPUT_BUFFER);
        let subscribers = Arc::new(TrackedMutex::new("watch.subscribers", HashMap::new()));
        tokio::spawn(Self::run(
            owner_path.clone(),
            rx,
            subscribers.clone(),
            metrics,
        ));
        Self {
            owner_path,
            input: tx,
            subscribers,
        }
    }

    /// queues `change` for delivery, directly on the calling task. Has no
    /// delivery guarantee to the caller (matching spec.md §4.4), but two
    /// calls made back-to-back on the same multiplexer reach the pump's
    /// input channel in call order (spec.md §5), which a spawned send
    /// cannot guarantee. Mirrors `original_source/channels.go`'s
    /// synchronous `t.Broadcast <- msg`.
    pub fn broadcast(&self, change: ElementChange) {
        if self.input.try_send(change).is_err() {
            log::warn!("{}: multiplexer input saturated, event dropped", self.owner_path);
        }
    }

    /// same delivery as [`Self::broadcast`], but performed from a spawned
    /// task bounded by a watchdog timer, so a caller that cannot afford to
    /// block on a momentarily-full input channel can fire-and-forget
    /// instead, per spec.md §4.4's "Async broadcast variant ... bounded by
    /// a watchdog timer so a wedged multiplexer cannot leak tasks
    /// indefinitely". Ordering relative to other `broadcast_async` or
    /// `broadcast` calls on the same multiplexer is not guaranteed.
    pub fn broadcast_async(&self, change: ElementChange) {
        let input = self.input.clone();
        let owner_path = self.owner_path.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(ASYNC_BROADCAST_WATCHDOG, input.send(change))
                .await
                .is_err()
            {
                log::warn!("{owner_path}: async broadcast watchdog fired, event dropped");
            }
        });
    }

    pub fn register(&self, recursive: bool) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(
            id,
            Subscriber {
                sink: tx,
                recursive,
            },
        );
        Subscription {
            id,
            recursive,
            receiver: Some(rx),
        }
    }

    pub fn unregister(&self, sub: &Subscription) {
        self.subscribers.lock().remove(&sub.id);
    }

    async fn run(
        owner_path: String,
        mut input: mpsc::Receiver<ElementChange>,
        subscribers: Arc<TrackedMutex<HashMap<u64, Subscriber>>>,
        metrics: Arc<dyn NamespaceMetrics>,
    ) {
        while let Some(change) = input.recv().await {
            let event = WatchEvent::from_change(&change);
            let origin_path = change.origin.absolute_path_string();

            let mut evicted = Vec::new();
            {
                let subs = subscribers.lock();
                for (id, sub) in subs.iter() {
                    if !sub.recursive && origin_path != owner_path {
                        continue;
                    }
                    if sub.sink.try_send(event.clone()).is_err() {
                        evicted.push(*id);
                    }
                }
            }
            if !evicted.is_empty() {
                let mut subs = subscribers.lock();
                for id in evicted {
                    log::debug!("{owner_path} evicting slow subscriber {id}");
                    subs.remove(&id);
                    metrics.on_subscriber_evicted(&owner_path);
                }
            }
        }

        // input channel closed: every remaining subscriber sink is dropped,
        // which closes it from the subscriber's point of view
        subscribers.lock().clear();
    }
}

/// a live registration against an [`EventMultiplexer`]; `events()` yields a
/// stream of [`WatchEvent`] until unregistered or the owning node shuts down
pub struct Subscription {
    id: u64,
    recursive: bool,
    receiver: Option<mpsc::Receiver<WatchEvent>>,
}

impl Subscription {
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// consumes the subscription's receiver half into a stream; may be
    /// called at most once
    pub fn events(&mut self) -> ReceiverStream<WatchEvent> {
        let rx = self
            .receiver
            .take()
            .expect("Subscription::events called more than once");
        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, ElementValue};
    use crate::namespace::Namespace;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    // Regression coverage for a bug where the multiplexer's non-recursive
    // filter compared a change's full absolute-path origin against the
    // node's bare segment, so a non-recursive subscriber could never match
    // even its own node's events.
    #[tokio::test]
    async fn non_recursive_subscriber_sees_its_own_nodes_edit() {
        let ns = Namespace::new("test");
        let node = ns.register("/a/b").await.unwrap();
        let mut sub = node.subscribe(false);
        let mut events = sub.events();

        node.set_value(
            ElementValue::new("payload", Actor::anonymous()),
            ChangeKind::Edited,
            Actor::anonymous(),
            None,
        );

        let ev = tokio::time::timeout(Duration::from_millis(500), events.next())
            .await
            .expect("event should arrive")
            .expect("sink should still be open");
        assert_eq!(ev.kind, ChangeKind::Edited);
        assert!(Arc::ptr_eq(&ev.origin, &node));
    }

    #[tokio::test]
    async fn non_recursive_subscriber_ignores_descendant_edit() {
        let ns = Namespace::new("test");
        let parent = ns.register("/a").await.unwrap();
        let child = ns.register("/a/b").await.unwrap();
        let mut sub = parent.subscribe(false);
        let mut events = sub.events();

        child.set_value(
            ElementValue::new("payload", Actor::anonymous()),
            ChangeKind::Edited,
            Actor::anonymous(),
            None,
        );

        let result = tokio::time::timeout(Duration::from_millis(200), events.next()).await;
        assert!(result.is_err(), "non-recursive subscriber should not see a descendant's edit");
    }

    #[tokio::test]
    async fn recursive_subscriber_sees_descendant_edit() {
        let ns = Namespace::new("test");
        let parent = ns.register("/a").await.unwrap();
        let child = ns.register("/a/b").await.unwrap();
        let mut sub = parent.subscribe(true);
        let mut events = sub.events();

        child.set_value(
            ElementValue::new("payload", Actor::anonymous()),
            ChangeKind::Edited,
            Actor::anonymous(),
            None,
        );

        let ev = tokio::time::timeout(Duration::from_millis(500), events.next())
            .await
            .expect("event should arrive")
            .expect("sink should still be open");
        assert_eq!(ev.kind, ChangeKind::Edited);
        assert!(Arc::ptr_eq(&ev.origin, &child));
    }
}

pub(crate) fn change_kind_note(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Edited => "edited",
        ChangeKind::Locked => "locked",
        ChangeKind::Unlocked => "unlocked",
        ChangeKind::Released => "released",
        ChangeKind::Pruned => "pruned",
        ChangeKind::Deleted => "deleted",
        ChangeKind::Unknown => "unknown",
    }
}
