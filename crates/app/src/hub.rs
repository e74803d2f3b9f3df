//! Connection hub — registry of live subscribers and event fan-out.
//!
//! Each subscriber is scoped to a farm and optionally to one coop, and owns
//! a bounded outbound queue of serialized frames. The registry holds the only
//! sender of each queue, so removing an entry closes the queue exactly once.
//!
//! Delivery never waits: a subscriber whose queue is full or closed is
//! considered dead and dropped from the registry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;

use coophub_domain::error::CoopHubError;
use coophub_domain::event::{ControlMessage, Envelope, Event, MessageType};
use coophub_domain::id::{CoopId, FarmId, SubscriberId};
use coophub_domain::time::Timestamp;

use crate::ports::EventPublisher;

/// One serialized outbound frame, shared between all recipients.
pub type Frame = Arc<str>;

/// Returned by [`ConnectionHub::register`]; the receiving end of the
/// subscriber's outbound queue.
#[derive(Debug)]
pub struct SubscriberHandle {
    pub id: SubscriberId,
    pub farm_id: FarmId,
    pub receiver: mpsc::Receiver<Frame>,
}

/// Snapshot of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub total_connections: usize,
    pub farms: BTreeMap<FarmId, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryError {
    QueueFull,
    Closed,
}

struct Subscriber {
    farm_id: FarmId,
    coop_id: Mutex<Option<CoopId>>,
    sender: mpsc::Sender<Frame>,
    last_seen: Mutex<Timestamp>,
}

impl Subscriber {
    fn coop_id(&self) -> Option<CoopId> {
        *self.coop_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_coop_id(&self, coop_id: Option<CoopId>) {
        *self.coop_id.lock().unwrap_or_else(PoisonError::into_inner) = coop_id;
    }

    fn touch(&self, at: Timestamp) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    fn deliver(&self, frame: &Frame) -> Result<(), DeliveryError> {
        self.sender.try_send(Arc::clone(frame)).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Registry of live subscribers.
pub struct ConnectionHub {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    queue_capacity: usize,
}

impl ConnectionHub {
    /// Create an empty hub whose subscribers buffer up to `queue_capacity`
    /// frames each.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a subscriber. It receives every broadcast issued after this call
    /// returns.
    #[tracing::instrument(skip(self))]
    pub fn register(&self, farm_id: FarmId, coop_id: Option<CoopId>) -> SubscriberHandle {
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let id = SubscriberId::new();
        let subscriber = Subscriber {
            farm_id,
            coop_id: Mutex::new(coop_id),
            sender,
            last_seen: Mutex::new(coophub_domain::time::now()),
        };

        let total = {
            let mut subscribers = self.write();
            subscribers.insert(id, subscriber);
            subscribers.len()
        };
        tracing::info!(subscriber_id = %id, total, "subscriber registered");

        SubscriberHandle {
            id,
            farm_id,
            receiver,
        }
    }

    /// Remove a subscriber and close its queue. Returns `false` if it was
    /// already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut subscribers = self.write();
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };
        match removed {
            Some(subscriber) => {
                tracing::info!(subscriber_id = %id, farm_id = %subscriber.farm_id, total, "subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every subscriber it reaches. Returns how many
    /// subscribers accepted it.
    pub fn broadcast(&self, event: &Event) -> usize {
        let frame: Frame = match serde_json::to_string(&Envelope::from(event)) {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let subscribers = self.read();
            for (id, subscriber) in subscribers.iter() {
                if !event.reaches(subscriber.farm_id, subscriber.coop_id()) {
                    continue;
                }
                match subscriber.deliver(&frame) {
                    Ok(()) => delivered += 1,
                    Err(reason) => dead.push((*id, reason)),
                }
            }
        }

        self.prune(dead);
        tracing::debug!(farm_id = %event.farm_id, kind = ?event.kind, delivered, "event broadcast");
        delivered
    }

    /// Act on a control message sent by subscriber `id`. Replies are queued
    /// on that subscriber only.
    pub fn handle_control(&self, id: SubscriberId, message: ControlMessage) {
        let now = coophub_domain::time::now();
        let reply = {
            let subscribers = self.read();
            let Some(subscriber) = subscribers.get(&id) else {
                return;
            };
            subscriber.touch(now);

            let reply = match message {
                ControlMessage::Ping => {
                    Envelope::reply(MessageType::Pong, subscriber.farm_id, None, now)
                }
                ControlMessage::SubscribeCoop { coop_id } => {
                    subscriber.set_coop_id(Some(coop_id));
                    tracing::debug!(subscriber_id = %id, coop_id = %coop_id, "subscribed to coop");
                    Envelope::reply(MessageType::Subscribed, subscriber.farm_id, Some(coop_id), now)
                }
                ControlMessage::UnsubscribeCoop => {
                    subscriber.set_coop_id(None);
                    Envelope::reply(MessageType::Unsubscribed, subscriber.farm_id, None, now)
                }
                ControlMessage::Unknown => {
                    tracing::debug!(subscriber_id = %id, "ignoring unknown control message");
                    return;
                }
            };

            match serde_json::to_string(&reply) {
                Ok(json) => subscriber.deliver(&Frame::from(json)).err(),
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize control reply");
                    None
                }
            }
        };

        if let Some(reason) = reply {
            self.prune(vec![(id, reason)]);
        }
    }

    /// Record that subscriber `id` showed signs of life.
    pub fn touch(&self, id: SubscriberId) {
        if let Some(subscriber) = self.read().get(&id) {
            subscriber.touch(coophub_domain::time::now());
        }
    }

    /// Last time subscriber `id` showed signs of life.
    #[must_use]
    pub fn last_seen(&self, id: SubscriberId) -> Option<Timestamp> {
        self.read()
            .get(&id)
            .map(|s| *s.last_seen.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current coop filter of subscriber `id`.
    #[must_use]
    pub fn coop_of(&self, id: SubscriberId) -> Option<CoopId> {
        self.read().get(&id).and_then(Subscriber::coop_id)
    }

    /// `true` if subscriber `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.read().contains_key(&id)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Connection counts, total and per farm.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let subscribers = self.read();
        let mut farms = BTreeMap::new();
        for subscriber in subscribers.values() {
            *farms.entry(subscriber.farm_id).or_insert(0) += 1;
        }
        HubStats {
            total_connections: subscribers.len(),
            farms,
        }
    }

    fn prune(&self, dead: Vec<(SubscriberId, DeliveryError)>) {
        if dead.is_empty() {
            return;
        }
        let mut subscribers = self.write();
        for (id, reason) in dead {
            if subscribers.remove(&id).is_some() {
                tracing::warn!(subscriber_id = %id, ?reason, "dropping unresponsive subscriber");
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SubscriberId, Subscriber>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SubscriberId, Subscriber>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventPublisher for ConnectionHub {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), CoopHubError>> + Send {
        self.broadcast(&event);
        async { Ok(()) }
    }
}
