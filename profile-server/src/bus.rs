//! In-process publish/subscribe for profile changes.
//!
//! The bus has one broadcast channel per [`Topic`]. Delivery is best effort: events are
//! only seen by subscribers registered when they are published, nothing is replayed, and
//! a subscriber that falls behind by more than the channel capacity skips the overflow.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use tokio::sync::broadcast;
use tokio_stream::{
    Stream,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{debug, trace, warn};

use crate::{metrics::Metrics, profile::Profile};

/// Default number of events buffered per topic.
pub const DEFAULT_CAPACITY: usize = 256;

/// Names of the notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Topic {
    /// Fired after every successful create.
    ProfileAdded,
    /// Fired after every successful update.
    ProfileUpdated,
}

/// An event carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEvent {
    /// The topic the event was published on.
    pub topic: Topic,
    /// Snapshot of the profile as written.
    pub profile: Profile,
}

/// The notification bus.
///
/// Cheap to clone; all clones share the same channels.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    added: broadcast::Sender<ProfileEvent>,
    updated: broadcast::Sender<ProfileEvent>,
    metrics: Arc<Metrics>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    /// Create a bus buffering up to `capacity` events per topic.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (added, _) = broadcast::channel(capacity);
        let (updated, _) = broadcast::channel(capacity);
        Self {
            added,
            updated,
            metrics: Default::default(),
        }
    }

    /// Report to the given metrics.
    pub fn with_metrics(self, metrics: Arc<Metrics>) -> Self {
        Self { metrics, ..self }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<ProfileEvent> {
        match topic {
            Topic::ProfileAdded => &self.added,
            Topic::ProfileUpdated => &self.updated,
        }
    }

    /// Publish a profile snapshot on `topic`.
    ///
    /// Returns the number of subscribers the event was handed to. Never fails: an event
    /// published without subscribers is dropped.
    pub fn publish(&self, topic: Topic, profile: Profile) -> usize {
        self.metrics.events_published.inc();
        let id = profile.id;
        match self.sender(topic).send(ProfileEvent { topic, profile }) {
            Ok(receivers) => {
                debug!(%topic, %id, receivers, "event published");
                receivers
            }
            Err(_) => {
                self.metrics.events_unobserved.inc();
                trace!(%topic, %id, "event published without subscribers");
                0
            }
        }
    }

    /// Register a subscriber on `topic`.
    ///
    /// The subscriber sees every event published from now on until the returned stream
    /// is dropped.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.metrics.subscriptions_opened.inc();
        debug!(%topic, "subscriber registered");
        Subscription {
            topic,
            inner: BroadcastStream::new(self.sender(topic).subscribe()),
            metrics: self.metrics.clone(),
        }
    }

    /// Number of subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }
}

/// A live, infinite stream of the events published on one topic.
///
/// Dropping it deregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    inner: BroadcastStream<ProfileEvent>,
    metrics: Arc<Metrics>,
}

impl Subscription {
    /// The topic this subscription listens on.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl Stream for Subscription {
    type Item = ProfileEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(event)) => return Poll::Ready(Some(event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged, events skipped");
                    self.metrics.events_lagged.inc_by(skipped);
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
