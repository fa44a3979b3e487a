//! Event routing.
//!
//! Decoded events are classified by [`Category`] and published on one
//! bounded broadcast channel per category. Publishing never waits: a
//! subscriber that falls behind loses its oldest undelivered events and is
//! told how many on its next receive.

mod filter;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, trace, warn};

pub use filter::{FilterAction, FilterId, FilterMatch, FilterRule};

use crate::codec::{Category, Event};
use crate::core::SUBSCRIBER_CAPACITY;
use crate::federation::PeerId;

/// Router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-category channel capacity; older events are dropped for
    /// subscribers that lag further behind.
    pub subscriber_capacity: usize,
    /// Initial ordered filter rules.
    pub filters: Vec<FilterRule>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: SUBSCRIBER_CAPACITY,
            filters: Vec::new(),
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct RoutedEvent {
    /// Peer the event arrived from; `None` for locally routed events.
    pub source: Option<PeerId>,
    /// The event.
    pub event: Arc<Event>,
}

impl RoutedEvent {
    /// Type tag of the event, including for the catch-all channel.
    pub fn type_tag(&self) -> &str {
        self.event.event_type()
    }
}

/// Result of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Published to `receivers` subscribers of `category`.
    Delivered {
        /// Channel used.
        category: Category,
        /// Subscribers at publish time.
        receivers: usize,
    },
    /// Dropped by a suppress rule.
    Suppressed(FilterId),
    /// Nobody subscribes to `category`.
    NoSubscribers(Category),
}

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Events handed to `route`.
    pub routed: u64,
    /// Events published to at least one subscriber.
    pub delivered: u64,
    /// Events dropped by a suppress rule.
    pub suppressed: u64,
    /// Events with no subscriber for their category.
    pub unsubscribed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    routed: AtomicU64,
    delivered: AtomicU64,
    suppressed: AtomicU64,
    unsubscribed: AtomicU64,
}

/// Receiving end of one category channel.
#[derive(Debug)]
pub struct Subscription {
    category: Category,
    rx: broadcast::Receiver<RoutedEvent>,
    lagged: u64,
}

impl Subscription {
    /// Category this subscription receives.
    pub fn category(&self) -> Category {
        self.category
    }

    /// Events lost to lag so far.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Wait for the next event. `None` once the router is gone.
    pub async fn recv(&mut self) -> Option<RoutedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.record_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is buffered.
    pub fn try_recv(&mut self) -> Option<RoutedEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.record_lag(n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&mut self, n: u64) {
        self.lagged += n;
        warn!(category = self.category.name(), dropped = n, "subscriber lagging, oldest events dropped");
    }
}

/// Category router with runtime-editable filters.
#[derive(Debug)]
pub struct EventRouter {
    channels: HashMap<Category, broadcast::Sender<RoutedEvent>>,
    filters: RwLock<Vec<(FilterId, FilterRule)>>,
    next_filter: AtomicU64,
    counters: Counters,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl EventRouter {
    /// Create a router.
    pub fn new(config: &RouterConfig) -> Self {
        let capacity = config.subscriber_capacity.max(1);
        let channels = Category::ALL
            .iter()
            .map(|&category| (category, broadcast::channel(capacity).0))
            .collect();

        let router = Self {
            channels,
            filters: RwLock::new(Vec::new()),
            next_filter: AtomicU64::new(1),
            counters: Counters::default(),
        };
        for rule in &config.filters {
            router.add_filter(rule.clone());
        }
        router
    }

    /// Subscribe to one category.
    pub fn subscribe(&self, category: Category) -> Subscription {
        // Every category has a channel; see `new`.
        let rx = match self.channels.get(&category) {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        };
        Subscription {
            category,
            rx,
            lagged: 0,
        }
    }

    /// Append a rule to the end of the ordered filter set.
    pub fn add_filter(&self, rule: FilterRule) -> FilterId {
        let id = FilterId(self.next_filter.fetch_add(1, Ordering::Relaxed));
        debug!(filter = %id, ?rule, "filter added");
        self.filters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, rule));
        id
    }

    /// Remove a rule. Returns whether it existed.
    pub fn remove_filter(&self, id: FilterId) -> bool {
        let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
        let before = filters.len();
        filters.retain(|(fid, _)| *fid != id);
        before != filters.len()
    }

    /// Current rules in evaluation order.
    pub fn filters(&self) -> Vec<(FilterId, FilterRule)> {
        self.filters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// First suppress rule deciding against `event`, if any.
    fn suppressed_by(&self, event: &Event) -> Option<FilterId> {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        filters
            .iter()
            .find(|(_, rule)| rule.matcher.matches(event))
            .and_then(|(id, rule)| (rule.action == FilterAction::Suppress).then_some(*id))
    }

    /// Classify, filter and publish `event`.
    ///
    /// The channel is chosen from the type-tag prefix. An event whose family
    /// payload could not be decoded still goes to its family's channel and
    /// carries [`Detail::Unknown`](crate::codec::Detail::Unknown) with the
    /// raw detail.
    pub fn route(&self, source: Option<PeerId>, event: Event) -> RouteOutcome {
        self.counters.routed.fetch_add(1, Ordering::Relaxed);

        if let Some(filter) = self.suppressed_by(&event) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            trace!(uid = event.uid(), %filter, "event suppressed");
            return RouteOutcome::Suppressed(filter);
        }

        let category = Category::from_type_tag(event.event_type());
        let routed = RoutedEvent {
            source,
            event: Arc::new(event),
        };
        let sent = self
            .channels
            .get(&category)
            .map(|tx| tx.send(routed));

        match sent {
            Some(Ok(receivers)) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                RouteOutcome::Delivered {
                    category,
                    receivers,
                }
            }
            _ => {
                self.counters.unsubscribed.fetch_add(1, Ordering::Relaxed);
                RouteOutcome::NoSubscribers(category)
            }
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            unsubscribed: self.counters.unsubscribed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        ChatDetail, EmergencyDetail, EmergencyKind, Group, Point, PositionDetail,
    };

    fn alert() -> Event {
        Event::emergency(
            "ANDROID-1",
            EmergencyDetail::alert(EmergencyKind::NineOneOne, "HAWK"),
        )
        .point(Point::new(1.0, 1.0))
        .build()
        .unwrap()
    }

    fn position(uid: &str, team: &str) -> Event {
        let detail = PositionDetail {
            group: Some(Group::new(team, "Team Member")),
            ..Default::default()
        };
        Event::position(uid, "a-f-G-U-C", Point::new(0.0, 0.0), detail)
            .build()
            .unwrap()
    }

    fn subscribe_all(router: &EventRouter) -> Vec<Subscription> {
        Category::ALL.iter().map(|&c| router.subscribe(c)).collect()
    }

    #[test]
    fn test_routes_by_category() {
        let router = EventRouter::default();
        let mut chat = router.subscribe(Category::Chat);
        let mut positions = router.subscribe(Category::Position);

        let message = Event::chat(ChatDetail::broadcast("A", "HAWK", "hi"))
            .build()
            .unwrap();
        let outcome = router.route(Some(PeerId(3)), message);
        assert_eq!(
            outcome,
            RouteOutcome::Delivered {
                category: Category::Chat,
                receivers: 1
            }
        );

        let delivered = chat.try_recv().unwrap();
        assert_eq!(delivered.source, Some(PeerId(3)));
        assert_eq!(delivered.type_tag(), "b-t-f");
        assert!(positions.try_recv().is_none());
    }

    #[test]
    fn test_suppressed_alerts_reach_nobody() {
        let router = EventRouter::default();
        let mut subs = subscribe_all(&router);
        let id = router.add_filter(FilterRule::suppress_type("b-a"));

        assert_eq!(router.route(None, alert()), RouteOutcome::Suppressed(id));
        for sub in &mut subs {
            assert!(sub.try_recv().is_none(), "{:?} got an event", sub.category());
        }
        assert_eq!(router.stats().suppressed, 1);
        assert_eq!(router.stats().delivered, 0);
    }

    #[test]
    fn test_filters_editable_at_runtime() {
        let router = EventRouter::default();
        let mut alerts = router.subscribe(Category::Emergency);

        let id = router.add_filter(FilterRule::suppress_type("b-a"));
        router.route(None, alert());
        assert!(alerts.try_recv().is_none());

        assert!(router.remove_filter(id));
        assert!(!router.remove_filter(id));
        router.route(None, alert());
        assert!(alerts.try_recv().is_some());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let router = EventRouter::new(&RouterConfig {
            filters: vec![
                FilterRule::allow(FilterMatch::Team {
                    team: "Cyan".into(),
                }),
                FilterRule::suppress_type("a-f"),
            ],
            ..Default::default()
        });
        let mut positions = router.subscribe(Category::Position);

        router.route(None, position("cyan-1", "Cyan"));
        router.route(None, position("red-1", "Red"));

        assert_eq!(positions.try_recv().unwrap().event.uid(), "cyan-1");
        assert!(positions.try_recv().is_none());
        assert_eq!(router.filters().len(), 2);
    }

    #[test]
    fn test_unknown_goes_to_catch_all() {
        let router = EventRouter::default();
        let mut unknown = router.subscribe(Category::Unknown);
        let event = Event::builder("u-d-f").build().unwrap();
        router.route(None, event);
        assert_eq!(unknown.try_recv().unwrap().type_tag(), "u-d-f");
    }

    #[test]
    fn test_undecoded_family_keeps_its_channel() {
        let router = EventRouter::default();
        let mut chat = router.subscribe(Category::Chat);
        let mut unknown = router.subscribe(Category::Unknown);

        // Chat tag without the chat fields the family decoder needs.
        let event = Event::builder("b-t-f").uid("GeoChat.A.x.1").build().unwrap();
        assert_eq!(event.category(), Category::Unknown);

        let outcome = router.route(None, event);
        assert_eq!(
            outcome,
            RouteOutcome::Delivered {
                category: Category::Chat,
                receivers: 1
            }
        );
        let delivered = chat.try_recv().unwrap();
        assert!(matches!(
            delivered.event.detail(),
            crate::codec::Detail::Unknown(u) if u.type_tag == "b-t-f"
        ));
        assert!(unknown.try_recv().is_none());
    }

    #[test]
    fn test_no_subscribers() {
        let router = EventRouter::default();
        assert_eq!(
            router.route(None, alert()),
            RouteOutcome::NoSubscribers(Category::Emergency)
        );
        assert_eq!(router.stats().unsubscribed, 1);
    }

    #[test]
    fn test_slow_subscriber_drops_oldest() {
        let router = EventRouter::new(&RouterConfig {
            subscriber_capacity: 2,
            ..Default::default()
        });
        let mut slow = router.subscribe(Category::Position);

        for i in 0..5 {
            let outcome = router.route(None, position(&format!("u-{}", i), "Cyan"));
            assert!(matches!(outcome, RouteOutcome::Delivered { .. }));
        }

        assert_eq!(slow.try_recv().unwrap().event.uid(), "u-3");
        assert_eq!(slow.try_recv().unwrap().event.uid(), "u-4");
        assert!(slow.try_recv().is_none());
        assert_eq!(slow.lagged(), 3);
    }

    #[tokio::test]
    async fn test_recv_closes_with_router() {
        let router = EventRouter::default();
        let mut sub = router.subscribe(Category::Chat);
        drop(router);
        assert!(sub.recv().await.is_none());
    }
}
