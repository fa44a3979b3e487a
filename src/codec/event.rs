//! Decoded event values.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::detail::{
    Category, ChatDetail, Detail, EmergencyDetail, PositionDetail, UnknownDetail, WaypointDetail,
};
use super::time::{normalize, now};
use crate::core::{EventError, DEFAULT_STALE, HOW_HUMAN, HOW_MACHINE_GPS, PING_TYPE, UNKNOWN_ERROR};

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Geodetic point (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Height above ellipsoid in metres.
    pub hae: f64,
    /// Circular error in metres.
    pub ce: f64,
    /// Linear error in metres.
    pub le: f64,
}

impl Point {
    /// Point with unknown height and errors.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            hae: UNKNOWN_ERROR,
            ce: UNKNOWN_ERROR,
            le: UNKNOWN_ERROR,
        }
    }

    /// Set height above ellipsoid.
    pub fn with_hae(mut self, hae: f64) -> Self {
        self.hae = hae;
        self
    }

    /// Set circular and linear error.
    pub fn with_error(mut self, ce: f64, le: f64) -> Self {
        self.ce = ce;
        self.le = le;
        self
    }

    /// Check coordinate ranges and that every field is finite.
    pub fn is_valid(&self) -> bool {
        [self.lat, self.lon, self.hae, self.ce, self.le]
            .iter()
            .all(|v| v.is_finite())
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance to `other` in metres (haversine).
    pub fn distance_m(&self, other: &Point) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Affiliation atom of an `a-` type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affiliation {
    /// `p`
    Pending,
    /// `u`
    Unknown,
    /// `a`
    AssumedFriend,
    /// `f`
    Friend,
    /// `n`
    Neutral,
    /// `s`
    Suspect,
    /// `h`
    Hostile,
    /// `j`
    Joker,
    /// `k`
    Faker,
    /// `o`
    None,
}

impl Affiliation {
    /// Parse the affiliation from a type tag such as `a-f-G-U-C`.
    pub fn from_type_tag(type_tag: &str) -> Option<Self> {
        let mut atoms = type_tag.split('-');
        if atoms.next()? != "a" {
            return None;
        }
        match atoms.next()? {
            "p" => Some(Self::Pending),
            "u" => Some(Self::Unknown),
            "a" => Some(Self::AssumedFriend),
            "f" => Some(Self::Friend),
            "n" => Some(Self::Neutral),
            "s" => Some(Self::Suspect),
            "h" => Some(Self::Hostile),
            "j" => Some(Self::Joker),
            "k" => Some(Self::Faker),
            "o" => Some(Self::None),
            _ => None,
        }
    }
}

/// One decoded CoT message.
///
/// Events are values: every field is fixed at construction. Build them with
/// [`Event::builder`] or one of the family constructors; the codec builds
/// them on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub(crate) uid: String,
    pub(crate) event_type: String,
    pub(crate) how: String,
    pub(crate) time: DateTime<Utc>,
    pub(crate) start: DateTime<Utc>,
    pub(crate) stale: DateTime<Utc>,
    pub(crate) point: Option<Point>,
    pub(crate) detail: Detail,
}

impl Event {
    /// Start building an event with the given type tag.
    pub fn builder(event_type: impl Into<String>) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Self-position report (PLI) or any other `a-` track.
    pub fn position(
        uid: impl Into<String>,
        event_type: impl Into<String>,
        point: Point,
        detail: PositionDetail,
    ) -> EventBuilder {
        EventBuilder::new(event_type)
            .uid(uid)
            .point(point)
            .detail(Detail::Position(detail))
    }

    /// GeoChat message.
    ///
    /// The uid follows the `GeoChat.<sender>.<room>.<message id>` convention.
    pub fn chat(chat: ChatDetail) -> EventBuilder {
        let uid = format!(
            "GeoChat.{}.{}.{}",
            chat.sender_uid, chat.chatroom_id, chat.message_id
        );
        EventBuilder::new("b-t-f")
            .uid(uid)
            .how(HOW_HUMAN)
            .detail(Detail::Chat(chat))
    }

    /// Emergency alert or cancellation.
    pub fn emergency(sender_uid: &str, detail: EmergencyDetail) -> EventBuilder {
        EventBuilder::new(detail.type_tag())
            .uid(format!("{}-9-1-1", sender_uid))
            .how(HOW_HUMAN)
            .detail(Detail::Emergency(detail))
    }

    /// Map waypoint.
    pub fn waypoint(uid: impl Into<String>, point: Point, detail: WaypointDetail) -> EventBuilder {
        EventBuilder::new("b-m-p-w")
            .uid(uid)
            .how(HOW_HUMAN)
            .point(point)
            .detail(Detail::Waypoint(detail))
    }

    /// Keepalive ping.
    pub fn ping(uid: impl Into<String>) -> EventBuilder {
        EventBuilder::new(PING_TYPE)
            .uid(uid)
            .how(HOW_HUMAN)
            .point(Point::new(0.0, 0.0))
            .stale_after(Duration::from_secs(20))
    }

    /// Unique id.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Hierarchical type tag.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// How the event was generated.
    pub fn how(&self) -> &str {
        &self.how
    }

    /// Time the event was issued.
    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Start of the validity window.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// End of the validity window.
    pub fn stale(&self) -> DateTime<Utc> {
        self.stale
    }

    /// Location, when the event carries one.
    pub fn point(&self) -> Option<&Point> {
        self.point.as_ref()
    }

    /// Family payload.
    pub fn detail(&self) -> &Detail {
        &self.detail
    }

    /// Routing category, derived from the decoded payload.
    pub fn category(&self) -> Category {
        self.detail.category()
    }

    /// Affiliation for `a-` events.
    pub fn affiliation(&self) -> Option<Affiliation> {
        Affiliation::from_type_tag(&self.event_type)
    }

    /// Team (group) name for position events.
    pub fn team(&self) -> Option<&str> {
        match &self.detail {
            Detail::Position(p) => p.group.as_ref().map(|g| g.name.as_str()),
            _ => None,
        }
    }

    /// Whether the event is past its stale time at `at`.
    ///
    /// Expiry is a consumer decision; the core never drops stale events.
    pub fn is_stale_at(&self, at: DateTime<Utc>) -> bool {
        at > self.stale
    }
}

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    uid: Option<String>,
    event_type: String,
    how: String,
    time: Option<DateTime<Utc>>,
    start: Option<DateTime<Utc>>,
    stale: Option<DateTime<Utc>>,
    stale_after: Duration,
    point: Option<Point>,
    detail: Option<Detail>,
}

impl EventBuilder {
    /// Create a builder for the given type tag.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            uid: None,
            event_type: event_type.into(),
            how: HOW_MACHINE_GPS.to_string(),
            time: None,
            start: None,
            stale: None,
            stale_after: DEFAULT_STALE,
            point: None,
            detail: None,
        }
    }

    /// Set the uid (a random UUID is used otherwise).
    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Set the `how` attribute.
    pub fn how(mut self, how: impl Into<String>) -> Self {
        self.how = how.into();
        self
    }

    /// Set the issue time (defaults to now).
    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the start time (defaults to the issue time).
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Set an absolute stale time.
    pub fn stale(mut self, stale: DateTime<Utc>) -> Self {
        self.stale = Some(stale);
        self
    }

    /// Set the stale time relative to start.
    pub fn stale_after(mut self, after: Duration) -> Self {
        self.stale_after = after;
        self
    }

    /// Set the location.
    pub fn point(mut self, point: Point) -> Self {
        self.point = Some(point);
        self
    }

    /// Set the family payload.
    pub fn detail(mut self, detail: Detail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Validate and build the event.
    pub fn build(self) -> Result<Event, EventError> {
        let uid = self.uid.unwrap_or_else(|| Uuid::new_v4().to_string());
        if uid.is_empty() {
            return Err(EventError::EmptyUid);
        }

        let time = self.time.map(normalize).unwrap_or_else(now);
        let start = self.start.map(normalize).unwrap_or(time);
        let stale = match self.stale {
            Some(stale) => normalize(stale),
            None => TimeDelta::from_std(self.stale_after)
                .ok()
                .and_then(|delta| start.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        if start > stale {
            return Err(EventError::InvertedWindow);
        }

        if let Some(p) = &self.point
            && !p.is_valid()
        {
            return Err(EventError::InvalidPoint {
                lat: p.lat,
                lon: p.lon,
            });
        }

        let category = Category::from_type_tag(&self.event_type);
        let detail = match self.detail {
            Some(detail) => detail,
            None if category == Category::Position => Detail::Position(PositionDetail::default()),
            None => Detail::Unknown(UnknownDetail {
                type_tag: self.event_type.clone(),
                raw: None,
            }),
        };

        let detail_category = detail.category();
        if detail_category != Category::Unknown && detail_category != category {
            return Err(EventError::FamilyMismatch {
                type_tag: self.event_type,
                detail: detail_category.name(),
            });
        }
        if detail_category.requires_point() && self.point.is_none() {
            return Err(EventError::MissingPoint(detail_category.name()));
        }

        Ok(Event {
            uid,
            event_type: self.event_type,
            how: self.how,
            time,
            start,
            stale,
            point: self.point,
            detail,
        })
    }
}
