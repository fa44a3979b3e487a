//! Detail payloads.
//!
//! The open-ended `<detail>` element is modelled as a sum type with one
//! variant per known family and an opaque catch-all, so adding a family is a
//! compile-time-checked change everywhere details are matched.

mod chat;
mod common;
mod emergency;
mod position;
mod waypoint;

use roxmltree::Node;
use serde::{Deserialize, Serialize};

pub use chat::ChatDetail;
pub use common::{Contact, Group, Link, Status, Takv, Track};
pub use emergency::{EmergencyDetail, EmergencyKind};
pub use position::PositionDetail;
pub use waypoint::WaypointDetail;

use super::xml::XmlWriter;

/// Check whether `type_tag` equals `prefix` or extends it by whole atoms.
///
/// `b-a` matches `b-a` and `b-a-o-tbl` but not `b-ab`.
pub fn type_matches(type_tag: &str, prefix: &str) -> bool {
    match type_tag.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('-') || prefix.ends_with('-'),
        None => false,
    }
}

/// Event family, used for decoder dispatch and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Position / track update (`a-*`).
    Position,
    /// Chat message (`b-t-f*`).
    Chat,
    /// Emergency or alert (`b-a*`).
    Emergency,
    /// Waypoint or map point (`b-m-p*`).
    Waypoint,
    /// Anything else.
    Unknown,
}

impl Category {
    /// Every category.
    pub const ALL: [Category; 5] = [
        Category::Position,
        Category::Chat,
        Category::Emergency,
        Category::Waypoint,
        Category::Unknown,
    ];

    /// Classify a type tag by prefix.
    pub fn from_type_tag(type_tag: &str) -> Self {
        if type_matches(type_tag, "a") {
            Category::Position
        } else if type_matches(type_tag, "b-t-f") {
            Category::Chat
        } else if type_matches(type_tag, "b-a") {
            Category::Emergency
        } else if type_matches(type_tag, "b-m-p") {
            Category::Waypoint
        } else {
            Category::Unknown
        }
    }

    /// Lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            Category::Position => "position",
            Category::Chat => "chat",
            Category::Emergency => "emergency",
            Category::Waypoint => "waypoint",
            Category::Unknown => "unknown",
        }
    }

    /// Whether the family payload is meaningless without a point.
    pub(crate) fn requires_point(self) -> bool {
        matches!(self, Category::Position | Category::Waypoint)
    }
}

/// Detail of an unrecognised type tag, or of a known family whose required
/// fields were missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDetail {
    /// Type tag of the envelope.
    pub type_tag: String,
    /// The complete `<detail>` element as received, if there was one.
    pub raw: Option<String>,
}

/// Family payload of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Detail {
    /// Position / track.
    Position(PositionDetail),
    /// Chat message.
    Chat(ChatDetail),
    /// Emergency alert.
    Emergency(EmergencyDetail),
    /// Waypoint.
    Waypoint(WaypointDetail),
    /// Opaque payload.
    Unknown(UnknownDetail),
}

impl Detail {
    /// Routing category of this payload.
    pub fn category(&self) -> Category {
        match self {
            Detail::Position(_) => Category::Position,
            Detail::Chat(_) => Category::Chat,
            Detail::Emergency(_) => Category::Emergency,
            Detail::Waypoint(_) => Category::Waypoint,
            Detail::Unknown(_) => Category::Unknown,
        }
    }

    /// Run the family sub-decoder for `category`.
    ///
    /// Returns `None` when required family fields are missing; the caller
    /// falls back to [`Detail::Unknown`].
    pub(crate) fn decode_family(category: Category, detail: Option<Node<'_, '_>>) -> Option<Self> {
        match category {
            Category::Position => PositionDetail::decode(detail).map(Detail::Position),
            Category::Chat => ChatDetail::decode(detail).map(Detail::Chat),
            Category::Emergency => EmergencyDetail::decode(detail).map(Detail::Emergency),
            Category::Waypoint => WaypointDetail::decode(detail).map(Detail::Waypoint),
            Category::Unknown => None,
        }
    }

    /// Write the `<detail>` element.
    pub(crate) fn write(&self, w: &mut XmlWriter) {
        if let Detail::Unknown(unknown) = self {
            if let Some(raw) = &unknown.raw {
                w.raw(raw);
            }
            return;
        }
        w.start("detail").open();
        match self {
            Detail::Position(p) => p.write(w),
            Detail::Chat(c) => c.write(w),
            Detail::Emergency(e) => e.write(w),
            Detail::Waypoint(p) => p.write(w),
            Detail::Unknown(_) => {}
        }
        w.end("detail");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_matches() {
        assert!(type_matches("b-a", "b-a"));
        assert!(type_matches("b-a-o-tbl", "b-a"));
        assert!(!type_matches("b-ab", "b-a"));
        assert!(!type_matches("a-f", "b-a"));
        assert!(type_matches("a-f-G", "a-"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(Category::from_type_tag("a-f-G-U-C"), Category::Position);
        assert_eq!(Category::from_type_tag("b-t-f"), Category::Chat);
        assert_eq!(Category::from_type_tag("b-t-f-d"), Category::Chat);
        assert_eq!(Category::from_type_tag("b-a-o-tbl"), Category::Emergency);
        assert_eq!(Category::from_type_tag("b-m-p-s-m"), Category::Waypoint);
        assert_eq!(Category::from_type_tag("t-x-c-t"), Category::Unknown);
        assert_eq!(Category::from_type_tag("u-d-f"), Category::Unknown);
        assert_eq!(Category::from_type_tag(""), Category::Unknown);
    }
}
