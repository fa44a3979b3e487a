//! Emergency / alert family (`b-a-*` type tags).

use roxmltree::Node;

use super::common::{Contact, Link};
use crate::codec::xml::{attr_string, child, text_of, XmlWriter};

/// Kind of emergency, carried in the `type` attribute of `<emergency>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmergencyKind {
    /// `911 Alert` (`b-a-o-tbl`).
    NineOneOne,
    /// `Ring The Bell` (`b-a-o-pan`).
    RingTheBell,
    /// `In Contact` (`b-a-o-opn`).
    InContact,
    /// `Geo-fence Breached` (`b-a-g`).
    GeoFenceBreached,
    /// Any other label. Labels of the named kinds always parse to those kinds.
    Custom(String),
}

impl EmergencyKind {
    /// Parse a wire label.
    pub fn from_label(label: &str) -> Self {
        match label {
            "911 Alert" => Self::NineOneOne,
            "Ring The Bell" => Self::RingTheBell,
            "In Contact" | "Troops In Contact" => Self::InContact,
            "Geo-fence Breached" => Self::GeoFenceBreached,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Wire label.
    pub fn label(&self) -> &str {
        match self {
            Self::NineOneOne => "911 Alert",
            Self::RingTheBell => "Ring The Bell",
            Self::InContact => "In Contact",
            Self::GeoFenceBreached => "Geo-fence Breached",
            Self::Custom(label) => label,
        }
    }

    /// Type tag of an alert of this kind.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::NineOneOne => "b-a-o-tbl",
            Self::RingTheBell => "b-a-o-pan",
            Self::InContact => "b-a-o-opn",
            Self::GeoFenceBreached => "b-a-g",
            Self::Custom(_) => "b-a",
        }
    }
}

/// Detail payload of an emergency alert or its cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyDetail {
    /// Alert kind; absent on cancellations.
    pub kind: Option<EmergencyKind>,
    /// Whether this cancels an earlier alert.
    pub cancel: bool,
    /// Element text, conventionally the sender's callsign.
    pub message: String,
    /// Contact callsign shown on the alert marker.
    pub callsign: Option<String>,
    /// Uid of the sender's self-position event.
    pub sender_uid: Option<String>,
}

impl EmergencyDetail {
    /// New alert raised by `callsign`.
    pub fn alert(kind: EmergencyKind, callsign: impl Into<String>) -> Self {
        let callsign = callsign.into();
        Self {
            kind: Some(kind),
            cancel: false,
            callsign: Some(format!("{}-Alert", callsign)),
            message: callsign,
            sender_uid: None,
        }
    }

    /// Cancellation of an alert raised by `callsign`.
    pub fn cancellation(callsign: impl Into<String>) -> Self {
        let callsign = callsign.into();
        Self {
            kind: None,
            cancel: true,
            callsign: Some(format!("{}-Alert", callsign)),
            message: callsign,
            sender_uid: None,
        }
    }

    /// Attach the sender uid.
    pub fn with_sender(mut self, uid: impl Into<String>) -> Self {
        self.sender_uid = Some(uid.into());
        self
    }

    /// Type tag for an event carrying this payload.
    pub fn type_tag(&self) -> &'static str {
        match (&self.kind, self.cancel) {
            (_, true) => "b-a-o-can",
            (Some(kind), false) => kind.type_tag(),
            (None, false) => "b-a",
        }
    }

    pub(crate) fn decode(detail: Option<Node<'_, '_>>) -> Option<Self> {
        let detail = detail?;
        let node = child(detail, "emergency")?;
        Some(Self {
            kind: node.attribute("type").map(EmergencyKind::from_label),
            cancel: node
                .attribute("cancel")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            message: text_of(node),
            callsign: Contact::decode(detail).map(|c| c.callsign),
            sender_uid: Link::decode(detail).map(|l| l.uid),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        if let Some(uid) = &self.sender_uid {
            Link::parent(uid, "a-f-G-U-C").write(w);
        }
        if let Some(callsign) = &self.callsign {
            Contact::new(callsign).write(w);
        }
        w.start("emergency")
            .attr_opt("type", self.kind.as_ref().map(EmergencyKind::label))
            .attr_opt("cancel", self.cancel.then_some("true"))
            .open();
        w.text(&self.message);
        w.end("emergency");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in [
            EmergencyKind::NineOneOne,
            EmergencyKind::RingTheBell,
            EmergencyKind::InContact,
            EmergencyKind::GeoFenceBreached,
            EmergencyKind::Custom("Man Down".into()),
        ] {
            assert_eq!(EmergencyKind::from_label(kind.label()), kind);
        }
        assert_eq!(
            EmergencyKind::from_label("Troops In Contact"),
            EmergencyKind::InContact
        );
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(
            EmergencyDetail::alert(EmergencyKind::NineOneOne, "A").type_tag(),
            "b-a-o-tbl"
        );
        assert_eq!(EmergencyDetail::cancellation("A").type_tag(), "b-a-o-can");
        assert_eq!(
            EmergencyDetail::alert(EmergencyKind::GeoFenceBreached, "A").type_tag(),
            "b-a-g"
        );
    }
}
