//! Waypoint / map point family (`b-m-p-*` type tags).

use roxmltree::Node;

use super::common::{Contact, Link};
use crate::codec::xml::{attr_parse, attr_string, child, text_of, XmlWriter};

/// Detail payload of a map point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaypointDetail {
    /// Label shown on the map.
    pub callsign: String,
    /// Free-text remarks.
    pub remarks: Option<String>,
    /// Marker colour as signed ARGB.
    pub color_argb: Option<i32>,
    /// Icon set path.
    pub icon: Option<String>,
    /// Creator or route the point belongs to.
    pub parent: Option<Link>,
    /// Whether receivers should persist the point.
    pub archive: bool,
}

impl WaypointDetail {
    /// Waypoint with only a label.
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            remarks: None,
            color_argb: None,
            icon: None,
            parent: None,
            archive: false,
        }
    }

    pub(crate) fn decode(detail: Option<Node<'_, '_>>) -> Option<Self> {
        let detail = detail?;
        Some(Self {
            callsign: Contact::decode(detail)?.callsign,
            remarks: child(detail, "remarks").map(text_of),
            color_argb: child(detail, "color").and_then(|n| attr_parse(n, "argb")),
            icon: child(detail, "usericon").and_then(|n| attr_string(n, "iconsetpath")),
            parent: Link::decode(detail),
            archive: child(detail, "archive").is_some(),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        Contact::new(&self.callsign).write(w);
        if let Some(parent) = &self.parent {
            parent.write(w);
        }
        if let Some(argb) = self.color_argb {
            w.start("color").attr("argb", argb).close();
        }
        if let Some(icon) = &self.icon {
            w.start("usericon").attr("iconsetpath", icon).close();
        }
        if let Some(remarks) = &self.remarks {
            w.text_element("remarks", remarks);
        }
        if self.archive {
            w.start("archive").close();
        }
    }
}
