//! Position / track family (`a-*` type tags).

use roxmltree::Node;

use super::common::{Contact, Group, Status, Takv, Track};
use crate::codec::xml::XmlWriter;

/// Detail payload of a position report.
///
/// Every block is optional; a bare `<detail/>` decodes to the default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionDetail {
    /// Sender identity.
    pub contact: Option<Contact>,
    /// Team membership.
    pub group: Option<Group>,
    /// Course and speed.
    pub track: Option<Track>,
    /// Device status.
    pub status: Option<Status>,
    /// Sending software.
    pub takv: Option<Takv>,
}

impl PositionDetail {
    pub(crate) fn decode(detail: Option<Node<'_, '_>>) -> Option<Self> {
        let Some(detail) = detail else {
            return Some(Self::default());
        };
        Some(Self {
            contact: Contact::decode(detail),
            group: Group::decode(detail),
            track: Track::decode(detail),
            status: Status::decode(detail),
            takv: Takv::decode(detail),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        if let Some(takv) = &self.takv {
            takv.write(w);
        }
        if let Some(contact) = &self.contact {
            contact.write(w);
        }
        if let Some(group) = &self.group {
            group.write(w);
        }
        if let Some(status) = &self.status {
            status.write(w);
        }
        if let Some(track) = &self.track {
            track.write(w);
        }
    }
}
