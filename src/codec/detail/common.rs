//! Detail sub-elements shared by several families.

use roxmltree::Node;

use crate::codec::xml::{attr_parse, attr_string, child, XmlWriter};

/// `<contact>`: who sent or owns the event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// Display name.
    pub callsign: String,
    /// Reachability endpoint, e.g. `192.168.1.10:4242:tcp` or `*:-1:stcp`.
    pub endpoint: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
}

impl Contact {
    /// Contact with only a callsign.
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            endpoint: None,
            phone: None,
        }
    }

    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "contact")?;
        Some(Self {
            callsign: attr_string(node, "callsign")?,
            endpoint: attr_string(node, "endpoint"),
            phone: attr_string(node, "phone"),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("contact")
            .attr_opt("endpoint", self.endpoint.as_deref())
            .attr_opt("phone", self.phone.as_deref())
            .attr("callsign", &self.callsign)
            .close();
    }
}

/// `<__group>`: team colour and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Team name, e.g. `Cyan`.
    pub name: String,
    /// Role, e.g. `Team Member`.
    pub role: String,
}

impl Group {
    /// Create a group.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }

    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "__group")?;
        Some(Self {
            name: attr_string(node, "name")?,
            role: attr_string(node, "role").unwrap_or_default(),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("__group")
            .attr("name", &self.name)
            .attr("role", &self.role)
            .close();
    }
}

/// `<track>`: kinematics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    /// Course over ground in degrees true.
    pub course: f64,
    /// Speed in metres per second.
    pub speed: f64,
}

impl Track {
    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "track")?;
        Some(Self {
            course: attr_parse(node, "course")?,
            speed: attr_parse(node, "speed")?,
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("track")
            .attr("course", self.course)
            .attr("speed", self.speed)
            .close();
    }
}

/// `<status>`: device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Battery percentage.
    pub battery: u8,
}

impl Status {
    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "status")?;
        Some(Self {
            battery: attr_parse(node, "battery")?,
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("status").attr("battery", self.battery).close();
    }
}

/// `<takv>`: sending software and platform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Takv {
    /// Device model.
    pub device: String,
    /// Client product, e.g. `ATAK-CIV`.
    pub platform: String,
    /// Operating system.
    pub os: String,
    /// Client version.
    pub version: String,
}

impl Takv {
    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "takv")?;
        Some(Self {
            device: attr_string(node, "device").unwrap_or_default(),
            platform: attr_string(node, "platform").unwrap_or_default(),
            os: attr_string(node, "os").unwrap_or_default(),
            version: attr_string(node, "version").unwrap_or_default(),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("takv")
            .attr("device", &self.device)
            .attr("platform", &self.platform)
            .attr("os", &self.os)
            .attr("version", &self.version)
            .close();
    }
}

/// `<link>`: relation to another event, usually the parent (`p-p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Uid of the linked event.
    pub uid: String,
    /// Type tag of the linked event.
    pub type_tag: String,
    /// Relation code.
    pub relation: String,
}

impl Link {
    /// Parent link (`relation="p-p"`).
    pub fn parent(uid: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            type_tag: type_tag.into(),
            relation: "p-p".to_string(),
        }
    }

    pub(crate) fn decode(detail: Node<'_, '_>) -> Option<Self> {
        let node = child(detail, "link")?;
        Some(Self {
            uid: attr_string(node, "uid")?,
            type_tag: attr_string(node, "type").unwrap_or_default(),
            relation: attr_string(node, "relation").unwrap_or_default(),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("link")
            .attr("uid", &self.uid)
            .attr("type", &self.type_tag)
            .attr("relation", &self.relation)
            .close();
    }
}
