//! CoT codec.
//!
//! Converts between one complete wire message (as produced by
//! [`crate::framing::Reassembler`]) and an [`Event`]. Encoding is the exact
//! inverse of decoding for every known family:
//! `decode(encode(e)) == e` for any event built through [`EventBuilder`].

mod decode;
pub mod detail;
mod encode;
mod event;
pub mod time;
mod xml;

pub use decode::decode;
pub use detail::{
    type_matches, Category, ChatDetail, Contact, Detail, EmergencyDetail, EmergencyKind, Group,
    Link, PositionDetail, Status, Takv, Track, UnknownDetail, WaypointDetail,
};
pub use encode::encode;
pub use event::{Affiliation, Event, EventBuilder, Point};
pub use xml::{escape, Tag, XmlWriter};
