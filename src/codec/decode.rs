//! Wire message to [`Event`].

use roxmltree::{Document, Node};
use tracing::debug;

use super::detail::{Category, Detail, UnknownDetail};
use super::event::{Event, Point};
use super::time::parse_time;
use super::xml::{attr_parse, child};
use crate::core::{DecodeError, UNKNOWN_ERROR};

/// Decode one complete CoT message.
///
/// Dispatch is driven by the type tag. When the family sub-decoder cannot
/// find its required fields (uid, a valid point for families that need one,
/// family elements) the event still decodes, carrying the detail opaquely
/// as [`Detail::Unknown`]. Only an unusable envelope is an error.
pub fn decode(message: &[u8]) -> Result<Event, DecodeError> {
    let text = std::str::from_utf8(message).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
        raw: message.to_vec(),
    })?;
    let doc = Document::parse(text).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
        raw: message.to_vec(),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "event" {
        return Err(DecodeError::UnexpectedRoot {
            found: root.tag_name().name().to_string(),
            raw: message.to_vec(),
        });
    }

    let time = envelope_time(root, "time", message)?;
    let start = envelope_time(root, "start", message)?;
    let stale = envelope_time(root, "stale", message)?;
    if start > stale {
        return Err(DecodeError::InvertedWindow {
            raw: message.to_vec(),
        });
    }

    let uid = root.attribute("uid").unwrap_or_default().to_string();
    let event_type = root.attribute("type").unwrap_or_default().to_string();
    let how = root.attribute("how").unwrap_or_default().to_string();

    // Outer None: no <point>. Inner None: a <point> that does not parse.
    let point = child(root, "point").map(decode_point);
    let detail_node = child(root, "detail");
    let category = Category::from_type_tag(&event_type);

    let point_ok = match point {
        Some(Some(_)) => true,
        Some(None) => false,
        None => !category.requires_point(),
    };

    let family = if !uid.is_empty() && point_ok {
        Detail::decode_family(category, detail_node)
    } else {
        None
    };

    let detail = match family {
        Some(detail) => detail,
        None => {
            if category != Category::Unknown {
                debug!(uid = %uid, type_tag = %event_type, "family decode failed, keeping detail opaque");
            }
            Detail::Unknown(UnknownDetail {
                type_tag: event_type.clone(),
                raw: detail_node.map(|n| text[n.range()].to_string()),
            })
        }
    };

    Ok(Event {
        uid,
        event_type,
        how,
        time,
        start,
        stale,
        point: point.flatten(),
        detail,
    })
}

fn envelope_time(
    root: Node<'_, '_>,
    name: &'static str,
    message: &[u8],
) -> Result<chrono::DateTime<chrono::Utc>, DecodeError> {
    let value = root
        .attribute(name)
        .ok_or_else(|| DecodeError::InvalidAttribute {
            name,
            reason: "missing".to_string(),
            raw: message.to_vec(),
        })?;
    parse_time(value).ok_or_else(|| DecodeError::InvalidAttribute {
        name,
        reason: format!("not a timestamp: {:?}", value),
        raw: message.to_vec(),
    })
}

fn decode_point(node: Node<'_, '_>) -> Option<Point> {
    let point = Point {
        lat: attr_parse(node, "lat")?,
        lon: attr_parse(node, "lon")?,
        hae: attr_parse(node, "hae").unwrap_or(UNKNOWN_ERROR),
        ce: attr_parse(node, "ce").unwrap_or(UNKNOWN_ERROR),
        le: attr_parse(node, "le").unwrap_or(UNKNOWN_ERROR),
    };
    point.is_valid().then_some(point)
}
