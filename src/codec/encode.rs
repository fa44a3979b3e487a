//! [`Event`] to wire message.

use super::event::Event;
use super::time::format_time;
use super::xml::XmlWriter;
use crate::core::COT_VERSION;

/// Serialize an event to one complete CoT message.
///
/// Output always starts with the XML declaration and contains exactly one
/// `<event>` element, so it can be written to a stream or datagram as-is.
pub fn encode(event: &Event) -> Vec<u8> {
    let mut w = XmlWriter::new();
    w.declaration();
    w.start("event")
        .attr("version", COT_VERSION)
        .attr("uid", &event.uid)
        .attr("type", &event.event_type)
        .attr("how", &event.how)
        .attr("time", format_time(&event.time))
        .attr("start", format_time(&event.start))
        .attr("stale", format_time(&event.stale))
        .open();

    if let Some(p) = &event.point {
        w.start("point")
            .attr("lat", p.lat)
            .attr("lon", p.lon)
            .attr("hae", p.hae)
            .attr("ce", p.ce)
            .attr("le", p.le)
            .close();
    }

    event.detail.write(&mut w);
    w.end("event");
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::detail::{Contact, PositionDetail};
    use crate::codec::event::Point;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_encode_layout() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let detail = PositionDetail {
            contact: Some(Contact::new("A\"B")),
            ..Default::default()
        };
        let event = Event::position("U-1", "a-f-G", Point::new(1.5, -2.25), detail)
            .time(t)
            .build()
            .unwrap();

        let xml = String::from_utf8(encode(&event)).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains(
            r#"<event version="2.0" uid="U-1" type="a-f-G" how="m-g" time="2024-05-01T12:00:00.000Z" start="2024-05-01T12:00:00.000Z" stale="2024-05-01T12:02:00.000Z">"#
        ));
        assert!(xml.contains(r#"<point lat="1.5" lon="-2.25" hae="9999999" ce="9999999" le="9999999"/>"#));
        assert!(xml.contains(r#"callsign="A&quot;B""#));
        assert!(xml.ends_with("</detail></event>"));
    }

    #[test]
    fn test_encode_ping_has_no_detail() {
        let event = Event::ping("me").build().unwrap();
        let xml = String::from_utf8(encode(&event)).unwrap();
        assert!(xml.contains(r#"type="t-x-c-t""#));
        assert!(!xml.contains("<detail"));
        assert_eq!(xml.matches("<event").count(), 1);
    }
}
