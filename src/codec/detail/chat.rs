//! GeoChat family (`b-t-f`).
//!
//! ```text
//! <detail>
//!   <__chat parent="RootContactGroup" groupOwner="false" messageId=".." chatroom=".." id=".." senderCallsign="..">
//!     <chatgrp uid0="<sender uid>" uid1="<room id>" id="<room id>"/>
//!   </__chat>
//!   <link uid="<sender uid>" type="a-f-G-U-C" relation="p-p"/>
//!   <remarks source="BAO.F.ATAK.<sender uid>" to="<room id>">message text</remarks>
//! </detail>
//! ```

use roxmltree::Node;
use uuid::Uuid;

use super::common::Link;
use crate::codec::xml::{attr_string, child, text_of, XmlWriter};
use crate::core::ALL_CHAT_ROOMS;

/// Detail payload of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDetail {
    /// Message id, unique per message.
    pub message_id: String,
    /// Room display name.
    pub chatroom: String,
    /// Room id (a contact uid for direct messages).
    pub chatroom_id: String,
    /// Uid of the sender's self-position event.
    pub sender_uid: String,
    /// Sender display name.
    pub sender_callsign: String,
    /// Message body.
    pub message: String,
}

impl ChatDetail {
    /// Message to the broadcast room with a fresh message id.
    pub fn broadcast(
        sender_uid: impl Into<String>,
        sender_callsign: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            chatroom: ALL_CHAT_ROOMS.to_string(),
            chatroom_id: ALL_CHAT_ROOMS.to_string(),
            sender_uid: sender_uid.into(),
            sender_callsign: sender_callsign.into(),
            message: message.into(),
        }
    }

    /// Direct message to one contact.
    pub fn direct(
        sender_uid: impl Into<String>,
        sender_callsign: impl Into<String>,
        recipient_uid: impl Into<String>,
        recipient_callsign: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            chatroom: recipient_callsign.into(),
            chatroom_id: recipient_uid.into(),
            sender_uid: sender_uid.into(),
            sender_callsign: sender_callsign.into(),
            message: message.into(),
        }
    }

    pub(crate) fn decode(detail: Option<Node<'_, '_>>) -> Option<Self> {
        let detail = detail?;
        let chat = child(detail, "__chat")?;
        let chatroom = attr_string(chat, "chatroom")?;
        let sender_uid = child(chat, "chatgrp")
            .and_then(|g| attr_string(g, "uid0"))
            .or_else(|| Link::decode(detail).map(|l| l.uid))?;

        Some(Self {
            message_id: attr_string(chat, "messageId").unwrap_or_default(),
            chatroom_id: attr_string(chat, "id").unwrap_or_else(|| chatroom.clone()),
            chatroom,
            sender_uid,
            sender_callsign: attr_string(chat, "senderCallsign")?,
            message: child(detail, "remarks").map(text_of).unwrap_or_default(),
        })
    }

    pub(crate) fn write(&self, w: &mut XmlWriter) {
        w.start("__chat")
            .attr("parent", "RootContactGroup")
            .attr("groupOwner", "false")
            .attr("messageId", &self.message_id)
            .attr("chatroom", &self.chatroom)
            .attr("id", &self.chatroom_id)
            .attr("senderCallsign", &self.sender_callsign)
            .open();
        w.start("chatgrp")
            .attr("uid0", &self.sender_uid)
            .attr("uid1", &self.chatroom_id)
            .attr("id", &self.chatroom_id)
            .close();
        w.end("__chat");

        Link::parent(&self.sender_uid, "a-f-G-U-C").write(w);

        w.start("remarks")
            .attr("source", format!("BAO.F.ATAK.{}", self.sender_uid))
            .attr("to", &self.chatroom_id)
            .open();
        w.text(&self.message);
        w.end("remarks");
    }
}
