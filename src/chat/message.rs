use crate::chat::action::{Action, ActionKind};
use crate::chat::image_store::ImageHandle;
use crate::chat::payloads::{ConnectionNotice, ImageMessagePayload, ImageMetadata, TextMessagePayload};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessageContent {
    Text(String),
    Image { metadata: ImageMetadata, handle: ImageHandle },
    /// a user joined (`true`) or left (`false`)
    Connection(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// assigned by the server
    pub message_id: u64,
    pub sender: u64,
    /// unix seconds, assigned by the server
    pub timestamp: i64,
    pub content: ChatMessageContent,
}

impl ChatMessage {
    /// the action announcing this message; for images, the bytes follow as `FILE_DATA`
    pub fn to_action(&self) -> Action {
        match &self.content {
            ChatMessageContent::Text(text) => Action::from_payload(ActionKind::MessageText, &TextMessagePayload {
                timestamp: self.timestamp,
                user_id: self.sender,
                message_id: self.message_id,
                text: text.clone(),
            }),
            ChatMessageContent::Image { metadata, .. } => Action::from_payload(ActionKind::MessageImage, &ImageMessagePayload {
                timestamp: self.timestamp,
                user_id: self.sender,
                message_id: self.message_id,
                image: metadata.clone(),
                inline_data: None,
            }),
            ChatMessageContent::Connection(connected) => ConnectionNotice {
                timestamp: self.timestamp,
                user_id: self.sender,
                message_id: self.message_id,
            }.to_action(*connected),
        }
    }
}

/// Receives every message that is ready for display
#[cfg_attr(test, mockall::automock)]
pub trait MessageStore: Send {
    fn receive(&mut self, message: ChatMessage);
    fn all_messages(&self) -> Vec<ChatMessage>;
}

/// Keeps messages ordered by timestamp; messages with equal timestamps stay in arrival order
#[derive(Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> MessageLog {
        MessageLog::default()
    }
}

impl MessageStore for MessageLog {
    fn receive(&mut self, message: ChatMessage) {
        let pos = self.messages.partition_point(|m| m.timestamp <= message.timestamp);
        self.messages.insert(pos, message);
    }

    fn all_messages(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn text(message_id: u64, timestamp: i64) -> ChatMessage {
        ChatMessage {
            message_id,
            sender: 1,
            timestamp,
            content: ChatMessageContent::Text(format!("#{}", message_id)),
        }
    }

    #[test]
    fn test_log_orders_by_timestamp() {
        let mut log = MessageLog::new();
        log.receive(text(0, 10));
        log.receive(text(1, 30));
        log.receive(text(2, 20));
        log.receive(text(3, 10));
        log.receive(text(4, 5));

        let ids = log.all_messages().iter().map(|m| m.message_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![4, 0, 3, 2, 1]);
    }

    #[test]
    fn test_to_action() {
        let action = text(7, 99).to_action();
        assert_eq!(action.kind, ActionKind::MessageText);
        assert_eq!(action.decode_payload::<TextMessagePayload>().unwrap(), TextMessagePayload {
            timestamp: 99,
            user_id: 1,
            message_id: 7,
            text: "#7".to_string(),
        });

        let notice = ChatMessage { message_id: 1, sender: 2, timestamp: 3, content: ChatMessageContent::Connection(false) };
        assert_eq!(notice.to_action().kind, ActionKind::UserDisconnect);
    }
}
