use std::sync::Arc;

use anyhow::{anyhow, bail};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info};

use crate::chat::action::{Action, ActionKind};
use crate::chat::chat_config::ChatConfig;
use crate::chat::file_transfer::{FileDataManager, TransferCursor};
use crate::chat::image_store::{ImageHandle, ImageStore};
use crate::chat::large_file::LargeFile;
use crate::chat::message::{ChatMessage, ChatMessageContent, MessageStore};
use crate::chat::payloads::{ConnectionNotice, FileDataPayload, ImageMessagePayload, ImageMetadata, TextMessagePayload, UserColorPayload, UserIconPayload, UserNamePayload};
use crate::chat::session::{Outbound, PendingActionBuffer};
use crate::chat::user::{Color, User, UserDirectory};

/// Keys of large objects start with the id of the user who created them, see
///  [ChatContext::add_local_image]. Nobody else may announce them.
pub fn check_key_owner(key: &str, user_id: u64) -> anyhow::Result<()> {
    if !key.starts_with(&format!("{:016x}/", user_id)) {
        bail!("user {} can not announce large file {}, it belongs to someone else", user_id, key);
    }
    Ok(())
}

/// An image provided by the local user, e.g. loaded from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub name: String,
    pub file_type: String,
    pub width: i32,
    pub height: i32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn metadata(&self, key: &str) -> ImageMetadata {
        ImageMetadata {
            key: key.to_string(),
            file_type: self.file_type.clone(),
            width: self.width,
            height: self.height,
            total_size: self.data.len() as u64,
        }
    }
}

/// Who the local user is
#[derive(Debug, Clone, PartialEq)]
pub struct LocalProfile {
    pub user_id: u64,
    pub name: String,
    pub color: Color,
    pub icon: Option<ImageData>,
}

impl LocalProfile {
    pub fn new(user_id: u64, name: impl Into<String>) -> LocalProfile {
        LocalProfile {
            user_id,
            name: name.into(),
            color: Color::WHITE,
            icon: None,
        }
    }
}

struct StoredFile {
    file: Arc<LargeFile>,
    metadata: ImageMetadata,
    handle: ImageHandle,
}

/// What a client or server knows on the consuming side: users, messages, images and the large
///  objects carrying them
pub struct ChatContext {
    pub config: ChatConfig,
    pub self_id: u64,
    pub users: UserDirectory,
    pub messages: Box<dyn MessageStore>,
    pub images: Box<dyn ImageStore>,
    pub transfers: FileDataManager,
    files: FxHashMap<String, StoredFile>,
    local_image_counter: u64,
}

impl ChatContext {
    pub fn new(config: ChatConfig, profile: LocalProfile, messages: Box<dyn MessageStore>, images: Box<dyn ImageStore>) -> anyhow::Result<ChatContext> {
        let mut result = ChatContext {
            config,
            self_id: profile.user_id,
            users: UserDirectory::new(),
            messages,
            images,
            transfers: FileDataManager::new(),
            files: FxHashMap::default(),
            local_image_counter: 0,
        };

        let user = result.users.get_or_create(profile.user_id);
        user.name = profile.name;
        user.color = profile.color;
        user.connected = true;
        if let Some(icon) = &profile.icon {
            result.set_local_icon(icon)?;
        }
        Ok(result)
    }

    pub fn self_user(&mut self) -> &mut User {
        self.users.get_or_create(self.self_id)
    }

    pub fn file(&self, key: &str) -> Option<&LargeFile> {
        self.files.get(key)
            .map(|f| f.file.as_ref())
    }

    pub fn shared_file(&self, key: &str) -> Option<Arc<LargeFile>> {
        self.files.get(key)
            .map(|f| f.file.clone())
    }

    pub fn truncate_text(&self, text: &str) -> String {
        if text.len() <= self.config.max_text_len {
            return text.to_string();
        }
        let mut end = self.config.max_text_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }

    pub fn validate_icon(&self, metadata: &ImageMetadata) -> anyhow::Result<()> {
        let range = &self.config.icon_resolution;
        if !range.contains(&metadata.width) || !range.contains(&metadata.height) {
            bail!("icon {} has resolution {}x{}, allowed is {:?} on each axis", metadata.key, metadata.width, metadata.height, range);
        }
        if metadata.total_size > self.config.max_icon_size {
            bail!("icon {} has {} bytes, the maximum is {}", metadata.key, metadata.total_size, self.config.max_icon_size);
        }
        Ok(())
    }

    pub fn validate_image(&self, metadata: &ImageMetadata) -> anyhow::Result<()> {
        if metadata.width <= 0 || metadata.height <= 0 {
            bail!("image {} has invalid resolution {}x{}", metadata.key, metadata.width, metadata.height);
        }
        if metadata.total_size > self.config.max_image_size {
            bail!("image {} has {} bytes, the maximum is {}", metadata.key, metadata.total_size, self.config.max_image_size);
        }
        Ok(())
    }

    /// Sets up the large object for an image announced over the network. Returns the image's
    ///  handle and whether reception actually started (as opposed to the key being known
    ///  already, e.g. for our own images coming back from the server). A known key is never
    ///  replaced; announcing it again with different size or type is an error.
    pub fn register_image(&mut self, metadata: &ImageMetadata, inline_data: Option<Bytes>) -> anyhow::Result<(ImageHandle, bool)> {
        if let Some(existing) = self.files.get(&metadata.key) {
            if existing.file.total_size() != metadata.total_size || existing.file.file_type() != metadata.file_type {
                bail!("large file {} is already known with {} bytes of type {}, can not re-register it with {} bytes of type {}",
                    metadata.key, existing.file.total_size(), existing.file.file_type(), metadata.total_size, metadata.file_type);
            }
            return Ok((existing.handle, false));
        }
        if let Some(data) = &inline_data {
            if data.len() as u64 != metadata.total_size {
                bail!("inline data for {} has {} bytes, announced are {}", metadata.key, data.len(), metadata.total_size);
            }
        }

        let file = match inline_data {
            Some(data) => LargeFile::from_bytes(metadata.key.clone(), metadata.file_type.clone(), data.to_vec()),
            None => LargeFile::pre_load(metadata.key.clone(), metadata.file_type.clone(), metadata.total_size, self.config.max_image_size)?,
        };
        let handle = self.images.get_or_create(&metadata.key);
        let complete = file.is_complete();
        self.files.insert(metadata.key.clone(), StoredFile {
            file: Arc::new(file),
            metadata: metadata.clone(),
            handle,
        });
        if complete {
            self.load_image(&metadata.key);
        }
        Ok((handle, true))
    }

    /// Feeds one `FILE_DATA` packet into its large object. Returns `true` if the packet was
    ///  new, i.e. worth relaying.
    pub fn accept_file_data(&mut self, payload: &FileDataPayload) -> anyhow::Result<bool> {
        let stored = self.files.get_mut(&payload.key)
            .ok_or_else(|| anyhow!("received data for unknown large file {} - metadata must come first", payload.key))?;

        if stored.file.has_packet(payload.packet_index) || stored.file.is_complete() {
            debug!("packet {} of {} is already known", payload.packet_index, payload.key);
            return Ok(false);
        }

        let completed = Arc::make_mut(&mut stored.file)
            .accept_packet(payload.packet_index, &payload.packet)?;
        if completed {
            info!("large file {} is complete", payload.key);
            self.load_image(&payload.key);
        }
        Ok(true)
    }

    fn load_image(&mut self, key: &str) {
        if let Some(stored) = self.files.get(key) {
            if let Err(e) = self.images.load(stored.handle, &stored.metadata, stored.file.data()) {
                error!("failed to load image {}: {}", key, e);
            }
        }
    }

    /// turns a locally provided image into a complete large object with a key that is unique
    ///  across all peers
    pub fn add_local_image(&mut self, image: &ImageData) -> (ImageMetadata, Arc<LargeFile>) {
        let key = format!("{:016x}/{}-{}", self.self_id, self.local_image_counter, image.name);
        self.local_image_counter += 1;

        let metadata = image.metadata(&key);
        let file = Arc::new(LargeFile::from_bytes(key.clone(), image.file_type.clone(), image.data.clone()));
        let handle = self.images.get_or_create(&key);
        self.files.insert(key.clone(), StoredFile {
            file: file.clone(),
            metadata: metadata.clone(),
            handle,
        });
        self.load_image(&key);
        (metadata, file)
    }

    /// validates and installs a new icon for the local user, returning the action announcing it
    pub fn set_local_icon(&mut self, icon: &ImageData) -> anyhow::Result<(Action, Arc<LargeFile>)> {
        self.validate_icon(&icon.metadata(&icon.name))?;

        let (metadata, file) = self.add_local_image(icon);
        let handle = self.files.get(&metadata.key).map(|f| f.handle);
        let user = self.self_user();
        user.icon_key = Some(metadata.key.clone());
        user.icon = handle;

        let action = Action::from_payload(ActionKind::UserUpdateIcon, &UserIconPayload {
            user_id: self.self_id,
            image: metadata,
            inline_data: None,
        });
        Ok((action, file))
    }

    pub fn apply_name(&mut self, payload: &UserNamePayload) {
        debug!("user {} is now called {}", payload.user_id, payload.name);
        self.users.get_or_create(payload.user_id).name = payload.name.clone();
    }

    pub fn apply_color(&mut self, payload: &UserColorPayload) {
        self.users.get_or_create(payload.user_id).color = payload.color;
    }

    /// validates the icon and starts its reception; the user is left unchanged if it is rejected
    pub fn apply_icon(&mut self, payload: &UserIconPayload) -> anyhow::Result<()> {
        check_key_owner(&payload.image.key, payload.user_id)?;
        self.validate_icon(&payload.image)?;
        let (handle, _) = self.register_image(&payload.image, payload.inline_data.clone())?;

        let user = self.users.get_or_create(payload.user_id);
        user.icon_key = Some(payload.image.key.clone());
        user.icon = Some(handle);
        Ok(())
    }

    pub fn apply_text(&mut self, payload: TextMessagePayload) {
        self.receive_message(ChatMessage {
            message_id: payload.message_id,
            sender: payload.user_id,
            timestamp: payload.timestamp,
            content: ChatMessageContent::Text(payload.text),
        });
    }

    /// validates the image and starts its reception before the message becomes visible
    pub fn apply_image_message(&mut self, payload: ImageMessagePayload) -> anyhow::Result<()> {
        check_key_owner(&payload.image.key, payload.user_id)?;
        self.validate_image(&payload.image)?;
        let (handle, _) = self.register_image(&payload.image, payload.inline_data)?;
        self.receive_message(ChatMessage {
            message_id: payload.message_id,
            sender: payload.user_id,
            timestamp: payload.timestamp,
            content: ChatMessageContent::Image { metadata: payload.image, handle },
        });
        Ok(())
    }

    pub fn apply_connection_notice(&mut self, notice: &ConnectionNotice, connected: bool) {
        self.users.get_or_create(notice.user_id).connected = connected;
        self.receive_message(ChatMessage {
            message_id: notice.message_id,
            sender: notice.user_id,
            timestamp: notice.timestamp,
            content: ChatMessageContent::Connection(connected),
        });
    }

    pub fn receive_message(&mut self, message: ChatMessage) {
        if let Some(user) = self.users.get_mut(message.sender) {
            user.last_activity = user.last_activity.max(message.timestamp);
        }
        self.messages.receive(message);
    }

    /// Actions announcing a user's name, color and icon, followed by those bytes of the icon
    ///  that are available
    pub fn profile_cursors(&self, user: &User) -> Vec<TransferCursor> {
        let mut result = vec![
            TransferCursor::Replay(Action::from_payload(ActionKind::UserUpdateName, &UserNamePayload {
                user_id: user.user_id,
                name: user.name.clone(),
            })),
            TransferCursor::Replay(Action::from_payload(ActionKind::UserUpdateColor, &UserColorPayload {
                user_id: user.user_id,
                color: user.color,
            })),
        ];

        if let Some(stored) = user.icon_key.as_ref().and_then(|key| self.files.get(key)) {
            result.push(TransferCursor::Replay(Action::from_payload(ActionKind::UserUpdateIcon, &UserIconPayload {
                user_id: user.user_id,
                image: stored.metadata.clone(),
                inline_data: None,
            })));
            result.push(TransferCursor::file(stored.file.clone()));
        }
        result
    }

    /// Everything a late joiner needs: all users' profiles, then the message history. Images
    ///  still in transfer contribute the packets received so far; the rest reaches the joiner
    ///  as it is relayed.
    pub fn catch_up_cursors(&self) -> Vec<TransferCursor> {
        let mut result = Vec::new();
        for user in self.users.all() {
            result.extend(self.profile_cursors(user));
        }

        for message in self.messages.all_messages() {
            let file = match &message.content {
                ChatMessageContent::Image { metadata, .. } => self.shared_file(&metadata.key),
                _ => None,
            };
            result.push(TransferCursor::Replay(message.to_action()));
            if let Some(file) = file {
                result.push(TransferCursor::file(file));
            }
        }
        result
    }

    /// Puts cursors for everyone on the outbound path: actions directly, large objects into the
    ///  broadcast queue
    pub fn push_to_all(&mut self, cursors: Vec<TransferCursor>, buffer: &PendingActionBuffer) {
        for cursor in cursors {
            match cursor {
                TransferCursor::Replay(action) => self.push_all(action, buffer),
                TransferCursor::File { file, .. } => self.transfers.add_broadcast(file),
            }
        }
    }

    /// Sends an action to everyone. Peers that are still catching up get it queued behind
    ///  their catch-up instead, so it can not overtake the history it refers to.
    pub fn push_all(&mut self, action: Action, buffer: &PendingActionBuffer) {
        let held = self.transfers.pending_peers();
        if held.is_empty() {
            buffer.push(Outbound::All(action));
            return;
        }

        for peer in &held {
            self.transfers.add_for(*peer, TransferCursor::Replay(action.clone()));
        }
        buffer.push(Outbound::AllBut(held, action));
    }

    /// Moves the transfer queues forward by one step: one broadcast packet, and for every peer
    ///  that is catching up, replayed actions up to and including the next packet
    pub fn flush_transfers(&mut self, buffer: &PendingActionBuffer) {
        if let Some(action) = self.transfers.next_broadcast_part() {
            self.push_all(action, buffer);
        }

        for peer in self.transfers.pending_peers() {
            for _ in 0..self.config.max_catch_up_parts_per_tick {
                match self.transfers.next_part_for(peer) {
                    Some(action) => {
                        let is_packet = action.kind == ActionKind::FileData;
                        buffer.push(Outbound::Peer(peer, action));
                        if is_packet {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::chat::image_store::{MemoryImageStore, MockImageStore};
    use crate::chat::large_file::PACKET_SIZE;
    use crate::chat::message::MessageLog;
    use super::*;

    fn context(user_id: u64) -> ChatContext {
        ChatContext::new(ChatConfig::new(), LocalProfile::new(user_id, "me"), Box::new(MessageLog::new()), Box::new(MemoryImageStore::new())).unwrap()
    }

    fn metadata(key: &str, width: i32, height: i32, total_size: u64) -> ImageMetadata {
        ImageMetadata {
            key: key.to_string(),
            file_type: "png".to_string(),
            width,
            height,
            total_size,
        }
    }

    #[rstest]
    #[case::smallest(16, 16, 100, true)]
    #[case::largest(256, 256, 0x40000, true)]
    #[case::narrow(15, 64, 100, false)]
    #[case::flat(64, 15, 100, false)]
    #[case::wide(257, 64, 100, false)]
    #[case::tall(64, 257, 100, false)]
    #[case::too_big(64, 64, 0x40001, false)]
    fn test_validate_icon(#[case] width: i32, #[case] height: i32, #[case] size: u64, #[case] valid: bool) {
        assert_eq!(context(1).validate_icon(&metadata("k", width, height, size)).is_ok(), valid);
    }

    #[test]
    fn test_truncate_text() {
        let mut ctx = context(1);
        ctx.config.max_text_len = 5;
        assert_eq!(ctx.truncate_text("abc"), "abc");
        assert_eq!(ctx.truncate_text("abcdefg"), "abcde");
        assert_eq!(ctx.truncate_text("abcdä"), "abcd");
    }

    #[test]
    fn test_file_data_requires_metadata() {
        let mut ctx = context(1);
        let payload = FileDataPayload { key: "x".to_string(), packet_index: 0, packet: Bytes::from_static(b"abc") };
        assert!(ctx.accept_file_data(&payload).is_err());
    }

    #[test]
    fn test_chunked_image_is_loaded_on_completion() {
        let mut images = MockImageStore::new();
        images.expect_get_or_create()
            .withf(|key| key == "img")
            .times(1)
            .return_const(ImageHandle(9));
        images.expect_load()
            .withf(|handle, metadata, data| *handle == ImageHandle(9) && metadata.key == "img" && data.len() == PACKET_SIZE + 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut ctx = ChatContext::new(ChatConfig::new(), LocalProfile::new(1, "me"), Box::new(MessageLog::new()), Box::new(images)).unwrap();
        let (handle, started) = ctx.register_image(&metadata("img", 20, 20, PACKET_SIZE as u64 + 1), None).unwrap();
        assert_eq!(handle, ImageHandle(9));
        assert!(started);

        let second = FileDataPayload { key: "img".to_string(), packet_index: 1, packet: Bytes::from_static(b"z") };
        assert!(ctx.accept_file_data(&second).unwrap());
        assert!(!ctx.accept_file_data(&second).unwrap());
        assert!(!ctx.file("img").unwrap().is_complete());

        let first = FileDataPayload { key: "img".to_string(), packet_index: 0, packet: Bytes::from(vec![7u8; PACKET_SIZE]) };
        assert!(ctx.accept_file_data(&first).unwrap());
        assert!(ctx.file("img").unwrap().is_complete());
        assert_eq!(ctx.file("img").unwrap().data()[PACKET_SIZE], b'z');
    }

    #[test]
    fn test_register_existing_complete_image() {
        let mut ctx = context(1);
        let (metadata, _) = ctx.add_local_image(&ImageData {
            name: "cat.png".to_string(),
            file_type: "png".to_string(),
            width: 20,
            height: 20,
            data: vec![1, 2, 3],
        });
        assert_eq!(metadata.key, "0000000000000001/0-cat.png");

        let (_, started) = ctx.register_image(&metadata, None).unwrap();
        assert!(!started);
        assert!(ctx.file(&metadata.key).unwrap().is_complete());
    }

    #[test]
    fn test_known_key_is_never_replaced() {
        let mut ctx = context(1);
        let (metadata, _) = ctx.add_local_image(&ImageData {
            name: "cat.png".to_string(),
            file_type: "png".to_string(),
            width: 20,
            height: 20,
            data: vec![1, 2, 3],
        });

        let bigger = ImageMetadata { total_size: 1000, ..metadata.clone() };
        assert!(ctx.register_image(&bigger, None).is_err());
        let other_type = ImageMetadata { file_type: "gif".to_string(), ..metadata.clone() };
        assert!(ctx.register_image(&other_type, Some(Bytes::from_static(b"xyz"))).is_err());

        let file = ctx.file(&metadata.key).unwrap();
        assert!(file.is_complete());
        assert_eq!(file.data(), &[1u8, 2, 3]);
    }

    #[test]
    fn test_inline_data_must_match_announced_size() {
        let mut ctx = context(1);
        let payload = UserIconPayload { user_id: 2, image: metadata("0000000000000002/icon", 16, 16, 3), inline_data: Some(Bytes::from(vec![0u8; 5000])) };
        assert!(ctx.apply_icon(&payload).is_err());
        assert!(ctx.file("0000000000000002/icon").is_none());
    }

    #[rstest]
    #[case::own("000000000000002a/0-cat.png", 42, true)]
    #[case::other_user("000000000000002b/0-cat.png", 42, false)]
    #[case::no_separator("000000000000002a", 42, false)]
    #[case::no_prefix("cat.png", 42, false)]
    fn test_check_key_owner(#[case] key: &str, #[case] user_id: u64, #[case] owned: bool) {
        assert_eq!(check_key_owner(key, user_id).is_ok(), owned);
    }

    #[test]
    fn test_image_with_foreign_key_is_rejected() {
        let mut ctx = context(1);
        let payload = ImageMessagePayload { timestamp: 1, user_id: 2, message_id: 0, image: metadata("0000000000000003/0-x.png", 20, 20, 10), inline_data: None };
        assert!(ctx.apply_image_message(payload).is_err());
        assert!(ctx.messages.all_messages().is_empty());
        assert!(ctx.file("0000000000000003/0-x.png").is_none());
    }

    #[test]
    fn test_push_all_holds_back_for_catching_up_peers() {
        let mut ctx = context(1);
        let buffer = PendingActionBuffer::default();
        let old = Action::new(ActionKind::MessageText, b"old".to_vec());
        let new = Action::new(ActionKind::MessageText, b"new".to_vec());

        ctx.push_all(Action::ping(), &buffer);
        ctx.transfers.add_for(5, TransferCursor::Replay(old.clone()));
        ctx.push_all(new.clone(), &buffer);

        buffer.publish();
        assert_eq!(buffer.take_outbound().unwrap(), vec![Outbound::All(Action::ping()), Outbound::AllBut(vec![5], new.clone())]);
        assert_eq!(ctx.transfers.next_part_for(5), Some(old));
        assert_eq!(ctx.transfers.next_part_for(5), Some(new));
        assert!(!ctx.transfers.has_pending_for(5));
    }

    #[test]
    fn test_catch_up_includes_partial_image() {
        let mut ctx = context(1);
        let image = metadata("0000000000000002/0-big.png", 20, 20, 2 * PACKET_SIZE as u64);
        ctx.apply_image_message(ImageMessagePayload { timestamp: 1, user_id: 2, message_id: 0, image: image.clone(), inline_data: None }).unwrap();
        ctx.accept_file_data(&FileDataPayload { key: image.key.clone(), packet_index: 1, packet: Bytes::from(vec![3u8; PACKET_SIZE]) }).unwrap();

        let mut manager = FileDataManager::new();
        for cursor in ctx.catch_up_cursors() {
            manager.add_for(7, cursor);
        }
        let mut parts = Vec::new();
        while let Some(action) = manager.next_part_for(7) {
            let packet = match action.kind {
                ActionKind::FileData => Some(action.decode_payload::<FileDataPayload>().unwrap().packet_index),
                _ => None,
            };
            parts.push((action.kind, packet));
        }
        assert_eq!(parts[parts.len() - 2..], [(ActionKind::MessageImage, None), (ActionKind::FileData, Some(1))]);
    }

    #[test]
    fn test_rejected_icon_leaves_user_unchanged() {
        let mut ctx = context(1);
        let payload = UserIconPayload { user_id: 2, image: metadata("0000000000000002/big", 512, 512, 100), inline_data: None };
        assert!(ctx.apply_icon(&payload).is_err());
        assert!(ctx.users.get(2).is_none());
        assert!(ctx.file("0000000000000002/big").is_none());
    }

    #[test]
    fn test_inline_icon() {
        let mut ctx = context(1);
        let payload = UserIconPayload { user_id: 2, image: metadata("0000000000000002/icon", 16, 16, 3), inline_data: Some(Bytes::from_static(b"abc")) };
        ctx.apply_icon(&payload).unwrap();
        let handle = ctx.users.get(2).unwrap().icon.unwrap();
        assert!(ctx.images.is_loaded(handle));
    }

    #[test]
    fn test_catch_up_cursors() {
        let mut ctx = context(1);
        ctx.set_local_icon(&ImageData {
            name: "me.png".to_string(),
            file_type: "png".to_string(),
            width: 32,
            height: 32,
            data: vec![5u8; 40_000],
        }).unwrap();
        ctx.apply_name(&UserNamePayload { user_id: 2, name: "bob".to_string() });
        ctx.receive_message(ChatMessage { message_id: 0, sender: 2, timestamp: 5, content: ChatMessageContent::Text("hi".to_string()) });

        let mut manager = FileDataManager::new();
        for cursor in ctx.catch_up_cursors() {
            manager.add_for(7, cursor);
        }
        let mut kinds = Vec::new();
        while let Some(action) = manager.next_part_for(7) {
            kinds.push(action.kind);
        }
        assert_eq!(kinds, vec![
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor, ActionKind::UserUpdateIcon,
            ActionKind::FileData, ActionKind::FileData,
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor,
            ActionKind::MessageText,
        ]);
    }
}
