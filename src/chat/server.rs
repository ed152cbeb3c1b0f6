use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::chat::action::{decode_actions, Action, ActionKind};
use crate::chat::chat_config::ChatConfig;
use crate::chat::context::{check_key_owner, ChatContext, ImageData, LocalProfile};
use crate::chat::image_store::ImageStore;
use crate::chat::message::MessageStore;
use crate::chat::payloads::{ConnectionNotice, FileDataPayload, ImageMessagePayload, TextMessagePayload, UserColorPayload, UserIconPayload, UserNamePayload};
use crate::chat::session::{frame_actions, spawn_session_thread, Outbound, SessionEvent, SessionRole, SessionShared};
use crate::chat::user::{Color, UNKNOWN_USER_ID};
use crate::net::config::CHAT_CHANNEL;
use crate::net::event::InboundEvent;
use crate::net::udp_client::UdpClient;
use crate::util::time::unix_timestamp;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ServerState {
    Disconnected,
    Connected,
}

struct ServerRole;

impl SessionRole for ServerRole {
    fn send_batch(&mut self, udp: &UdpClient, batch: Vec<Outbound>) {
        let mut to_all = Vec::new();
        let mut per_peer: BTreeMap<u64, Vec<Action>> = BTreeMap::new();
        for outbound in batch {
            match outbound {
                Outbound::All(action) => to_all.push((Vec::new(), action)),
                Outbound::AllBut(excluded, action) => to_all.push((excluded, action)),
                Outbound::Peer(network_id, action) => per_peer.entry(network_id).or_default().push(action),
            }
        }

        // catch-up first: it carries the metadata that broadcast packets may refer to
        for (network_id, actions) in per_peer {
            match udp.address_of(network_id) {
                Some(addr) => udp.send_to(addr, frame_actions(&actions), CHAT_CHANNEL),
                None => debug!("peer {} is gone - dropping {} actions", network_id, actions.len()),
            }
        }

        if to_all.iter().all(|(excluded, _)| excluded.is_empty()) {
            if !to_all.is_empty() {
                let actions = to_all.into_iter().map(|(_, a)| a).collect::<Vec<_>>();
                udp.broadcast(frame_actions(&actions), CHAT_CHANNEL);
            }
            return;
        }
        for (network_id, addr) in udp.connected_peers() {
            let actions = broadcast_share(&to_all, network_id);
            if !actions.is_empty() {
                udp.send_to(addr, frame_actions(&actions), CHAT_CHANNEL);
            }
        }
    }

    fn on_event(&mut self, udp: &UdpClient, event: InboundEvent, inbound: &mut Vec<SessionEvent>) {
        match event {
            InboundEvent::IncomingConnection { from, from_id } => {
                info!("accepting peer {} from {:?}", from_id, from);
                udp.connect(from);
                inbound.push(SessionEvent::PeerJoined { network_id: from_id, address: from });
            }
            InboundEvent::ConnectionResult { from, outcome, .. } => {
                debug!("unexpected connection result {:?} for {:?} - ignoring", outcome, from);
            }
            InboundEvent::UserData { from_id, data, .. } => {
                inbound.extend(decode_actions(&data).into_iter()
                    .map(|action| SessionEvent::Action { origin: from_id, action }));
            }
            InboundEvent::Disconnection { from, from_id, reason } => {
                info!("peer {} at {:?} disconnected: {:?}", from_id, from, reason);
                inbound.push(SessionEvent::PeerLost { network_id: from_id });
            }
        }
    }
}

/// the broadcast actions a peer gets, in push order
fn broadcast_share(to_all: &[(Vec<u64>, Action)], network_id: u64) -> Vec<Action> {
    to_all.iter()
        .filter(|(excluded, _)| !excluded.contains(&network_id))
        .map(|(_, action)| action.clone())
        .collect()
}

/// The authority of a chat: relays profile updates and large objects, and assigns timestamps and
///  ids to messages.
///
/// A peer is known by its network id only until its first name update, which binds it to the
///  user id it claims. Everything else it sends requires that binding.
pub struct ChatServer {
    context: ChatContext,
    state: ServerState,
    local_addr: Option<SocketAddr>,
    /// peers that connected but did not introduce themselves yet
    joining: FxHashMap<u64, SocketAddr>,
    next_message_id: u64,
    next_notice_id: u64,
    shared: Arc<SessionShared>,
    thread: Option<JoinHandle<()>>,
}

impl ChatServer {
    pub fn new(config: ChatConfig, profile: LocalProfile, messages: Box<dyn MessageStore>, images: Box<dyn ImageStore>) -> anyhow::Result<ChatServer> {
        config.validate()?;

        Ok(ChatServer {
            context: ChatContext::new(config, profile, messages, images)?,
            state: ServerState::Disconnected,
            local_addr: None,
            joining: FxHashMap::default(),
            next_message_id: 0,
            next_notice_id: 0,
            shared: Arc::new(SessionShared::default()),
            thread: None,
        })
    }

    /// binds the given port on all IPV4 interfaces and starts the networking thread
    pub fn host(&mut self, port: u16) -> anyhow::Result<SocketAddr> {
        self.host_on(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn host_on(&mut self, addr: SocketAddr) -> anyhow::Result<SocketAddr> {
        if self.state == ServerState::Connected {
            bail!("server is already running on {:?}", self.local_addr);
        }

        let mut udp = UdpClient::new(self.context.config.udp.clone())?;
        udp.init_with_addr(addr)?;
        let local_addr = udp.local_addr()
            .ok_or_else(|| anyhow!("socket has no local address"))?;

        let thread = spawn_session_thread("chat-server", udp, self.shared.clone(), self.context.config.tick_interval, ServerRole)?;
        info!("hosting chat on {:?}", local_addr);

        self.thread = Some(thread);
        self.local_addr = Some(local_addr);
        self.state = ServerState::Connected;
        Ok(local_addr)
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    /// applies what the networking thread received and hands it the next outbound batch
    pub fn update(&mut self) {
        let events = match self.shared.buffer.take_inbound() {
            Some(events) => events,
            None => return,
        };

        for event in events {
            self.on_session_event(event);
        }

        self.context.flush_transfers(&self.shared.buffer);
        self.shared.buffer.publish();
    }

    pub fn send_text(&mut self, text: &str) {
        let text = self.context.truncate_text(text);
        self.publish_text(self.context.self_id, text);
    }

    pub fn send_image(&mut self, image: &ImageData) -> anyhow::Result<()> {
        self.context.validate_image(&image.metadata(&image.name))?;
        let (metadata, _) = self.context.add_local_image(image);
        self.publish_image(ImageMessagePayload {
            timestamp: 0,
            user_id: self.context.self_id,
            message_id: 0,
            image: metadata,
            inline_data: None,
        })
    }

    pub fn set_name(&mut self, name: &str) {
        let payload = UserNamePayload { user_id: self.context.self_id, name: name.to_string() };
        self.context.apply_name(&payload);
        self.push(Action::from_payload(ActionKind::UserUpdateName, &payload));
    }

    pub fn set_color(&mut self, color: Color) {
        let payload = UserColorPayload { user_id: self.context.self_id, color };
        self.context.apply_color(&payload);
        self.push(Action::from_payload(ActionKind::UserUpdateColor, &payload));
    }

    pub fn set_icon(&mut self, icon: &ImageData) -> anyhow::Result<()> {
        let (action, file) = self.context.set_local_icon(icon)?;
        self.push(action);
        self.context.transfers.add_broadcast(file);
        Ok(())
    }

    fn push(&mut self, action: Action) {
        self.context.push_all(action, &self.shared.buffer);
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PeerJoined { network_id, address } => {
                self.joining.insert(network_id, address);
                let cursors = self.context.catch_up_cursors();
                debug!("sending {} catch-up parts to peer {}", cursors.len(), network_id);
                for cursor in cursors {
                    self.context.transfers.add_for(network_id, cursor);
                }
            }
            SessionEvent::PeerLost { network_id } => self.on_peer_lost(network_id),
            SessionEvent::Action { origin, action } => {
                let kind = action.kind;
                if let Err(e) = self.dispatch(origin, action) {
                    warn!("rejected {:?} action from peer {}: {}", kind, origin, e);
                }
            }
            SessionEvent::Connected | SessionEvent::ConnectionLost { .. } => {}
        }
    }

    fn on_peer_lost(&mut self, network_id: u64) {
        self.context.transfers.drop_peer(network_id);
        self.joining.remove(&network_id);

        let user_id = match self.context.users.get_by_network_id(network_id) {
            Some(user) => {
                user.network_id = None;
                user.address = None;
                user.user_id
            }
            None => return,
        };
        self.announce_connection(user_id, false);
    }

    fn announce_connection(&mut self, user_id: u64, connected: bool) {
        let notice = ConnectionNotice {
            timestamp: unix_timestamp(),
            user_id,
            message_id: self.next_notice_id,
        };
        self.next_notice_id += 1;

        self.context.apply_connection_notice(&notice, connected);
        self.push(notice.to_action(connected));
    }

    /// the user a peer is bound to
    fn sender_of(&mut self, origin: u64) -> anyhow::Result<u64> {
        self.context.users.get_by_network_id(origin)
            .map(|u| u.user_id)
            .ok_or_else(|| anyhow!("peer {} did not introduce itself yet", origin))
    }

    /// Checks that a peer may update the profile of the user it claims to be. A peer that is
    ///  not bound yet becomes bound if `may_bind` is set; returns `true` in that case.
    fn check_identity(&mut self, origin: u64, claimed: u64, may_bind: bool) -> anyhow::Result<bool> {
        if claimed == UNKNOWN_USER_ID || claimed == self.context.self_id {
            bail!("peer {} claims reserved user id {}", origin, claimed);
        }

        if let Some(bound) = self.context.users.get_by_network_id(origin) {
            if bound.user_id != claimed {
                bail!("peer {} is user {} and can not update user {}", origin, bound.user_id, claimed);
            }
            return Ok(false);
        }

        if !may_bind {
            bail!("peer {} did not introduce itself yet", origin);
        }
        let address = self.joining.remove(&origin)
            .ok_or_else(|| anyhow!("unknown peer {}", origin))?;

        let user = self.context.users.get_or_create(claimed);
        if let Some(previous) = user.network_id {
            info!("user {} reconnected as peer {}, replacing peer {}", claimed, origin, previous);
        }
        user.network_id = Some(origin);
        user.address = Some(address);
        Ok(true)
    }

    fn dispatch(&mut self, origin: u64, action: Action) -> anyhow::Result<()> {
        match action.kind {
            ActionKind::Ping => {}
            ActionKind::UserConnect | ActionKind::UserDisconnect => {
                bail!("connection notices are issued by the server only");
            }
            ActionKind::UserUpdateName => {
                let payload = action.decode_payload::<UserNamePayload>()?;
                let newly_bound = self.check_identity(origin, payload.user_id, true)?;
                self.context.apply_name(&payload);
                self.push(action);
                if newly_bound {
                    self.announce_connection(payload.user_id, true);
                }
            }
            ActionKind::UserUpdateColor => {
                let payload = action.decode_payload::<UserColorPayload>()?;
                self.check_identity(origin, payload.user_id, false)?;
                self.context.apply_color(&payload);
                self.push(action);
            }
            ActionKind::UserUpdateIcon => {
                let payload = action.decode_payload::<UserIconPayload>()?;
                self.check_identity(origin, payload.user_id, false)?;
                self.context.apply_icon(&payload)?;

                let has_inline_data = payload.inline_data.is_some();
                let key = payload.image.key.clone();
                self.push(Action::from_payload(ActionKind::UserUpdateIcon, &UserIconPayload {
                    inline_data: None,
                    ..payload
                }));
                if has_inline_data {
                    self.relay_complete_file(&key);
                }
            }
            ActionKind::MessageText => {
                let payload = action.decode_payload::<TextMessagePayload>()?;
                let sender = self.sender_of(origin)?;
                let text = self.context.truncate_text(&payload.text);
                self.publish_text(sender, text);
            }
            ActionKind::MessageImage => {
                let payload = action.decode_payload::<ImageMessagePayload>()?;
                let sender = self.sender_of(origin)?;
                self.publish_image(ImageMessagePayload {
                    user_id: sender,
                    ..payload
                })?;
            }
            ActionKind::FileData => {
                let payload = action.decode_payload::<FileDataPayload>()?;
                let sender = self.sender_of(origin)?;
                check_key_owner(&payload.key, sender)?;
                if self.context.accept_file_data(&payload)? {
                    self.push(action);
                }
            }
        }
        Ok(())
    }

    fn relay_complete_file(&mut self, key: &str) {
        if let Some(file) = self.context.shared_file(key).filter(|f| f.is_complete()) {
            self.context.transfers.add_broadcast(file);
        }
    }

    fn publish_text(&mut self, sender: u64, text: String) {
        let stamped = TextMessagePayload {
            timestamp: unix_timestamp(),
            user_id: sender,
            message_id: self.next_message_id,
            text,
        };
        self.next_message_id += 1;

        self.push(Action::from_payload(ActionKind::MessageText, &stamped));
        self.context.apply_text(stamped);
    }

    /// stamps the image message, and broadcasts it if its image is acceptable
    fn publish_image(&mut self, payload: ImageMessagePayload) -> anyhow::Result<()> {
        let has_inline_data = payload.inline_data.is_some();
        let key = payload.image.key.clone();
        let stamped = ImageMessagePayload {
            timestamp: unix_timestamp(),
            message_id: self.next_message_id,
            ..payload
        };
        self.context.apply_image_message(stamped.clone())?;
        self.next_message_id += 1;

        self.push(Action::from_payload(ActionKind::MessageImage, &ImageMessagePayload {
            inline_data: None,
            ..stamped
        }));
        if has_inline_data || check_key_owner(&key, self.context.self_id).is_ok() {
            self.relay_complete_file(&key);
        }
        Ok(())
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.shared.request_shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("server session thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bytes::Bytes;

    use crate::chat::image_store::MemoryImageStore;
    use crate::chat::large_file::PACKET_SIZE;
    use crate::chat::message::{ChatMessageContent, MessageLog};
    use crate::chat::payloads::ImageMetadata;
    use super::*;

    const HOST: u64 = 1000;

    fn server() -> ChatServer {
        ChatServer::new(ChatConfig::new(), LocalProfile::new(HOST, "host"), Box::new(MessageLog::new()), Box::new(MemoryImageStore::new())).unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from_str(&format!("127.0.0.1:{}", port)).unwrap()
    }

    /// connects and binds a peer, and runs its catch-up to the end
    fn join(server: &mut ChatServer, network_id: u64, user_id: u64, name: &str) {
        server.on_session_event(SessionEvent::PeerJoined { network_id, address: addr(5000 + network_id as u16) });
        server.dispatch(network_id, Action::from_payload(ActionKind::UserUpdateName, &UserNamePayload { user_id, name: name.to_string() })).unwrap();
        finish_catch_up(server, network_id);
    }

    fn finish_catch_up(server: &mut ChatServer, network_id: u64) {
        while server.context.transfers.has_pending_for(network_id) {
            server.context.flush_transfers(&server.shared.buffer);
        }
    }

    fn image_message(user_id: u64, image: ImageMetadata) -> Action {
        Action::from_payload(ActionKind::MessageImage, &ImageMessagePayload { timestamp: 0, user_id, message_id: 0, image, inline_data: None })
    }

    fn file_data(key: &str, packet_index: u32, packet: Vec<u8>) -> Action {
        Action::from_payload(ActionKind::FileData, &FileDataPayload { key: key.to_string(), packet_index, packet: Bytes::from(packet) })
    }

    fn png(key: &str, total_size: u64) -> ImageMetadata {
        ImageMetadata {
            key: key.to_string(),
            file_type: "png".to_string(),
            width: 100,
            height: 100,
            total_size,
        }
    }

    /// everything queued for sending, without the networking thread
    fn drain_outbound(server: &ChatServer) -> Vec<Outbound> {
        server.shared.buffer.publish();
        server.shared.buffer.take_outbound().unwrap()
    }

    fn kinds(outbound: &[Outbound]) -> Vec<ActionKind> {
        outbound.iter()
            .map(|o| match o {
                Outbound::All(a) | Outbound::Peer(_, a) | Outbound::AllBut(_, a) => a.kind,
            })
            .collect()
    }

    fn to_peer(outbound: &[Outbound], network_id: u64) -> Vec<Outbound> {
        outbound.iter()
            .filter(|o| matches!(o, Outbound::Peer(id, _) if *id == network_id))
            .cloned()
            .collect()
    }

    fn without_catch_up(outbound: Vec<Outbound>) -> Vec<Outbound> {
        outbound.into_iter()
            .filter(|o| !matches!(o, Outbound::Peer(..)))
            .collect()
    }

    #[test]
    fn test_first_name_binds_peer() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");

        let user = server.context().users.get(42).unwrap();
        assert_eq!(user.name, "alice");
        assert_eq!(user.network_id, Some(3));
        assert_eq!(user.address, Some(addr(5003)));
        assert!(user.connected);

        assert_eq!(kinds(&without_catch_up(drain_outbound(&server))), vec![ActionKind::UserUpdateName, ActionKind::UserConnect]);
    }

    #[test]
    fn test_unbound_peer_can_only_introduce_itself() {
        let mut server = server();
        server.on_session_event(SessionEvent::PeerJoined { network_id: 3, address: addr(5003) });

        let text = Action::from_payload(ActionKind::MessageText, &TextMessagePayload { timestamp: 0, user_id: 42, message_id: 0, text: "hi".to_string() });
        assert!(server.dispatch(3, text).is_err());
        let color = Action::from_payload(ActionKind::UserUpdateColor, &UserColorPayload { user_id: 42, color: Color::new(1.0, 0.0, 0.0) });
        assert!(server.dispatch(3, color).is_err());
        assert!(server.context().messages.all_messages().is_empty());
    }

    #[test]
    fn test_peer_can_not_update_other_users() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        join(&mut server, 4, 43, "bob");

        let rename = |user_id| Action::from_payload(ActionKind::UserUpdateName, &UserNamePayload { user_id, name: "mallory".to_string() });
        assert!(server.dispatch(4, rename(42)).is_err());
        assert!(server.dispatch(4, rename(HOST)).is_err());
        assert!(server.dispatch(4, rename(UNKNOWN_USER_ID)).is_err());
        assert_eq!(server.context().users.get(42).unwrap().name, "alice");
        assert_eq!(server.context().users.get(HOST).unwrap().name, "host");
    }

    #[test]
    fn test_text_is_stamped_by_the_server() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        for text in ["first", "second"] {
            let action = Action::from_payload(ActionKind::MessageText, &TextMessagePayload { timestamp: 0, user_id: 999, message_id: 77, text: text.to_string() });
            server.dispatch(3, action).unwrap();
        }

        let messages = server.context().messages.all_messages();
        let texts = messages.iter()
            .filter_map(|m| match &m.content {
                ChatMessageContent::Text(t) => Some((m.message_id, m.sender, t.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(texts, vec![(0, 42, "first".to_string()), (1, 42, "second".to_string())]);
        assert!(messages.iter().all(|m| m.timestamp > 0));

        let outbound = drain_outbound(&server);
        let Outbound::All(action) = &outbound[0] else { panic!("expected a broadcast") };
        let payload = action.decode_payload::<TextMessagePayload>().unwrap();
        assert_eq!((payload.user_id, payload.message_id), (42, 0));
    }

    #[test]
    fn test_peer_lost_announces_disconnection() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        server.on_session_event(SessionEvent::PeerLost { network_id: 3 });
        let user = server.context().users.get(42).unwrap();
        assert!(!user.connected);
        assert_eq!(user.network_id, None);

        assert_eq!(kinds(&drain_outbound(&server)), vec![ActionKind::UserDisconnect]);
        let notices = server.context().messages.all_messages().into_iter()
            .map(|m| (m.message_id, m.content))
            .collect::<Vec<_>>();
        assert_eq!(notices, vec![(0, ChatMessageContent::Connection(true)), (1, ChatMessageContent::Connection(false))]);
    }

    #[test]
    fn test_late_joiner_catch_up() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        server.dispatch(3, Action::from_payload(ActionKind::MessageText, &TextMessagePayload { timestamp: 0, user_id: 42, message_id: 0, text: "hi".to_string() })).unwrap();
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        server.on_session_event(SessionEvent::PeerJoined { network_id: 4, address: addr(5004) });
        server.context.flush_transfers(&server.shared.buffer);

        assert_eq!(kinds(&to_peer(&drain_outbound(&server), 4)), vec![
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor,
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor,
            ActionKind::UserConnect, ActionKind::MessageText,
        ]);
    }

    #[test]
    fn test_file_data_is_relayed_once() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        let metadata = png("000000000000002a/0-cat.png", 3);
        server.dispatch(3, image_message(42, metadata.clone())).unwrap();

        let packet = file_data(&metadata.key, 0, b"abc".to_vec());
        server.dispatch(3, packet.clone()).unwrap();
        server.dispatch(3, packet.clone()).unwrap();

        assert!(server.context().file(&metadata.key).unwrap().is_complete());
        let timestamp = server.context().messages.all_messages()[1].timestamp;
        assert_eq!(drain_outbound(&server), vec![
            Outbound::All(Action::from_payload(ActionKind::MessageImage, &ImageMessagePayload {
                timestamp,
                user_id: 42,
                message_id: 0,
                image: metadata,
                inline_data: None,
            })),
            Outbound::All(packet),
        ]);
    }

    #[test]
    fn test_peer_can_not_take_over_foreign_image() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        join(&mut server, 4, 43, "bob");

        let bobs = png("000000000000002b/0-cat.png", 3);
        server.dispatch(4, image_message(43, bobs.clone())).unwrap();
        server.dispatch(4, file_data(&bobs.key, 0, b"abc".to_vec())).unwrap();
        assert!(server.context().file(&bobs.key).unwrap().is_complete());

        let resized = ImageMetadata { total_size: 2 * PACKET_SIZE as u64, ..bobs.clone() };
        assert!(server.dispatch(3, image_message(42, resized.clone())).is_err());
        let icon = UserIconPayload { user_id: 42, image: ImageMetadata { width: 32, height: 32, ..resized }, inline_data: None };
        assert!(server.dispatch(3, Action::from_payload(ActionKind::UserUpdateIcon, &icon)).is_err());
        assert!(server.dispatch(3, file_data(&bobs.key, 0, b"xyz".to_vec())).is_err());

        // not even the owner may change its size
        assert!(server.dispatch(4, image_message(43, png(&bobs.key, 5))).is_err());

        let file = server.context().file(&bobs.key).unwrap();
        assert!(file.is_complete());
        assert_eq!(file.data(), b"abc");
        assert_eq!(server.context().users.get(42).unwrap().icon_key, None);
        assert_eq!(server.context().messages.all_messages().len(), 3);
    }

    #[test]
    fn test_file_data_requires_bound_owner() {
        let mut server = server();
        join(&mut server, 4, 43, "bob");
        let big = png("000000000000002b/0-big.png", 2 * PACKET_SIZE as u64);
        server.dispatch(4, image_message(43, big.clone())).unwrap();

        server.on_session_event(SessionEvent::PeerJoined { network_id: 9, address: addr(5009) });
        assert!(server.dispatch(9, file_data(&big.key, 0, vec![1u8; PACKET_SIZE])).is_err());
        assert!(!server.context().file(&big.key).unwrap().has_packet(0));

        server.dispatch(4, file_data(&big.key, 0, vec![2u8; PACKET_SIZE])).unwrap();
        assert!(server.context().file(&big.key).unwrap().has_packet(0));
    }

    #[test]
    fn test_late_joiner_mid_transfer() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        let metadata = png("000000000000002a/0-cat.png", PACKET_SIZE as u64 + 3);
        server.dispatch(3, image_message(42, metadata.clone())).unwrap();
        server.dispatch(3, file_data(&metadata.key, 0, vec![7u8; PACKET_SIZE])).unwrap();
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        server.on_session_event(SessionEvent::PeerJoined { network_id: 4, address: addr(5004) });
        let last = file_data(&metadata.key, 1, b"end".to_vec());
        server.dispatch(3, last.clone()).unwrap();
        finish_catch_up(&mut server, 4);
        assert!(server.context().file(&metadata.key).unwrap().is_complete());

        let outbound = drain_outbound(&server);
        assert_eq!(without_catch_up(outbound.clone()), vec![Outbound::AllBut(vec![4], last)]);

        let packets = to_peer(&outbound, 4).into_iter()
            .filter_map(|o| match o {
                Outbound::Peer(_, a) if a.kind == ActionKind::FileData => Some(a.decode_payload::<FileDataPayload>().unwrap().packet_index),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(packets, vec![0, 1]);
    }

    #[test]
    fn test_broadcasts_wait_for_catch_up() {
        let mut server = server();
        join(&mut server, 3, 42, "alice");
        drain_outbound(&server);
        server.shared.buffer.hand_back(vec![]);

        server.on_session_event(SessionEvent::PeerJoined { network_id: 4, address: addr(5004) });
        server.dispatch(3, Action::from_payload(ActionKind::MessageText, &TextMessagePayload { timestamp: 0, user_id: 42, message_id: 0, text: "hi".to_string() })).unwrap();
        finish_catch_up(&mut server, 4);

        let outbound = drain_outbound(&server);
        assert!(matches!(&outbound[0], Outbound::AllBut(held, a) if held == &vec![4] && a.kind == ActionKind::MessageText));
        assert_eq!(kinds(&to_peer(&outbound, 4)), vec![
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor,
            ActionKind::UserUpdateName, ActionKind::UserUpdateColor,
            ActionKind::UserConnect, ActionKind::MessageText,
        ]);

        server.shared.buffer.hand_back(vec![]);
        server.send_text("after");
        assert!(matches!(&drain_outbound(&server)[..], [Outbound::All(_)]));
    }

    #[test]
    fn test_host_twice() {
        let mut server = server();
        server.host_on(addr(0)).unwrap();
        assert_eq!(server.state(), ServerState::Connected);
        assert!(server.host_on(addr(0)).is_err());
    }
}
