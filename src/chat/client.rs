use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::bail;
use tracing::{debug, info, trace, warn};

use crate::chat::action::{decode_actions, Action, ActionKind};
use crate::chat::chat_config::ChatConfig;
use crate::chat::context::{ChatContext, ImageData, LocalProfile};
use crate::chat::file_transfer::FileDataManager;
use crate::chat::image_store::ImageStore;
use crate::chat::message::MessageStore;
use crate::chat::payloads::{ConnectionNotice, ImageMessagePayload, TextMessagePayload, UserColorPayload, UserIconPayload, UserNamePayload};
use crate::chat::session::{actions_of, frame_actions, spawn_session_thread, Outbound, SessionEvent, SessionRole, SessionShared};
use crate::chat::user::Color;
use crate::net::config::CHAT_CHANNEL;
use crate::net::event::{ConnectionOutcome, DisconnectReason, InboundEvent};
use crate::net::udp_client::UdpClient;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClientState {
    Disconnected,
    WaitingConnection,
    Connected,
    ConnectionLost(String),
}

/// The networking thread's view of the connection to the server
struct ClientRole {
    server: Option<SocketAddr>,
    connected: bool,
}

impl ClientRole {
    fn lost(&mut self, reason: &str, inbound: &mut Vec<SessionEvent>) {
        self.server = None;
        self.connected = false;
        inbound.push(SessionEvent::ConnectionLost { reason: reason.to_string() });
    }
}

impl SessionRole for ClientRole {
    fn send_batch(&mut self, udp: &UdpClient, batch: Vec<Outbound>) {
        match self.server {
            Some(server) if self.connected => udp.send_to(server, frame_actions(&actions_of(batch)), CHAT_CHANNEL),
            _ => trace!("not connected - dropping {} outbound actions", batch.len()),
        }
    }

    fn on_event(&mut self, udp: &UdpClient, event: InboundEvent, inbound: &mut Vec<SessionEvent>) {
        match event {
            InboundEvent::IncomingConnection { from, .. } => {
                debug!("refusing incoming connection from {:?}", from);
                udp.disconnect(from);
            }
            InboundEvent::ConnectionResult { from, outcome, .. } => {
                if self.server != Some(from) {
                    debug!("connection result for {:?} which is not the server - ignoring", from);
                    return;
                }
                match outcome {
                    ConnectionOutcome::Success => {
                        self.connected = true;
                        inbound.push(SessionEvent::Connected);
                    }
                    ConnectionOutcome::Refused => self.lost("connection refused by the server", inbound),
                    ConnectionOutcome::TimedOut => self.lost("connection attempt timed out", inbound),
                    ConnectionOutcome::Failed => self.lost("connection failed", inbound),
                }
            }
            InboundEvent::UserData { from, from_id, data, .. } => {
                if self.server != Some(from) || !self.connected {
                    debug!("data from {:?} which is not the server - ignoring", from);
                    return;
                }
                inbound.extend(decode_actions(&data).into_iter()
                    .map(|action| SessionEvent::Action { origin: from_id, action }));
            }
            InboundEvent::Disconnection { from, reason, .. } => {
                if self.server != Some(from) {
                    return;
                }
                match reason {
                    DisconnectReason::Timeout => self.lost("lost connection to the server (timeout)", inbound),
                    DisconnectReason::Closed => self.lost("the server closed the connection", inbound),
                }
            }
        }
    }

    fn on_connect_requested(&mut self, udp: &UdpClient, addr: SocketAddr) {
        if let Some(previous) = self.server.take() {
            udp.disconnect(previous);
        }
        info!("connecting to server at {:?}", addr);
        self.server = Some(addr);
        self.connected = false;
        udp.connect(addr);
    }
}

/// A chat participant talking to one server.
///
/// The network runs on a background thread; all state visible to the application changes only
///  in [ChatClient::update], which is meant to be called once per frame.
pub struct ChatClient {
    context: ChatContext,
    state: ClientState,
    last_error: String,
    local_addr: Option<SocketAddr>,
    shared: Arc<SessionShared>,
    thread: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// binds an ephemeral UDP port and starts the networking thread
    pub fn start(config: ChatConfig, profile: LocalProfile, messages: Box<dyn MessageStore>, images: Box<dyn ImageStore>) -> anyhow::Result<ChatClient> {
        config.validate()?;

        let mut udp = UdpClient::new(config.udp.clone())?;
        udp.init(0)?;
        let local_addr = udp.local_addr();

        let tick_interval = config.tick_interval;
        let context = ChatContext::new(config, profile, messages, images)?;

        let shared = Arc::new(SessionShared::default());
        let role = ClientRole { server: None, connected: false };
        let thread = spawn_session_thread("chat-client", udp, shared.clone(), tick_interval, role)?;

        Ok(ChatClient {
            context,
            state: ClientState::Disconnected,
            last_error: String::new(),
            local_addr,
            shared,
            thread: Some(thread),
        })
    }

    pub fn connect(&mut self, server: SocketAddr) -> anyhow::Result<()> {
        if self.state != ClientState::Disconnected {
            bail!("can only connect while disconnected, current state is {:?}", self.state);
        }
        self.state = ClientState::WaitingConnection;
        self.shared.request_connect(server);
        Ok(())
    }

    /// leaves [ClientState::ConnectionLost] so that a new connection can be attempted
    pub fn reset_state(&mut self) {
        if let ClientState::ConnectionLost(_) = self.state {
            self.state = ClientState::Disconnected;
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// a human readable description of the last connection problem, empty if there was none
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn context(&self) -> &ChatContext {
        &self.context
    }

    pub fn self_id(&self) -> u64 {
        self.context.self_id
    }

    /// Applies everything the networking thread received since the last call, and hands the
    ///  actions queued since then to the networking thread. Does nothing while the networking
    ///  thread is still busy with the previous batch.
    pub fn update(&mut self) {
        let events = match self.shared.buffer.take_inbound() {
            Some(events) => events,
            None => return,
        };

        for event in events {
            self.on_session_event(event);
        }

        if self.state == ClientState::Connected {
            self.context.flush_transfers(&self.shared.buffer);
        }
        self.shared.buffer.publish();
    }

    pub fn send_text(&mut self, text: &str) {
        let text = self.context.truncate_text(text);
        self.push(Action::from_payload(ActionKind::MessageText, &TextMessagePayload {
            timestamp: 0,
            user_id: self.context.self_id,
            message_id: 0,
            text,
        }));
    }

    /// the image shows up in the message store once the server echoes it back
    pub fn send_image(&mut self, image: &ImageData) -> anyhow::Result<()> {
        self.context.validate_image(&image.metadata(&image.name))?;
        let (metadata, file) = self.context.add_local_image(image);

        self.push(Action::from_payload(ActionKind::MessageImage, &ImageMessagePayload {
            timestamp: 0,
            user_id: self.context.self_id,
            message_id: 0,
            image: metadata,
            inline_data: None,
        }));
        self.context.transfers.add_broadcast(file);
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        self.context.self_user().name = name.to_string();
        if self.state == ClientState::Connected {
            self.push(Action::from_payload(ActionKind::UserUpdateName, &UserNamePayload {
                user_id: self.context.self_id,
                name: name.to_string(),
            }));
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.context.self_user().color = color;
        if self.state == ClientState::Connected {
            self.push(Action::from_payload(ActionKind::UserUpdateColor, &UserColorPayload {
                user_id: self.context.self_id,
                color,
            }));
        }
    }

    pub fn set_icon(&mut self, icon: &ImageData) -> anyhow::Result<()> {
        let (action, file) = self.context.set_local_icon(icon)?;
        if self.state == ClientState::Connected {
            self.push(action);
            self.context.transfers.add_broadcast(file);
        }
        Ok(())
    }

    fn push(&self, action: Action) {
        self.shared.buffer.push(Outbound::All(action));
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                if self.state == ClientState::WaitingConnection {
                    info!("connected to the server");
                    self.state = ClientState::Connected;
                    self.bootstrap();
                }
            }
            SessionEvent::ConnectionLost { reason } => {
                if matches!(self.state, ClientState::WaitingConnection | ClientState::Connected) {
                    warn!("{}", reason);
                    self.context.transfers = FileDataManager::new();
                    self.last_error = reason.clone();
                    self.state = ClientState::ConnectionLost(reason);
                }
            }
            SessionEvent::Action { action, .. } => {
                let kind = action.kind;
                if let Err(e) = self.dispatch(action) {
                    warn!("rejected {:?} action: {}", kind, e);
                }
            }
            SessionEvent::PeerJoined { .. } | SessionEvent::PeerLost { .. } => {}
        }
    }

    /// tells the server who we are: name, color and icon followed by the icon's bytes
    fn bootstrap(&mut self) {
        let cursors = match self.context.users.get(self.context.self_id) {
            Some(user) => self.context.profile_cursors(user),
            None => return,
        };
        self.context.push_to_all(cursors, &self.shared.buffer);
    }

    fn reject_self_update(&self, user_id: u64) -> anyhow::Result<()> {
        if user_id == self.context.self_id {
            bail!("ignoring an update of the local user's profile");
        }
        Ok(())
    }

    fn dispatch(&mut self, action: Action) -> anyhow::Result<()> {
        match action.kind {
            ActionKind::Ping => {}
            ActionKind::UserConnect | ActionKind::UserDisconnect => {
                let notice = action.decode_payload::<ConnectionNotice>()?;
                self.context.apply_connection_notice(&notice, action.kind == ActionKind::UserConnect);
            }
            ActionKind::MessageText => {
                self.context.apply_text(action.decode_payload::<TextMessagePayload>()?);
            }
            ActionKind::MessageImage => {
                self.context.apply_image_message(action.decode_payload::<ImageMessagePayload>()?)?;
            }
            ActionKind::UserUpdateName => {
                let payload = action.decode_payload::<UserNamePayload>()?;
                self.reject_self_update(payload.user_id)?;
                self.context.apply_name(&payload);
            }
            ActionKind::UserUpdateColor => {
                let payload = action.decode_payload::<UserColorPayload>()?;
                self.reject_self_update(payload.user_id)?;
                self.context.apply_color(&payload);
            }
            ActionKind::UserUpdateIcon => {
                let payload = action.decode_payload::<UserIconPayload>()?;
                self.reject_self_update(payload.user_id)?;
                self.context.apply_icon(&payload)?;
            }
            ActionKind::FileData => {
                self.context.accept_file_data(&action.decode_payload()?)?;
            }
        }
        Ok(())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.shared.request_shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("client session thread panicked");
            }
        }
    }
}
