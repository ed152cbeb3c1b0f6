use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Instant;

use anyhow::anyhow;
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, trace, warn};

use crate::net::config::{UdpConfig, MAX_DATAGRAM_SIZE};
use crate::net::datagram::Datagram;
use crate::net::distant_client::{DistantClient, EndpointPhase};
use crate::net::event::{ConnectionOutcome, DisconnectReason, InboundEvent};
use crate::net::operation::{Operation, OperationQueue};
use crate::net::simulator::Simulator;

/// One UDP socket and the remote endpoints talking to it.
///
/// State changes and sends are queued (see [OperationQueue]) and applied by
///  [UdpClient::process_send]. [UdpClient::receive], [UdpClient::process_send] and
///  [UdpClient::poll] are meant to be called in a loop by a single networking thread.
pub struct UdpClient {
    config: UdpConfig,
    socket: Option<UdpSocket>,
    clients: FxHashMap<SocketAddr, DistantClient>,
    client_ids_generator: u64,
    operations: OperationQueue,
    events: Vec<InboundEvent>,
    simulator: Option<Simulator>,
    receive_buffer: Vec<u8>,
}

impl UdpClient {
    pub fn new(config: UdpConfig) -> anyhow::Result<UdpClient> {
        config.validate()?;

        Ok(UdpClient {
            simulator: config.simulator.clone().map(Simulator::new),
            config,
            socket: None,
            clients: FxHashMap::default(),
            client_ids_generator: 0,
            operations: OperationQueue::default(),
            events: Vec::new(),
            receive_buffer: vec![0u8; MAX_DATAGRAM_SIZE + 1],
        })
    }

    /// binds to the given port on all IPV4 interfaces, 0 for an ephemeral port
    pub fn init(&mut self, port: u16) -> anyhow::Result<()> {
        self.init_with_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn init_with_addr(&mut self, addr: SocketAddr) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(addr)
            .map_err(|e| anyhow!("failed to bind UDP socket to {}: {}", addr, e))?;
        socket.set_nonblocking(true)?;

        info!("bound UDP socket to {:?}", socket.local_addr()?);
        self.socket = Some(socket);
        Ok(())
    }

    /// closes the socket and forgets all remote endpoints without notifying them
    pub fn release(&mut self) {
        self.socket = None;
        self.clients.clear();
        self.operations.drain();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// a handle for queueing operations from other threads
    pub fn operations(&self) -> OperationQueue {
        self.operations.clone()
    }

    pub fn connect(&self, addr: SocketAddr) {
        self.operations.connect(addr);
    }

    pub fn disconnect(&self, addr: SocketAddr) {
        self.operations.disconnect(addr);
    }

    pub fn disconnect_all(&self) {
        self.operations.disconnect_all();
    }

    pub fn send_to(&self, to: SocketAddr, data: Vec<u8>, channel: u8) {
        self.operations.send_to(to, data, channel);
    }

    pub fn broadcast(&self, data: Vec<u8>, channel: u8) {
        self.operations.broadcast(data, channel);
    }

    pub fn address_of(&self, id: u64) -> Option<SocketAddr> {
        self.clients.values()
            .find(|c| c.id == id)
            .map(|c| c.address)
    }

    /// network ids and addresses of all established connections, ordered by id
    pub fn connected_peers(&self) -> Vec<(u64, SocketAddr)> {
        let mut result = self.clients.values()
            .filter(|c| c.is_connected())
            .map(|c| (c.id, c.address))
            .collect::<Vec<_>>();
        result.sort();
        result
    }

    pub fn is_connected_to(&self, addr: &SocketAddr) -> bool {
        self.clients.get(addr)
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }

    pub fn has_unacknowledged_data(&self) -> bool {
        self.clients.values()
            .any(|c| c.has_unacknowledged())
    }

    pub fn set_network_interruption_allowed(&mut self, allowed: bool) {
        self.config.allow_interruption = allowed;
    }

    pub fn is_network_interrupted(&self) -> bool {
        self.clients.values()
            .any(|c| c.interrupted)
    }

    /// Applies queued operations, handles timeouts, and sends everything that is due: connection
    ///  requests, new and re-sent data frames, acks and keep-alives.
    pub fn process_send(&mut self) {
        let now = Instant::now();
        let mut outgoing = Vec::new();

        for operation in self.operations.drain() {
            self.apply(operation, now, &mut outgoing);
        }

        self.check_timeouts(now);

        for client in self.clients.values_mut() {
            match client.phase {
                EndpointPhase::Incoming => {}
                EndpointPhase::Connecting => {
                    let due = client.last_sent
                        .map(|t| now.duration_since(t) >= self.config.resend_interval)
                        .unwrap_or(true);
                    if due {
                        outgoing.push((client.address, Datagram::Connect { session: client.session }));
                        client.last_sent = Some(now);
                    }
                }
                EndpointPhase::Connected => {
                    let mut datagrams = Vec::new();
                    client.poll_outgoing(now, &mut datagrams);

                    if datagrams.is_empty() {
                        let keep_alive_due = client.last_sent
                            .map(|t| now.duration_since(t) >= self.config.keep_alive_interval)
                            .unwrap_or(true);
                        if keep_alive_due {
                            datagrams.push(Datagram::KeepAlive);
                        }
                    }

                    if !datagrams.is_empty() {
                        client.last_sent = Some(now);
                    }
                    outgoing.extend(datagrams.into_iter().map(|d| (client.address, d)));
                }
            }
        }

        for (to, datagram) in outgoing {
            if let Err(e) = self.send_datagram(to, &datagram) {
                warn!("failed to send datagram to {:?}: {}", to, e);
                if matches!(datagram, Datagram::Connect { .. }) {
                    if let Some(client) = self.clients.remove(&to) {
                        self.events.push(InboundEvent::ConnectionResult {
                            from: to,
                            from_id: client.id,
                            outcome: ConnectionOutcome::Failed,
                        });
                    }
                }
            }
        }
    }

    /// reads every datagram that is currently available without blocking
    pub fn receive(&mut self) {
        let socket = match &self.socket {
            Some(s) => s,
            None => return,
        };

        let mut received = Vec::new();
        loop {
            match socket.recv_from(&mut self.receive_buffer) {
                Ok((len, from)) => {
                    if len > MAX_DATAGRAM_SIZE {
                        debug!("received oversized datagram from {:?} - dropping", from);
                        continue;
                    }
                    match Datagram::try_deser(&self.receive_buffer[..len]) {
                        Ok(datagram) => received.push((from, datagram)),
                        Err(e) => debug!("received invalid datagram from {:?} - dropping: {}", from, e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                // ICMP 'port unreachable' for an earlier send, reported on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset || e.kind() == ErrorKind::ConnectionRefused => continue,
                Err(e) => {
                    error!("error receiving UDP datagram: {}", e);
                    break;
                }
            }
        }

        let now = Instant::now();
        let mut replies = Vec::new();
        for (from, datagram) in received {
            self.on_datagram(from, datagram, now, &mut replies);
        }
        for (to, datagram) in replies {
            if let Err(e) = self.send_datagram(to, &datagram) {
                warn!("failed to send datagram to {:?}: {}", to, e);
            }
        }
    }

    /// returns the events accumulated since the last call
    pub fn poll(&mut self) -> Vec<InboundEvent> {
        std::mem::take(&mut self.events)
    }

    fn next_client_id(&mut self) -> u64 {
        let id = self.client_ids_generator;
        self.client_ids_generator += 1;
        id
    }

    fn apply(&mut self, operation: Operation, now: Instant, outgoing: &mut Vec<(SocketAddr, Datagram)>) {
        match operation {
            Operation::Connect(addr) => {
                match self.clients.get_mut(&addr) {
                    Some(client) if client.phase == EndpointPhase::Incoming => {
                        info!("accepting connection from {:?}", addr);
                        client.phase = EndpointPhase::Connected;
                        client.last_sent = Some(now);
                        outgoing.push((addr, Datagram::ConnectAccept));
                    }
                    Some(client) => {
                        debug!("connect to {:?}: endpoint is already in phase {:?}", addr, client.phase);
                    }
                    None => {
                        debug!("connecting to {:?}", addr);
                        let id = self.next_client_id();
                        let session = rand::random();
                        self.clients.insert(addr, DistantClient::new(addr, id, session, EndpointPhase::Connecting, &self.config, now));
                    }
                }
            }
            Operation::Disconnect(addr) => {
                match self.clients.remove(&addr) {
                    Some(client) => outgoing.push((addr, Self::goodbye(&client))),
                    None => debug!("disconnect from unknown endpoint {:?} - ignoring", addr),
                }
            }
            Operation::DisconnectAll => {
                for (addr, client) in self.clients.drain() {
                    outgoing.push((addr, Self::goodbye(&client)));
                }
            }
            Operation::SendTo { to, data, channel } => {
                match self.clients.get_mut(&to) {
                    Some(client) if client.phase != EndpointPhase::Incoming => client.send(channel, &data),
                    Some(_) => warn!("sending to {:?} before accepting its connection - dropping", to),
                    None => warn!("sending to unknown endpoint {:?} - dropping", to),
                }
            }
            Operation::BroadCast { data, channel } => {
                for client in self.clients.values_mut().filter(|c| c.is_connected()) {
                    client.send(channel, &data);
                }
            }
        }
    }

    fn goodbye(client: &DistantClient) -> Datagram {
        match client.phase {
            EndpointPhase::Incoming => Datagram::ConnectRefuse,
            _ => Datagram::Disconnect,
        }
    }

    fn check_timeouts(&mut self, now: Instant) {
        let mut lost = Vec::new();
        for client in self.clients.values_mut() {
            if client.phase == EndpointPhase::Connecting {
                if now.duration_since(client.created_at) > self.config.connect_timeout {
                    lost.push(client.address);
                }
                continue;
            }

            let silence = now.duration_since(client.last_received);
            if silence <= self.config.timeout {
                continue;
            }

            let tolerate = self.config.allow_interruption
                && client.is_connected()
                && silence <= self.config.interruption_timeout;
            if tolerate {
                if !client.interrupted {
                    warn!("no data from {:?} for {:?} - connection is interrupted", client.address, silence);
                    client.interrupted = true;
                }
            }
            else {
                lost.push(client.address);
            }
        }

        for addr in lost {
            let client = match self.clients.remove(&addr) {
                Some(c) => c,
                None => continue,
            };

            if client.phase == EndpointPhase::Connecting {
                info!("connection attempt to {:?} timed out", addr);
                self.events.push(InboundEvent::ConnectionResult {
                    from: addr,
                    from_id: client.id,
                    outcome: ConnectionOutcome::TimedOut,
                });
            }
            else {
                warn!("connection to {:?} timed out", addr);
                self.events.push(InboundEvent::Disconnection {
                    from: addr,
                    from_id: client.id,
                    reason: DisconnectReason::Timeout,
                });
            }
        }
    }

    fn on_datagram(&mut self, from: SocketAddr, datagram: Datagram, now: Instant, replies: &mut Vec<(SocketAddr, Datagram)>) {
        if !self.clients.contains_key(&from) {
            self.on_datagram_from_unknown(from, datagram, now, replies);
            return;
        }
        if let Datagram::Connect { session } = datagram {
            if self.is_restarted(from, session) {
                self.replace_restarted(from, datagram, now, replies);
                return;
            }
        }
        let client = match self.clients.get_mut(&from) {
            Some(c) => c,
            None => return,
        };

        client.last_received = now;
        if client.interrupted {
            info!("connection to {:?} resumed", from);
            client.interrupted = false;
        }
        let id = client.id;

        // anything but a refusal from an endpoint we are connecting to means it accepted and
        //  the accept datagram got lost
        let implicit_accept = client.phase == EndpointPhase::Connecting
            && matches!(datagram, Datagram::Data(_) | Datagram::Ack { .. } | Datagram::KeepAlive);
        if datagram == Datagram::ConnectAccept || implicit_accept {
            if client.phase == EndpointPhase::Connecting {
                info!("connected to {:?}", from);
                client.phase = EndpointPhase::Connected;
                client.last_sent = None;
                self.events.push(InboundEvent::ConnectionResult {
                    from,
                    from_id: id,
                    outcome: ConnectionOutcome::Success,
                });
            }
        }

        match datagram {
            Datagram::Connect { .. } => {
                if client.phase == EndpointPhase::Connected {
                    trace!("repeated connection request from {:?} - re-sending accept", from);
                    replies.push((from, Datagram::ConnectAccept));
                }
            }
            Datagram::ConnectAccept | Datagram::KeepAlive => {}
            Datagram::ConnectRefuse => {
                if client.phase == EndpointPhase::Connecting {
                    info!("connection to {:?} was refused", from);
                    self.clients.remove(&from);
                    self.events.push(InboundEvent::ConnectionResult {
                        from,
                        from_id: id,
                        outcome: ConnectionOutcome::Refused,
                    });
                }
            }
            Datagram::Disconnect => {
                let phase = client.phase;
                self.clients.remove(&from);
                if phase == EndpointPhase::Connecting {
                    self.events.push(InboundEvent::ConnectionResult {
                        from,
                        from_id: id,
                        outcome: ConnectionOutcome::Refused,
                    });
                }
                else {
                    info!("{:?} closed the connection", from);
                    self.events.push(InboundEvent::Disconnection {
                        from,
                        from_id: id,
                        reason: DisconnectReason::Closed,
                    });
                }
            }
            Datagram::Data(frame) => {
                if !client.is_connected() {
                    debug!("received data from {:?} before the connection was established - dropping", from);
                    return;
                }
                for (channel, data) in client.on_data(frame) {
                    self.events.push(InboundEvent::UserData {
                        from,
                        from_id: id,
                        channel,
                        data,
                    });
                }
            }
            Datagram::Ack { channel, ack } => {
                if client.is_connected() {
                    client.on_ack(channel, ack);
                }
            }
        }
    }

    /// true if a connection request comes from an endpoint that was accepted under a different
    ///  session, i.e. the remote application restarted on the same address
    fn is_restarted(&self, from: SocketAddr, session: u64) -> bool {
        match self.clients.get(&from) {
            Some(client) => client.phase != EndpointPhase::Connecting && client.session != session,
            None => false,
        }
    }

    fn replace_restarted(&mut self, from: SocketAddr, datagram: Datagram, now: Instant, replies: &mut Vec<(SocketAddr, Datagram)>) {
        let Some(old) = self.clients.remove(&from) else {
            return;
        };
        info!("{:?} started a new connection - dropping the previous one", from);
        if old.is_connected() {
            self.events.push(InboundEvent::Disconnection {
                from,
                from_id: old.id,
                reason: DisconnectReason::Closed,
            });
        }
        self.on_datagram_from_unknown(from, datagram, now, replies);
    }

    fn on_datagram_from_unknown(&mut self, from: SocketAddr, datagram: Datagram, now: Instant, replies: &mut Vec<(SocketAddr, Datagram)>) {
        let Datagram::Connect { session } = datagram else {
            debug!("received datagram of kind {} from unknown endpoint {:?} - dropping", datagram.kind(), from);
            return;
        };

        if self.clients.len() >= self.config.max_peers {
            warn!("refusing connection from {:?}: maximum of {} peers reached", from, self.config.max_peers);
            replies.push((from, Datagram::ConnectRefuse));
            return;
        }

        let id = self.next_client_id();
        info!("incoming connection from {:?}", from);
        self.clients.insert(from, DistantClient::new(from, id, session, EndpointPhase::Incoming, &self.config, now));
        self.events.push(InboundEvent::IncomingConnection { from, from_id: id });
    }

    fn send_datagram(&mut self, to: SocketAddr, datagram: &Datagram) -> std::io::Result<()> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Err(std::io::Error::new(ErrorKind::NotConnected, "socket is not initialized")),
        };

        let mut buf = BytesMut::new();
        datagram.ser(&mut buf);
        let buf = buf.freeze();

        let scheduled = match &mut self.simulator {
            Some(simulator) => simulator.schedule(to, buf),
            None => vec![(to, buf)],
        };

        for (to, buf) in scheduled {
            match socket.send_to(&buf, to) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    debug!("socket send buffer is full - dropping datagram to {:?}", to);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
