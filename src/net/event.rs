use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionOutcome {
    Success,
    Refused,
    TimedOut,
    Failed,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DisconnectReason {
    /// no datagram from the remote side within the configured timeout
    Timeout,
    /// the remote side closed the connection
    Closed,
}

/// Something that happened on the transport, returned by [crate::net::udp_client::UdpClient::poll]
///  exactly once
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InboundEvent {
    IncomingConnection {
        from: SocketAddr,
        from_id: u64,
    },
    ConnectionResult {
        from: SocketAddr,
        from_id: u64,
        outcome: ConnectionOutcome,
    },
    UserData {
        from: SocketAddr,
        from_id: u64,
        channel: u8,
        data: Vec<u8>,
    },
    Disconnection {
        from: SocketAddr,
        from_id: u64,
        reason: DisconnectReason,
    },
}
