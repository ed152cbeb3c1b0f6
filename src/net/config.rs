use std::time::Duration;

use anyhow::bail;

use crate::net::channel::ChannelKind;
use crate::net::simulator::SimulatorConfig;

/// The channel all chat traffic goes through
pub const CHAT_CHANNEL: u8 = 0;

/// Largest UDP payload over IPV4
pub const MAX_DATAGRAM_SIZE: usize = 65507;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// A remote endpoint that has not sent anything for this long is considered lost
    pub timeout: Duration,
    /// If set, a lost endpoint is only marked as interrupted, and it is dropped after
    ///  [UdpConfig::interruption_timeout] unless it starts sending again
    pub allow_interruption: bool,
    pub interruption_timeout: Duration,

    /// how long an outgoing connection attempt waits for the remote side to accept
    pub connect_timeout: Duration,
    /// interval for re-sending unacknowledged data frames and connection requests
    pub resend_interval: Duration,
    pub keep_alive_interval: Duration,

    /// application messages bigger than this are split into several data frames
    pub max_fragment_size: usize,
    /// number of frames a reliable channel buffers ahead of the next expected sequence number
    pub max_reorder_window: u64,
    pub max_peers: usize,

    /// channel ids and their delivery protocol, instantiated for every remote endpoint
    pub channels: Vec<(u8, ChannelKind)>,

    pub simulator: Option<SimulatorConfig>,
}

impl UdpConfig {
    pub fn new() -> UdpConfig {
        UdpConfig {
            timeout: Duration::from_millis(2000),
            allow_interruption: false,
            interruption_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            resend_interval: Duration::from_millis(100),
            keep_alive_interval: Duration::from_millis(250),
            max_fragment_size: 16 * 1024,
            max_reorder_window: 4096,
            max_peers: 64,
            channels: vec![(CHAT_CHANNEL, ChannelKind::ReliableOrdered)],
            simulator: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_fragment_size == 0 || self.max_fragment_size > MAX_DATAGRAM_SIZE - 64 {
            bail!("fragment size must be between 1 and {}", MAX_DATAGRAM_SIZE - 64);
        }
        if self.allow_interruption && self.interruption_timeout <= self.timeout {
            bail!("interruption timeout must be longer than the regular timeout");
        }
        if self.keep_alive_interval >= self.timeout {
            bail!("keep-alive interval must be shorter than the timeout");
        }
        if self.max_reorder_window == 0 {
            bail!("reorder window must not be empty");
        }
        for (i, (id, _)) in self.channels.iter().enumerate() {
            if self.channels[..i].iter().any(|(other, _)| other == id) {
                bail!("channel {} is registered more than once", id);
            }
        }
        if let Some(simulator) = &self.simulator {
            simulator.validate()?;
        }
        Ok(())
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig::new()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::default(|_: &mut UdpConfig| {}, true)]
    #[case::zero_fragment(|c: &mut UdpConfig| c.max_fragment_size = 0, false)]
    #[case::huge_fragment(|c: &mut UdpConfig| c.max_fragment_size = 70_000, false)]
    #[case::short_interruption(|c: &mut UdpConfig| { c.allow_interruption = true; c.interruption_timeout = c.timeout; }, false)]
    #[case::interruption(|c: &mut UdpConfig| c.allow_interruption = true, true)]
    #[case::keep_alive(|c: &mut UdpConfig| c.keep_alive_interval = Duration::from_secs(5), false)]
    #[case::duplicate_channel(|c: &mut UdpConfig| c.channels.push((CHAT_CHANNEL, ChannelKind::ReliableOrdered)), false)]
    fn test_validate(#[case] modify: fn(&mut UdpConfig), #[case] valid: bool) {
        let mut config = UdpConfig::new();
        modify(&mut config);
        assert_eq!(config.validate().is_ok(), valid);
    }
}
