use std::ops::RangeInclusive;
use std::time::Duration;

use anyhow::bail;

use crate::net::config::UdpConfig;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// sleep between two iterations of the session thread
    pub tick_interval: Duration,
    pub udp: UdpConfig,

    /// longer texts are cut off before sending
    pub max_text_len: usize,
    pub max_icon_size: u64,
    pub max_image_size: u64,
    /// allowed width and height of user icons
    pub icon_resolution: RangeInclusive<i32>,
    /// Upper bound for the number of actions a late joiner is sent per tick while catching up.
    ///  NB: A file packet always ends the tick's catch-up for that peer.
    pub max_catch_up_parts_per_tick: usize,
}

impl ChatConfig {
    pub fn new() -> ChatConfig {
        ChatConfig {
            tick_interval: Duration::from_millis(30),
            udp: UdpConfig::new(),
            max_text_len: 32768,
            max_icon_size: 0x40000,
            max_image_size: 0x800000,
            icon_resolution: 16..=256,
            max_catch_up_parts_per_tick: 16,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.udp.validate()?;
        if self.tick_interval.is_zero() || self.tick_interval >= self.udp.timeout {
            bail!("tick interval must be positive and shorter than the UDP timeout");
        }
        if self.max_catch_up_parts_per_tick == 0 {
            bail!("late joiners must get at least one part per tick");
        }
        if self.icon_resolution.is_empty() || *self.icon_resolution.start() <= 0 {
            bail!("invalid icon resolution range {:?}", self.icon_resolution);
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig::new()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::default(|_: &mut ChatConfig| {}, true)]
    #[case::zero_tick(|c: &mut ChatConfig| c.tick_interval = Duration::ZERO, false)]
    #[case::slow_tick(|c: &mut ChatConfig| c.tick_interval = Duration::from_secs(3), false)]
    #[case::no_catch_up(|c: &mut ChatConfig| c.max_catch_up_parts_per_tick = 0, false)]
    #[case::empty_resolution(|c: &mut ChatConfig| c.icon_resolution = 256..=16, false)]
    #[case::invalid_udp(|c: &mut ChatConfig| c.udp.max_fragment_size = 0, false)]
    fn test_validate(#[case] modify: fn(&mut ChatConfig), #[case] valid: bool) {
        let mut config = ChatConfig::new();
        modify(&mut config);
        assert_eq!(config.validate().is_ok(), valid);
    }
}
