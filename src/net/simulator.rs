use std::net::SocketAddr;

use anyhow::bail;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Probabilities for the network simulator, each between 0.0 and 1.0
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub loss: f64,
    pub duplicate: f64,
    pub reorder: f64,
    pub seed: u64,
}

impl SimulatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, p) in [("loss", self.loss), ("duplicate", self.duplicate), ("reorder", self.reorder)] {
            if !(0.0..=1.0).contains(&p) {
                bail!("simulator {} probability must be between 0.0 and 1.0, was {}", name, p);
            }
        }
        Ok(())
    }
}

/// Degrades outgoing traffic on purpose, to exercise the reliability layer on a perfect
///  (e.g. loopback) network
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    held_back: Option<(SocketAddr, Bytes)>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Simulator {
        Simulator {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            held_back: None,
        }
    }

    /// decides what actually goes on the wire for one outgoing datagram
    pub fn schedule(&mut self, to: SocketAddr, datagram: Bytes) -> Vec<(SocketAddr, Bytes)> {
        let mut result = Vec::new();

        if self.rng.gen_bool(self.config.loss) {
            trace!("simulator: dropping datagram to {:?}", to);
        }
        else if self.held_back.is_none() && self.rng.gen_bool(self.config.reorder) {
            trace!("simulator: holding back datagram to {:?}", to);
            self.held_back = Some((to, datagram));
            return result;
        }
        else {
            if self.rng.gen_bool(self.config.duplicate) {
                trace!("simulator: duplicating datagram to {:?}", to);
                result.push((to, datagram.clone()));
            }
            result.push((to, datagram));
        }

        if let Some(held_back) = self.held_back.take() {
            result.push(held_back);
        }
        result
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use rstest::rstest;
    use super::*;

    fn config(loss: f64, duplicate: f64, reorder: f64) -> SimulatorConfig {
        SimulatorConfig { loss, duplicate, reorder, seed: 7 }
    }

    #[rstest]
    #[case::valid(config(0.0, 0.5, 1.0), true)]
    #[case::negative(config(-0.1, 0.0, 0.0), false)]
    #[case::too_big(config(0.0, 1.5, 0.0), false)]
    #[case::nan(config(0.0, 0.0, f64::NAN), false)]
    fn test_validate(#[case] config: SimulatorConfig, #[case] valid: bool) {
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[rstest]
    #[case::passthrough(config(0.0, 0.0, 0.0), vec![vec!["a"], vec!["b"]])]
    #[case::lose_all(config(1.0, 0.0, 0.0), vec![vec![], vec![]])]
    #[case::duplicate_all(config(0.0, 1.0, 0.0), vec![vec!["a", "a"], vec!["b", "b"]])]
    #[case::reorder_all(config(0.0, 0.0, 1.0), vec![vec![], vec!["b", "a"]])]
    fn test_schedule(#[case] config: SimulatorConfig, #[case] expected: Vec<Vec<&str>>) {
        let to = SocketAddr::from_str("127.0.0.1:9000").unwrap();
        let mut simulator = Simulator::new(config);
        for (payload, expected) in ["a", "b"].into_iter().zip(expected) {
            let actual = simulator.schedule(to, Bytes::from_static(payload.as_bytes()))
                .into_iter()
                .map(|(_, d)| String::from_utf8(d.to_vec()).unwrap())
                .collect::<Vec<_>>();
            assert_eq!(actual, expected);
        }
    }
}
