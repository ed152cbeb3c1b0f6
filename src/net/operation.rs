use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// A state change or send request, applied by the networking thread on its next
///  [crate::net::udp_client::UdpClient::process_send]
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Operation {
    Connect(SocketAddr),
    SendTo { to: SocketAddr, data: Vec<u8>, channel: u8 },
    BroadCast { data: Vec<u8>, channel: u8 },
    Disconnect(SocketAddr),
    DisconnectAll,
}

/// Cloneable handle for queueing operations from any thread
#[derive(Clone, Default)]
pub struct OperationQueue {
    operations: Arc<Mutex<Vec<Operation>>>,
}

impl OperationQueue {
    pub fn connect(&self, addr: SocketAddr) {
        self.push(Operation::Connect(addr));
    }

    pub fn disconnect(&self, addr: SocketAddr) {
        self.push(Operation::Disconnect(addr));
    }

    pub fn disconnect_all(&self) {
        self.push(Operation::DisconnectAll);
    }

    pub fn send_to(&self, to: SocketAddr, data: Vec<u8>, channel: u8) {
        self.push(Operation::SendTo { to, data, channel });
    }

    pub fn broadcast(&self, data: Vec<u8>, channel: u8) {
        self.push(Operation::BroadCast { data, channel });
    }

    fn push(&self, operation: Operation) {
        let mut operations = self.operations.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        operations.push(operation);
    }

    pub(crate) fn drain(&self) -> Vec<Operation> {
        let mut operations = self.operations.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *operations)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use super::*;

    #[test]
    fn test_drain_in_queue_order() {
        let addr = SocketAddr::from_str("10.0.0.1:4000").unwrap();
        let queue = OperationQueue::default();
        let producer = queue.clone();

        std::thread::spawn(move || {
            producer.connect(addr);
            producer.send_to(addr, b"x".to_vec(), 0);
            producer.broadcast(b"y".to_vec(), 1);
            producer.disconnect(addr);
            producer.disconnect_all();
        }).join().unwrap();

        assert_eq!(queue.drain(), vec![
            Operation::Connect(addr),
            Operation::SendTo { to: addr, data: b"x".to_vec(), channel: 0 },
            Operation::BroadCast { data: b"y".to_vec(), channel: 1 },
            Operation::Disconnect(addr),
            Operation::DisconnectAll,
        ]);
        assert!(queue.drain().is_empty());
    }
}
