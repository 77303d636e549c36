use std::collections::VecDeque;

use crate::modbus::protocol::encode_write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRequest {
    pub register: u16,
    pub value: u16,
    /// Fire-and-forget: the scheduler does not wait for the device's answer.
    pub ignore_response: bool,
}

impl WriteRequest {
    pub fn new(register: u16, value: u16) -> Self {
        Self {
            register,
            value,
            ignore_response: false,
        }
    }

    pub fn ignoring_response(register: u16, value: u16) -> Self {
        Self {
            register,
            value,
            ignore_response: true,
        }
    }

    pub fn encode(&self, slave: u8) -> Vec<u8> {
        encode_write(slave, self.register, self.value)
    }
}

/// FIFO of writes waiting for the bus.
#[derive(Debug, Default)]
pub struct WriteQueue {
    pending: VecDeque<WriteRequest>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: WriteRequest) {
        self.pending.push_back(request);
    }

    pub fn pop_front(&mut self) -> Option<WriteRequest> {
        self.pending.pop_front()
    }

    pub fn front(&self) -> Option<&WriteRequest> {
        self.pending.front()
    }

    /// Drops everything still queued, returning how many writes were lost.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteRequest> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = WriteQueue::new();
        queue.enqueue(WriteRequest::new(1004, 2150));
        queue.enqueue(WriteRequest::new(1003, 3));
        queue.enqueue(WriteRequest::ignoring_response(1100, 1));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front().map(|r| r.register), Some(1004));
        assert_eq!(queue.pop_front(), Some(WriteRequest::new(1004, 2150)));
        assert_eq!(queue.pop_front(), Some(WriteRequest::new(1003, 3)));
        let last = queue.pop_front().unwrap();
        assert!(last.ignore_response);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_clear_reports_dropped() {
        let mut queue = WriteQueue::new();
        queue.enqueue(WriteRequest::new(1001, 1));
        queue.enqueue(WriteRequest::new(1002, 2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }

    #[test]
    fn test_encode_single_register_write() {
        let frame = WriteRequest::new(1004, 2150).encode(30);
        assert_eq!(&frame[..9], &[0x1E, 0x10, 0x03, 0xEC, 0x00, 0x01, 0x02, 0x08, 0x66]);
        assert_eq!(frame.len(), 11);
    }
}
