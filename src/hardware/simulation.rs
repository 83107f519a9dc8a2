//! Simulation channel for unit testing serial adapters without hardware

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use crate::channel::{ByteChannel, ChannelError, ChannelResult, SerialConfig};

/// A scripted [ByteChannel].
///
/// Writing a buffer that matches a registered request queues the matching response for
/// reading. Clones share the same script and buffers, so a test can keep a handle to inspect
/// what the device wrote.
#[derive(Debug, Clone, Default)]
pub struct SimulationChannel {
    req_resp_map: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
    rx_queue: Arc<RwLock<VecDeque<u8>>>,
    tx_log: Arc<RwLock<Vec<Vec<u8>>>>,
    open: Arc<RwLock<bool>>,
}

impl SimulationChannel {
    /// Creates an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resp` as the bytes returned after `req` is written
    pub fn add_response(&mut self, req: &[u8], resp: &[u8]) {
        self.req_resp_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(req.to_vec(), resp.to_vec());
    }

    /// Makes `bytes` available for reading immediately
    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx_queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(bytes.iter().copied());
    }

    /// Every buffer written so far, oldest first
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.tx_log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes every scripted response and pending byte
    pub fn clear_map(&mut self) {
        self.req_resp_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.rx_queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check_open(&self) -> ChannelResult<()> {
        if *self.open.read().unwrap_or_else(PoisonError::into_inner) {
            Ok(())
        } else {
            Err(ChannelError::InterfaceNotOpen)
        }
    }
}

impl ByteChannel for SimulationChannel {
    fn open(&mut self, _config: &SerialConfig) -> ChannelResult<()> {
        *self.open.write().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        *self.open.write().unwrap_or_else(PoisonError::into_inner) = false;
        Ok(())
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> ChannelResult<()> {
        self.check_open()?;
        self.tx_log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer.to_vec());
        let response = self
            .req_resp_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(buffer)
            .cloned();
        if let Some(response) = response {
            self.push_rx(&response);
        }
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> ChannelResult<usize> {
        self.check_open()?;
        let mut queue = self.rx_queue.write().unwrap_or_else(PoisonError::into_inner);
        let count = buffer.len().min(queue.len());
        for (dst, src) in buffer.iter_mut().zip(queue.drain(..count)) {
            *dst = src;
        }
        Ok(count)
    }

    fn discard_buffers(&mut self) -> ChannelResult<()> {
        self.rx_queue
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn set_timeout(&mut self, _timeout_ms: u32) -> ChannelResult<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> ChannelResult<usize> {
        Ok(self
            .rx_queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_exchange() {
        let mut channel = SimulationChannel::new();
        let handle = channel.clone();
        channel.add_response(&[0xF1, 0xA5], &[0x91, 0x27]);
        assert!(channel.write_bytes(&[0xF1, 0xA5]).is_err());

        channel.open(&SerialConfig::new("sim", 57600)).unwrap();
        channel.write_bytes(&[0xF1, 0xA5]).unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 2);
        let mut buf = [0u8; 8];
        assert_eq!(channel.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x91, 0x27]);
        assert_eq!(channel.read_byte().unwrap(), None);
        assert_eq!(handle.written(), vec![vec![0xF1, 0xA5]]);
    }
}
