//! Working-buffer layout and per-socket receive storage.
//!
//! A socket's working buffer is carved into three named regions:
//!
//! ```text
//! +---------------------------+-------------+---------------------------+
//! | RW slots (RW x MIU)       | send (MIU)  | linear FIFO (remainder)   |
//! +---------------------------+-------------+---------------------------+
//! ```
//!
//! Without a linear region, received I-frames wait in the RW slots until the
//! application reads them. With one, frames are appended to the cyclic FIFO
//! and the slots only stage frames that did not fit.

use std::ops::Range;

use crate::core::{LINEAR_BUFFER_MIN, LlcpError, LlcpResult};

/// Region boundaries inside a working buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    /// Receive-window slots.
    pub ring: Range<usize>,
    /// Size of one slot (the local MIU).
    pub slot_len: usize,
    /// Number of slots (the local RW).
    pub slots: usize,
    /// Outbound parameter staging region.
    pub send: Range<usize>,
    /// Cyclic linear receive region (may be empty).
    pub linear: Range<usize>,
}

impl BufferLayout {
    /// Compute the layout for a buffer of `total` bytes.
    pub fn compute(total: usize, miu: u16, rw: u8) -> LlcpResult<Self> {
        let slot_len = usize::from(miu);
        let slots = usize::from(rw);
        let ring_len = slot_len * slots;
        let needed = ring_len + slot_len;

        if needed > total {
            return Err(LlcpError::BufferTooSmall {
                needed,
                actual: total,
            });
        }

        // A linear region must hold at least one full frame, otherwise a
        // staged frame could never move into it.
        let linear_len = total - needed;
        let linear_min = LINEAR_BUFFER_MIN.max(slot_len);
        if linear_len != 0 && linear_len < linear_min {
            return Err(LlcpError::BufferTooSmall {
                needed: needed + linear_min,
                actual: total,
            });
        }

        Ok(Self {
            ring: 0..ring_len,
            slot_len,
            slots,
            send: ring_len..needed,
            linear: needed..total,
        })
    }

    /// Byte range of slot `index`.
    pub fn slot(&self, index: usize) -> Range<usize> {
        let start = self.ring.start + index * self.slot_len;
        start..start + self.slot_len
    }

    /// Check if a linear region is configured.
    pub fn has_linear(&self) -> bool {
        !self.linear.is_empty()
    }
}

/// Receive-window slots, send staging area and optional linear FIFO backed
/// by one owned working buffer.
#[derive(Debug)]
pub struct SocketBuffers {
    storage: Box<[u8]>,
    layout: BufferLayout,
    slot_lens: Vec<usize>,
    read: u32,
    write: u32,
    fifo_head: usize,
    fifo_len: usize,
}

impl SocketBuffers {
    /// Carve `buffer` for the given MIU and RW.
    pub fn carve(buffer: Vec<u8>, miu: u16, rw: u8) -> LlcpResult<Self> {
        let layout = BufferLayout::compute(buffer.len(), miu, rw)?;
        Ok(Self {
            slot_lens: vec![0; layout.slots],
            storage: buffer.into_boxed_slice(),
            layout,
            read: 0,
            write: 0,
            fifo_head: 0,
            fifo_len: 0,
        })
    }

    /// Region boundaries.
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// Copy encoded CONNECT/CC parameters into the send region.
    pub fn stage_params(&mut self, params: &[u8]) -> LlcpResult<&[u8]> {
        let region = self.layout.send.clone();
        if params.len() > region.len() {
            return Err(LlcpError::BufferTooSmall {
                needed: params.len(),
                actual: region.len(),
            });
        }
        let staged = &mut self.storage[region.start..region.start + params.len()];
        staged.copy_from_slice(params);
        Ok(staged)
    }

    // ===== RW SLOTS =====

    /// Number of occupied slots.
    pub fn ring_len(&self) -> usize {
        self.write.wrapping_sub(self.read) as usize
    }

    /// Check if no slot is occupied.
    pub fn ring_is_empty(&self) -> bool {
        self.read == self.write
    }

    /// Check if every slot is occupied.
    pub fn ring_is_full(&self) -> bool {
        self.ring_len() >= self.layout.slots
    }

    /// Store a frame in the next free slot. Returns `false` when the ring is
    /// full or the frame exceeds a slot.
    pub fn ring_push(&mut self, data: &[u8]) -> bool {
        if self.ring_is_full() || data.len() > self.layout.slot_len {
            return false;
        }
        let index = self.write as usize % self.layout.slots;
        let range = self.layout.slot(index);
        self.storage[range.start..range.start + data.len()].copy_from_slice(data);
        self.slot_lens[index] = data.len();
        self.write = self.write.wrapping_add(1);
        true
    }

    /// Length of the oldest stored frame.
    pub fn ring_front_len(&self) -> Option<usize> {
        if self.ring_is_empty() {
            return None;
        }
        Some(self.slot_lens[self.read as usize % self.layout.slots])
    }

    /// Remove and return the oldest stored frame.
    pub fn ring_pop(&mut self) -> Option<Vec<u8>> {
        if self.ring_is_empty() {
            return None;
        }
        let index = self.read as usize % self.layout.slots;
        let range = self.layout.slot(index);
        let data = self.storage[range.start..range.start + self.slot_lens[index]].to_vec();
        self.slot_lens[index] = 0;
        self.read = self.read.wrapping_add(1);
        Some(data)
    }

    // ===== LINEAR FIFO =====

    /// Check if a linear FIFO is configured.
    pub fn has_linear(&self) -> bool {
        self.layout.has_linear()
    }

    /// Bytes buffered in the FIFO.
    pub fn fifo_len(&self) -> usize {
        self.fifo_len
    }

    /// Free space in the FIFO.
    pub fn fifo_available(&self) -> usize {
        self.layout.linear.len() - self.fifo_len
    }

    /// Append `data` to the FIFO. All or nothing.
    pub fn fifo_write(&mut self, data: &[u8]) -> bool {
        if data.len() > self.fifo_available() {
            return false;
        }
        if data.is_empty() {
            return true;
        }
        let capacity = self.layout.linear.len();
        let base = self.layout.linear.start;
        let tail = (self.fifo_head + self.fifo_len) % capacity;
        let first = data.len().min(capacity - tail);
        self.storage[base + tail..base + tail + first].copy_from_slice(&data[..first]);
        self.storage[base..base + data.len() - first].copy_from_slice(&data[first..]);
        self.fifo_len += data.len();
        true
    }

    /// Remove up to `max` bytes from the FIFO.
    pub fn fifo_read(&mut self, max: usize) -> Vec<u8> {
        let count = max.min(self.fifo_len);
        let capacity = self.layout.linear.len();
        let base = self.layout.linear.start;
        let first = count.min(capacity - self.fifo_head);

        let mut out = Vec::with_capacity(count);
        out.extend_from_slice(&self.storage[base + self.fifo_head..base + self.fifo_head + first]);
        out.extend_from_slice(&self.storage[base..base + count - first]);

        self.fifo_len -= count;
        self.fifo_head = if self.fifo_len == 0 {
            0
        } else {
            (self.fifo_head + count) % capacity
        };
        out
    }

    /// Move staged frames from the slots into the FIFO while they fit.
    /// Returns the number of frames moved.
    pub fn drain_ring_into_fifo(&mut self) -> usize {
        let mut moved = 0;
        while let Some(len) = self.ring_front_len() {
            if len > self.fifo_available() {
                break;
            }
            if let Some(frame) = self.ring_pop() {
                self.fifo_write(&frame);
                moved += 1;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_without_linear() {
        let layout = BufferLayout::compute(128 * 3, 128, 2).unwrap();
        assert_eq!(layout.ring, 0..256);
        assert_eq!(layout.send, 256..384);
        assert!(!layout.has_linear());
        assert_eq!(layout.slot(1), 128..256);
    }

    #[test]
    fn test_layout_with_linear() {
        let layout = BufferLayout::compute(128 * 2 + 200, 128, 1).unwrap();
        assert_eq!(layout.linear, 256..456);
        assert!(layout.has_linear());
    }

    #[test]
    fn test_layout_too_small() {
        assert_eq!(
            BufferLayout::compute(200, 128, 1),
            Err(LlcpError::BufferTooSmall {
                needed: 256,
                actual: 200
            })
        );
        // linear remainder of 10 bytes is unusable
        assert_eq!(
            BufferLayout::compute(266, 128, 1),
            Err(LlcpError::BufferTooSmall {
                needed: 384,
                actual: 266
            })
        );
    }

    #[test]
    fn test_linear_region_must_hold_one_frame() {
        assert_eq!(
            BufferLayout::compute(512 * 2 + 128, 512, 1),
            Err(LlcpError::BufferTooSmall {
                needed: 512 * 3,
                actual: 512 * 2 + 128
            })
        );
        let layout = BufferLayout::compute(512 * 3, 512, 1).unwrap();
        assert_eq!(layout.linear.len(), 512);
    }

    #[test]
    fn test_layout_zero_window() {
        let layout = BufferLayout::compute(128, 128, 0).unwrap();
        assert!(layout.ring.is_empty());
        assert_eq!(layout.send, 0..128);
    }

    #[test]
    fn test_ring_fifo_order() {
        let mut buffers = SocketBuffers::carve(vec![0; 384], 128, 2).unwrap();
        assert!(buffers.ring_push(b"one"));
        assert!(buffers.ring_push(b"two"));
        assert!(buffers.ring_is_full());
        assert!(!buffers.ring_push(b"three"));

        assert_eq!(buffers.ring_pop().unwrap(), b"one");
        assert!(buffers.ring_push(b"three"));
        assert_eq!(buffers.ring_pop().unwrap(), b"two");
        assert_eq!(buffers.ring_pop().unwrap(), b"three");
        assert!(buffers.ring_pop().is_none());
    }

    #[test]
    fn test_ring_rejects_oversized_frame() {
        let mut buffers = SocketBuffers::carve(vec![0; 256], 128, 1).unwrap();
        assert!(!buffers.ring_push(&[0u8; 129]));
        assert!(buffers.ring_is_empty());
    }

    #[test]
    fn test_fifo_wraps() {
        let mut buffers = SocketBuffers::carve(vec![0; 128 + 128], 128, 0).unwrap();
        assert_eq!(buffers.fifo_available(), 128);

        assert!(buffers.fifo_write(&[1u8; 100]));
        assert_eq!(buffers.fifo_read(90), vec![1u8; 90]);
        assert!(buffers.fifo_write(&[2u8; 100]));
        assert_eq!(buffers.fifo_len(), 110);
        assert!(!buffers.fifo_write(&[3u8; 19]));

        let mut expected = vec![1u8; 10];
        expected.extend_from_slice(&[2u8; 100]);
        assert_eq!(buffers.fifo_read(500), expected);
        assert_eq!(buffers.fifo_len(), 0);
    }

    #[test]
    fn test_drain_ring_into_fifo() {
        let mut buffers = SocketBuffers::carve(vec![0; 128 * 3 + 128], 128, 2).unwrap();
        assert!(buffers.fifo_write(&[0u8; 100]));
        assert!(buffers.ring_push(&[1u8; 20]));
        assert!(buffers.ring_push(&[2u8; 20]));

        assert_eq!(buffers.drain_ring_into_fifo(), 1);
        assert_eq!(buffers.ring_len(), 1);

        buffers.fifo_read(100);
        assert_eq!(buffers.drain_ring_into_fifo(), 1);
        assert!(buffers.ring_is_empty());
        assert_eq!(buffers.fifo_read(128)[..20], [1u8; 20]);
    }

    #[test]
    fn test_stage_params() {
        let mut buffers = SocketBuffers::carve(vec![0; 256], 128, 1).unwrap();
        assert_eq!(buffers.stage_params(&[5, 1, 4]).unwrap(), &[5, 1, 4]);
        assert!(matches!(
            buffers.stage_params(&[0u8; 129]),
            Err(LlcpError::BufferTooSmall { .. })
        ));
    }
}
