// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! High-level packet structure.

use crate::anno::Annotations;
use crate::buffer::{Buffer, BufferDtor};
use std::sync::Arc;
use tracing::trace;

/// Errors surfaced by packet buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The allocator could not provide a buffer of the requested size.
    #[error("out of memory allocating a {0}-byte packet buffer")]
    Oom(usize),
    /// The data region is shorter than the operation requires.
    #[error("not enough packet data: needed {needed}, have {have}")]
    NotEnoughData {
        /// Bytes the operation needed.
        needed: usize,
        /// Bytes actually present.
        have: usize,
    },
}

/// A packet: a shared byte buffer, a data window into it, and annotations.
///
/// The shape invariant is `0 <= start <= end <= buffer.len()`, with
/// `headroom = start` and `tailroom = buffer.len() - end`.
///
/// Cloning shares the buffer and copies the annotation block; the clone and
/// the original are independently windowed, read-only views. Any mutable
/// access ([`Packet::data_mut`]) first makes the buffer unique, so writes can
/// never be observed through another share.
#[derive(Debug)]
pub struct Packet {
    buf: Arc<Buffer>,
    start: usize,
    end: usize,
    // header positions, relative to the buffer start so they survive
    // copy-on-write unchanged
    mac: Option<usize>,
    net: Option<usize>,
    transport: Option<usize>,
    anno: Annotations,
}

impl Packet {
    /// Headroom reserved when callers do not ask for a specific amount, and
    /// when a failed `push` forces a reallocation.
    pub const DEFAULT_HEADROOM: usize = 28;

    /// Allocate a packet with `len` data bytes, `headroom` bytes before them
    /// and `tailroom` bytes after.
    pub fn make(headroom: usize, len: usize, tailroom: usize) -> Result<Packet, PacketError> {
        let total = headroom + len + tailroom;
        let data = alloc_zeroed(total)?;
        Ok(Packet {
            buf: Arc::new(Buffer::owned(data)),
            start: headroom,
            end: headroom + len,
            mac: None,
            net: None,
            transport: None,
            anno: Annotations::default(),
        })
    }

    /// Allocate a packet with default headroom and copy `data` into it.
    pub fn from_data(data: &[u8]) -> Result<Packet, PacketError> {
        let mut packet = Packet::make(Packet::DEFAULT_HEADROOM, data.len(), 0)?;
        packet.data_mut().copy_from_slice(data);
        Ok(packet)
    }

    /// Wrap externally owned bytes. The whole allocation is the data region;
    /// `dtor` runs once when the last share is released.
    #[must_use]
    pub fn from_external(data: Box<[u8]>, dtor: BufferDtor) -> Packet {
        let len = data.len();
        Packet {
            buf: Arc::new(Buffer::external(data, dtor)),
            start: 0,
            end: len,
            mac: None,
            net: None,
            transport: None,
            anno: Annotations::default(),
        }
    }

    /// True if another packet shares this buffer.
    #[must_use]
    pub fn shared(&self) -> bool {
        Arc::strong_count(&self.buf) > 1
    }

    /// Number of packets sharing this buffer.
    #[must_use]
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.buf)
    }

    /// Make the buffer exclusively ours, copying it if it is shared.
    ///
    /// A no-op (and no allocation) when the packet is already unique.
    /// Annotations, header offsets, headroom and tailroom are preserved.
    pub fn uniqueify(&mut self) {
        let _ = Arc::make_mut(&mut self.buf);
    }

    /// Release this share of the buffer. The buffer itself is freed (and any
    /// external destructor runs) when the last share goes away.
    pub fn kill(self) {
        drop(self);
    }

    /// The packet data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buf.bytes()[self.start..self.end]
    }

    /// Writable packet data; uniqueifies first if the buffer is shared.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.start, self.end);
        &mut Arc::make_mut(&mut self.buf).bytes_mut()[start..end]
    }

    /// Data region length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True if the data region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Unused bytes before the data region.
    #[must_use]
    pub fn headroom(&self) -> usize {
        self.start
    }

    /// Unused bytes after the data region.
    #[must_use]
    pub fn tailroom(&self) -> usize {
        self.buf.len() - self.end
    }

    /// Total buffer length.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    /// Grow the data region at the front by `n` bytes.
    ///
    /// Consumes headroom when enough is available; otherwise reallocates into
    /// a larger buffer, preserving data, annotations and header offsets.
    pub fn push(&mut self, n: usize) -> Result<(), PacketError> {
        if n <= self.start {
            self.start -= n;
            return Ok(());
        }
        trace!(needed = n, headroom = self.start, "expensive packet push");
        self.realloc(n, self.tailroom())
    }

    /// Shrink the data region at the front by `n` bytes.
    pub fn pull(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len() {
            return Err(PacketError::NotEnoughData {
                needed: n,
                have: self.len(),
            });
        }
        self.start += n;
        Ok(())
    }

    /// Grow the data region at the back by `n` bytes.
    ///
    /// Consumes tailroom when enough is available; otherwise reallocates.
    pub fn put(&mut self, n: usize) -> Result<(), PacketError> {
        if n <= self.tailroom() {
            self.end += n;
            return Ok(());
        }
        trace!(needed = n, tailroom = self.tailroom(), "expensive packet put");
        let headroom = self.start;
        self.realloc_tail(n)?;
        debug_assert_eq!(self.start, headroom);
        Ok(())
    }

    /// Shrink the data region at the back by `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len() {
            return Err(PacketError::NotEnoughData {
                needed: n,
                have: self.len(),
            });
        }
        self.end -= n;
        Ok(())
    }

    /// Access the annotation block.
    #[must_use]
    pub fn anno(&self) -> &Annotations {
        &self.anno
    }

    /// Mutable access to the annotation block.
    pub fn anno_mut(&mut self) -> &mut Annotations {
        &mut self.anno
    }

    /// Record that the link-layer header starts `off` bytes into the data.
    ///
    /// # Panics
    ///
    /// Panics if `off` lies outside the data region.
    pub fn set_mac_offset(&mut self, off: usize) {
        assert!(off <= self.len(), "mac header offset out of packet data");
        self.mac = Some(self.start + off);
    }

    /// Record that the network-layer header starts `off` bytes into the data.
    ///
    /// # Panics
    ///
    /// Panics if `off` lies outside the data region.
    pub fn set_net_offset(&mut self, off: usize) {
        assert!(off <= self.len(), "network header offset out of packet data");
        self.net = Some(self.start + off);
    }

    /// Record that the transport-layer header starts `off` bytes into the
    /// data.
    ///
    /// # Panics
    ///
    /// Panics if `off` lies outside the data region.
    pub fn set_transport_offset(&mut self, off: usize) {
        assert!(
            off <= self.len(),
            "transport header offset out of packet data"
        );
        self.transport = Some(self.start + off);
    }

    /// Link-layer header offset relative to the current data start. Negative
    /// after the header bytes were pulled off.
    #[must_use]
    pub fn mac_offset(&self) -> Option<isize> {
        self.mac.map(|m| isize_diff(m, self.start))
    }

    /// Network-layer header offset relative to the current data start.
    #[must_use]
    pub fn net_offset(&self) -> Option<isize> {
        self.net.map(|m| isize_diff(m, self.start))
    }

    /// Transport-layer header offset relative to the current data start.
    #[must_use]
    pub fn transport_offset(&self) -> Option<isize> {
        self.transport.map(|m| isize_diff(m, self.start))
    }

    /// The bytes from the link-layer header to the end of the data region.
    #[must_use]
    pub fn mac_header(&self) -> Option<&[u8]> {
        self.header_at(self.mac)
    }

    /// The bytes from the network-layer header to the end of the data region.
    #[must_use]
    pub fn net_header(&self) -> Option<&[u8]> {
        self.header_at(self.net)
    }

    /// The bytes from the transport-layer header to the end of the data
    /// region.
    #[must_use]
    pub fn transport_header(&self) -> Option<&[u8]> {
        self.header_at(self.transport)
    }

    fn header_at(&self, pos: Option<usize>) -> Option<&[u8]> {
        let p = pos?;
        if p <= self.end {
            Some(&self.buf.bytes()[p..self.end])
        } else {
            None
        }
    }

    /// Reallocate with `extra_head` new bytes opening at the front of the
    /// data region and at least `tailroom` bytes after it.
    fn realloc(&mut self, extra_head: usize, tailroom: usize) -> Result<(), PacketError> {
        let headroom = Packet::DEFAULT_HEADROOM;
        let len = self.len();
        let total = headroom + extra_head + len + tailroom;
        let mut data = alloc_zeroed(total)?;
        data[headroom + extra_head..headroom + extra_head + len].copy_from_slice(self.data());
        let shift = isize_diff(headroom + extra_head, self.start);
        self.shift_headers(shift);
        self.buf = Arc::new(Buffer::owned(data));
        self.start = headroom;
        self.end = headroom + extra_head + len;
        Ok(())
    }

    /// Reallocate preserving the front layout, opening `extra_tail` new data
    /// bytes at the back.
    fn realloc_tail(&mut self, extra_tail: usize) -> Result<(), PacketError> {
        let len = self.len();
        let total = self.start + len + extra_tail;
        let mut data = alloc_zeroed(total)?;
        data[self.start..self.start + len].copy_from_slice(self.data());
        self.buf = Arc::new(Buffer::owned(data));
        self.end = self.start + len + extra_tail;
        Ok(())
    }

    fn shift_headers(&mut self, delta: isize) {
        for pos in [&mut self.mac, &mut self.net, &mut self.transport] {
            if let Some(p) = pos {
                *p = p.wrapping_add_signed(delta);
            }
        }
    }
}

impl Clone for Packet {
    /// Share the buffer; O(1), never copies buffer bytes. Annotations and
    /// header offsets are copied with the packet.
    fn clone(&self) -> Self {
        Packet {
            buf: Arc::clone(&self.buf),
            start: self.start,
            end: self.end,
            mac: self.mac,
            net: self.net,
            transport: self.transport,
            anno: self.anno,
        }
    }
}

fn alloc_zeroed(total: usize) -> Result<Box<[u8]>, PacketError> {
    let mut data = Vec::new();
    data.try_reserve_exact(total)
        .map_err(|_| PacketError::Oom(total))?;
    data.resize(total, 0);
    Ok(data.into_boxed_slice())
}

fn isize_diff(a: usize, b: usize) -> isize {
    isize::try_from(a).unwrap_or(isize::MAX) - isize::try_from(b).unwrap_or(isize::MAX)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn make_shape() {
        let p = Packet::make(32, 100, 16).unwrap();
        assert_eq!(p.headroom(), 32);
        assert_eq!(p.len(), 100);
        assert_eq!(p.tailroom(), 16);
        assert_eq!(p.buffer_len(), 148);
    }

    #[test]
    fn clone_then_kill_conserves_shares() {
        let p = Packet::from_data(b"hello").unwrap();
        assert_eq!(p.use_count(), 1);
        let q = p.clone();
        assert_eq!(p.use_count(), 2);
        q.kill();
        assert_eq!(p.use_count(), 1);
        assert!(!p.shared());
    }

    #[test]
    fn external_buffer_freed_exactly_once() {
        static FREED: AtomicUsize = AtomicUsize::new(0);
        let p = Packet::from_external(
            vec![1u8; 32].into_boxed_slice(),
            Box::new(|_| {
                FREED.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let q = p.clone();
        let r = q.clone();
        drop(p);
        drop(q);
        assert_eq!(FREED.load(Ordering::SeqCst), 0);
        drop(r);
        assert_eq!(FREED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uniqueify_is_idempotent_when_unique() {
        let mut p = Packet::from_data(b"data").unwrap();
        let before = p.data().as_ptr();
        p.uniqueify();
        assert_eq!(p.data().as_ptr(), before);
        assert_eq!(p.use_count(), 1);
    }

    #[test]
    fn uniqueify_on_write_isolates_clones() {
        let mut original = Packet::from_data(b"aaaa").unwrap();
        let mut writer = original.clone();
        let reader = original.clone();
        assert_eq!(original.use_count(), 3);

        writer.uniqueify();
        writer.data_mut().copy_from_slice(b"bbbb");

        assert_eq!(original.data(), b"aaaa");
        assert_eq!(reader.data(), b"aaaa");
        assert_eq!(writer.data(), b"bbbb");
        assert_eq!(original.use_count(), 2);
        assert_eq!(writer.use_count(), 1);
        // writes on the remaining shared pair still copy first
        original.data_mut().copy_from_slice(b"cccc");
        assert_eq!(reader.data(), b"aaaa");
    }

    #[test]
    fn uniqueify_preserves_layout_offsets_and_annotations() {
        let mut p = Packet::from_data(&[0u8; 64]).unwrap();
        p.set_mac_offset(0);
        p.set_net_offset(14);
        p.set_transport_offset(34);
        p.anno_mut().set_paint(7);
        let (head, tail) = (p.headroom(), p.tailroom());
        let clone = p.clone();

        p.uniqueify();

        assert_eq!(p.headroom(), head);
        assert_eq!(p.tailroom(), tail);
        assert_eq!(p.mac_offset(), Some(0));
        assert_eq!(p.net_offset(), Some(14));
        assert_eq!(p.transport_offset(), Some(34));
        assert_eq!(p.anno().paint(), 7);
        drop(clone);
    }

    #[test]
    fn push_within_headroom() {
        let mut p = Packet::make(16, 8, 0).unwrap();
        p.push(14).unwrap();
        assert_eq!(p.len(), 22);
        assert_eq!(p.headroom(), 2);
    }

    #[test]
    fn push_beyond_headroom_reallocates() {
        let mut p = Packet::from_data(b"payload").unwrap();
        p.set_net_offset(0);
        let headroom = p.headroom();
        p.push(headroom + 10).unwrap();
        assert_eq!(p.len(), 7 + headroom + 10);
        // original bytes survive at the back of the data region
        assert_eq!(&p.data()[headroom + 10..], b"payload");
        // the network header still points at the original first byte
        assert_eq!(
            p.net_offset(),
            Some(isize::try_from(headroom + 10).unwrap())
        );
    }

    #[test]
    fn pull_exposes_header_offsets_behind_data() {
        let mut p = Packet::from_data(&[0u8; 20]).unwrap();
        p.set_mac_offset(0);
        p.pull(14).unwrap();
        assert_eq!(p.len(), 6);
        assert_eq!(p.mac_offset(), Some(-14));
        assert!(p.mac_header().is_some());
    }

    #[test]
    fn pull_and_take_reject_overdraw() {
        let mut p = Packet::from_data(&[0u8; 4]).unwrap();
        assert!(matches!(
            p.pull(5),
            Err(PacketError::NotEnoughData { needed: 5, have: 4 })
        ));
        assert!(matches!(
            p.take(5),
            Err(PacketError::NotEnoughData { needed: 5, have: 4 })
        ));
    }

    #[test]
    fn put_and_take_at_tail() {
        let mut p = Packet::make(0, 4, 8).unwrap();
        p.put(8).unwrap();
        assert_eq!(p.len(), 12);
        assert_eq!(p.tailroom(), 0);
        p.take(2).unwrap();
        assert_eq!(p.len(), 10);
        // beyond tailroom: reallocates, keeps front layout
        p.put(100).unwrap();
        assert_eq!(p.len(), 110);
    }
}
