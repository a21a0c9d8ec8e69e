// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Backing storage for packets.

use std::fmt::{self, Debug, Formatter};
use tracing::trace;

/// Destructor invoked on the bytes of an externally owned buffer when the
/// last packet sharing it is dropped. Drivers use it to recycle descriptors.
pub type BufferDtor = Box<dyn FnOnce(&mut [u8]) + Send + Sync>;

/// A contiguous byte allocation shared by one or more packets.
///
/// The buffer does not know where packet data starts or ends; each sharing
/// [`Packet`](crate::Packet) carries its own data window. Storage is either
/// owned by the buffer or on loan from a driver, in which case a destructor
/// closure runs exactly once when the final share is released.
pub struct Buffer {
    data: Box<[u8]>,
    dtor: Option<BufferDtor>,
}

impl Buffer {
    pub(crate) fn owned(data: Box<[u8]>) -> Self {
        Buffer { data, dtor: None }
    }

    pub(crate) fn external(data: Box<[u8]>, dtor: BufferDtor) -> Self {
        Buffer {
            data,
            dtor: Some(dtor),
        }
    }

    /// Total allocation length, independent of any packet's data window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the allocation is zero-sized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True if the bytes are on loan from outside the process.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.dtor.is_some()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Clone for Buffer {
    /// Deep-copies the bytes into owned storage. The copy never inherits the
    /// destructor: the loaned original keeps it, the copy is process-owned.
    fn clone(&self) -> Self {
        trace!(len = self.data.len(), "copying packet buffer");
        Buffer {
            data: self.data.clone(),
            dtor: None,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(dtor) = self.dtor.take() {
            dtor(&mut self.data);
        }
    }
}

impl Debug for Buffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.data.len())
            .field("external", &self.dtor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn external_dtor_runs_once_on_last_drop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = fired.clone();
        let buf = Arc::new(Buffer::external(
            vec![0u8; 64].into_boxed_slice(),
            Box::new(move |_| {
                observer.fetch_add(1, Ordering::SeqCst);
            }),
        ));
        let share = buf.clone();
        drop(buf);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(share);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clone_is_owned_and_keeps_bytes() {
        let buf = Buffer::external(
            vec![7u8; 16].into_boxed_slice(),
            Box::new(|data| data.fill(0)),
        );
        let copy = buf.clone();
        assert!(!copy.is_external());
        assert_eq!(copy.bytes(), buf.bytes());
    }
}
