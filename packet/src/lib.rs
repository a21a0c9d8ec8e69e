// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)]
#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(clippy::missing_errors_doc)]

//! Reference-counted packet buffers with headroom, tailroom and annotations.
//!
//! A [`Packet`] is a view over a shared byte buffer plus a fixed-size
//! annotation block used as a side channel between processing elements.
//! Cloning a packet is O(1) and never copies the buffer; writes go through
//! [`Packet::data_mut`], which copies the buffer first if it is shared.

mod anno;
mod buffer;
mod ether;
mod packet;

pub use anno::{ANNO_SIZE, Annotations, anno_offset};
pub use buffer::{Buffer, BufferDtor};
pub use ether::{EtherAddr, EtherAddrParseError};
pub use packet::{Packet, PacketError};
