// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Errno-style result codes for the handler and LLRPC planes.
//!
//! External tools drive handlers and LLRPCs with numeric status codes; the
//! subset here is what the core actually returns.

/// Operation succeeded.
pub const SUCCESS: i32 = 0;
/// No such file or directory (unknown element or handler).
pub const ENOENT: i32 = 2;
/// I/O error.
pub const EIO: i32 = 5;
/// Try again (element busy quiescing).
pub const EAGAIN: i32 = 11;
/// Not enough memory.
pub const ENOMEM: i32 = 12;
/// Permission denied (handler not readable / not writable).
pub const EACCES: i32 = 13;
/// Invalid argument.
pub const EINVAL: i32 = 22;
/// Result out of range.
pub const ERANGE: i32 = 34;
/// Operation not supported (unknown LLRPC command).
pub const ENOTSUP: i32 = 95;

/// Symbolic name for a code this module defines; the number otherwise.
#[must_use]
pub fn name(code: i32) -> String {
    match code {
        SUCCESS => "SUCCESS".to_string(),
        ENOENT => "ENOENT".to_string(),
        EIO => "EIO".to_string(),
        EAGAIN => "EAGAIN".to_string(),
        ENOMEM => "ENOMEM".to_string(),
        EACCES => "EACCES".to_string(),
        EINVAL => "EINVAL".to_string(),
        ERANGE => "ERANGE".to_string(),
        ENOTSUP => "ENOTSUP".to_string(),
        other => other.to_string(),
    }
}
