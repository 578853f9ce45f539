/*!
 * Core Types
 * Common types used across the completion ring
 */

/// Raw address inside a shared mapping
pub type Address = usize;

/// Size type for mapped regions
pub type Size = usize;

/// Ring file descriptor as handed out by ring setup
pub type RingFd = i32;

/// Monotonic ring cursor (head or tail), wraps at `u32::MAX`
pub type Cursor = u32;

/// Opaque correlation token carried from submission to completion
pub type UserData = u64;
