/*!
 * Ring Layout Limits and Constants
 *
 * Centralized location for the binary layout of completion records, the
 * kernel-defined completion flag bits and the default ring sizes.
 *
 * ## Design Philosophy
 * - Layout values are [ABI] and must match the kernel's `io_uring_cqe`
 * - Defaults are grouped by domain (layout, flags, sizing)
 */

use super::types::Size;

// =============================================================================
// COMPLETION RECORD LAYOUT
// =============================================================================

/// Size of one completion record in the entries array (16 bytes)
/// [ABI] Stride between consecutive records
pub const CQE_SIZE: Size = 16;

/// Offset of the 64-bit user-data token
/// [ABI]
pub const CQE_USER_DATA_OFFSET: Size = 0;

/// Offset of the signed 32-bit result
/// [ABI]
pub const CQE_RES_OFFSET: Size = 8;

/// Offset of the unsigned 32-bit flags
/// [ABI]
pub const CQE_FLAGS_OFFSET: Size = 12;

// =============================================================================
// COMPLETION FLAGS
// =============================================================================

/// Upper 16 bits of `flags` carry a provided-buffer id
pub const IORING_CQE_F_BUFFER: u32 = 1 << 0;

/// More completions will follow for the same request (multishot)
pub const IORING_CQE_F_MORE: u32 = 1 << 1;

/// Socket still has data to read after this receive
pub const IORING_CQE_F_SOCK_NONEMPTY: u32 = 1 << 2;

/// Zero-copy send notification rather than a send result
pub const IORING_CQE_F_NOTIF: u32 = 1 << 3;

/// Shift applied to `flags` to extract the provided-buffer id
pub const IORING_CQE_BUFFER_SHIFT: u32 = 16;

// =============================================================================
// RING SIZING
// =============================================================================

/// Default completion ring entries
/// The kernel sizes the completion ring at twice the submission ring
pub const DEFAULT_CQ_ENTRIES: u32 = 4096;

/// Largest completion ring the kernel accepts (IORING_MAX_CQ_ENTRIES)
pub const MAX_CQ_ENTRIES: u32 = 2 * 32768;

/// Default number of completions handed to one drain call by the event loop
pub const DEFAULT_BATCH_LIMIT: usize = 256;

/// Alignment of the simulated mapping (one cache line)
/// [PERF] Keeps head and tail off neighbouring allocations' lines
pub const RING_ALIGNMENT: Size = 64;
