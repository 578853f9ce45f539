/*!
 * Completion Records
 * Fixed-layout view over kernel completion entries plus the decoded value
 */

use crate::core::limits::{
    CQE_FLAGS_OFFSET, CQE_RES_OFFSET, CQE_SIZE, CQE_USER_DATA_OFFSET, IORING_CQE_BUFFER_SHIFT,
    IORING_CQE_F_BUFFER, IORING_CQE_F_MORE, IORING_CQE_F_NOTIF, IORING_CQE_F_SOCK_NONEMPTY,
};
use crate::core::types::{Cursor, UserData};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::mem::{align_of, offset_of, size_of};
use std::ptr::NonNull;

/// One completion record exactly as the kernel lays it out
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cqe {
    pub user_data: UserData,
    pub res: i32,
    pub flags: u32,
}

const _: () = assert!(size_of::<Cqe>() == CQE_SIZE);
const _: () = assert!(offset_of!(Cqe, user_data) == CQE_USER_DATA_OFFSET);
const _: () = assert!(offset_of!(Cqe, res) == CQE_RES_OFFSET);
const _: () = assert!(offset_of!(Cqe, flags) == CQE_FLAGS_OFFSET);
const _: () = assert!(align_of::<Cqe>() == 8);

impl Cqe {
    pub const fn new(user_data: UserData, res: i32, flags: u32) -> Self {
        Self {
            user_data,
            res,
            flags,
        }
    }

    /// Read the record at `cursor & mask`
    ///
    /// # Safety
    ///
    /// `entries` must point to an array of at least `mask + 1` records that
    /// stays mapped for the duration of the call, and the slot must have been
    /// published by the producer (tail observed past `cursor` with acquire).
    #[inline(always)]
    pub(crate) unsafe fn read(entries: NonNull<Cqe>, mask: u32, cursor: Cursor) -> Cqe {
        let slot = entries.as_ptr().add((cursor & mask) as usize);
        slot.read()
    }
}

/// Decoded completion, detached from shared memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Completion {
    /// Correlation token from the submission
    pub user_data: UserData,
    /// Non-negative success value or negated errno
    pub result: i32,
    /// Kernel completion flags
    pub flags: u32,
}

impl Completion {
    pub const fn new(result: i32, flags: u32, user_data: UserData) -> Self {
        Self {
            user_data,
            result,
            flags,
        }
    }

    /// Check if the operation failed
    pub fn is_error(&self) -> bool {
        self.result < 0
    }

    /// Error number if the operation failed
    pub fn errno(&self) -> Option<i32> {
        if self.result < 0 {
            Some(self.result.wrapping_neg())
        } else {
            None
        }
    }

    /// Map the result onto `std::io` conventions
    pub fn into_io_result(self) -> io::Result<u32> {
        match self.errno() {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(self.result as u32),
        }
    }

    /// More completions follow for the same request
    pub fn has_more(&self) -> bool {
        self.flags & IORING_CQE_F_MORE != 0
    }

    /// A provided buffer was selected for this completion
    pub fn has_buffer(&self) -> bool {
        self.flags & IORING_CQE_F_BUFFER != 0
    }

    /// Id of the selected provided buffer
    pub fn buffer_id(&self) -> Option<u16> {
        if self.has_buffer() {
            Some((self.flags >> IORING_CQE_BUFFER_SHIFT) as u16)
        } else {
            None
        }
    }

    /// Socket had more data queued after this receive
    pub fn sock_nonempty(&self) -> bool {
        self.flags & IORING_CQE_F_SOCK_NONEMPTY != 0
    }

    /// Zero-copy send notification
    pub fn is_notification(&self) -> bool {
        self.flags & IORING_CQE_F_NOTIF != 0
    }
}

impl From<Cqe> for Completion {
    fn from(cqe: Cqe) -> Self {
        Self::new(cqe.res, cqe.flags, cqe.user_data)
    }
}

impl From<Completion> for Cqe {
    fn from(completion: Completion) -> Self {
        Cqe::new(completion.user_data, completion.result, completion.flags)
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(res={}, flags={}, udata={})",
            self.result, self.flags, self.user_data
        )
    }
}
