//! Negative results of the system-call boundary.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Enum representing the errors a system call can return.
///
/// Each variant corresponds to one negative result the kernel can hand
/// back across the boundary. On the wire these are small negative
/// integers; [`SysError::code`] and the `TryFrom<isize>` impl convert in
/// both directions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(isize)]
pub enum SysError {
    /// No environment slot is free; creating a child context failed.
    NoFreeEnv = -1,
    /// No physical frame is free.
    NoMemory = -2,
    /// An address argument is not page-aligned, not canonical, or not in
    /// the user range.
    BadAddress = -3,
    /// A permission argument requests bits the caller may not set, or
    /// omits bits a user mapping must carry.
    InvalidPermission = -4,
    /// The named address has no mapping to operate on.
    NoSuchMapping = -5,
    /// The named environment does not exist or is not one the caller may
    /// manipulate.
    BadEnvironment = -6,
    /// The requested operation exists in the interface but is not
    /// provided by this implementation.
    NotImplemented = -7,
}

impl SysError {
    /// The raw negative code of this error, as it crosses the boundary.
    #[inline]
    pub fn code(self) -> isize {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for e in [
            SysError::NoFreeEnv,
            SysError::NoMemory,
            SysError::BadAddress,
            SysError::InvalidPermission,
            SysError::NoSuchMapping,
            SysError::BadEnvironment,
            SysError::NotImplemented,
        ] {
            assert!(e.code() < 0);
            assert_eq!(SysError::try_from(e.code()), Ok(e));
        }
        assert!(SysError::try_from(0isize).is_err());
    }
}
