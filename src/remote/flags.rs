//! Open flags understood by the remote client

use crate::error::{invalid_argument, Result};
use std::fmt;
use std::ops::BitOr;

/// Flags passed to [`super::RemoteSession::open_file`]
///
/// Bit values match the ones callers historically pass through to the client
/// library. The low two bits select the access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading
    pub const RDONLY: Self = Self(0x0000);
    /// Open for writing
    pub const WRONLY: Self = Self(0x0001);
    /// Open for reading and writing (most remote stores reject this)
    pub const RDWR: Self = Self(0x0002);
    /// Append to an existing file
    pub const APPEND: Self = Self(0x0008);
    /// Create the file if missing
    pub const CREATE: Self = Self(0x0200);
    /// Truncate an existing file
    pub const TRUNCATE: Self = Self(0x0400);

    const ACCESS_MASK: u32 = 0x0003;
    const KNOWN: u32 = 0x0003 | 0x0008 | 0x0200 | 0x0400;

    /// Validate raw flag bits
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if unknown bits are set or the access mode is
    /// not one of read, write or read-write.
    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::KNOWN != 0 {
            return Err(invalid_argument(format!("unknown open flag bits {bits:#06x}")));
        }
        if bits & Self::ACCESS_MASK == Self::ACCESS_MASK {
            return Err(invalid_argument(format!("invalid access mode in {bits:#06x}")));
        }
        Ok(Self(bits))
    }

    /// Check flags assembled with `|`, which can combine conflicting modes
    ///
    /// # Errors
    ///
    /// Same as [`OpenFlags::from_bits`].
    pub fn validate(self) -> Result<Self> {
        Self::from_bits(self.0)
    }

    /// Raw bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Read-only access (no write bit set)
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        self.0 & Self::ACCESS_MASK == 0
    }

    /// Write-only access
    #[must_use]
    pub const fn is_write_only(self) -> bool {
        self.0 & Self::ACCESS_MASK == Self::WRONLY.0
    }

    /// Read-write access
    #[must_use]
    pub const fn is_read_write(self) -> bool {
        self.0 & Self::ACCESS_MASK == Self::RDWR.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x0000, true)]
    #[case(0x0001, true)]
    #[case(0x0002, true)]
    #[case(0x0201, true)]
    #[case(0x0609, true)]
    #[case(0x0003, false)]
    #[case(0x0010, false)]
    #[case(0x8001, false)]
    fn test_from_bits_validation(#[case] bits: u32, #[case] valid: bool) {
        assert_eq!(OpenFlags::from_bits(bits).is_ok(), valid, "bits {bits:#x}");
    }

    #[test]
    fn test_validate_rejects_conflicting_modes() {
        assert!((OpenFlags::WRONLY | OpenFlags::RDWR).validate().is_err());
        let flags = OpenFlags::WRONLY | OpenFlags::CREATE;
        assert_eq!(flags.validate().unwrap(), flags);
    }

    #[test]
    fn test_access_modes() {
        assert!(OpenFlags::RDONLY.is_read_only());
        assert!((OpenFlags::WRONLY | OpenFlags::CREATE).is_write_only());
        assert!(OpenFlags::RDWR.is_read_write());
        assert!(!(OpenFlags::WRONLY | OpenFlags::APPEND).is_read_only());
    }

    #[test]
    fn test_contains_and_display() {
        let flags = OpenFlags::WRONLY | OpenFlags::CREATE | OpenFlags::APPEND;
        assert!(flags.contains(OpenFlags::APPEND));
        assert!(!flags.contains(OpenFlags::TRUNCATE));
        assert_eq!(flags.to_string(), "0x0209");
    }
}
