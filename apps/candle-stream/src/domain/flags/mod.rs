//! Event Flags
//!
//! Decodes the upstream `eventFlags` bitmask into named signals. The bits
//! are independent; any combination may be set on a single event.
//!
//! | Bit    | Signal           | Used by                 |
//! |--------|------------------|-------------------------|
//! | `0x01` | `TX_PENDING`     | diagnostics only        |
//! | `0x02` | `REMOVE_EVENT`   | series store (tombstone)|
//! | `0x04` | `SNAPSHOT_BEGIN` | snapshot gate           |
//! | `0x08` | `SNAPSHOT_END`   | snapshot gate           |
//! | `0x10` | `SNAPSHOT_SNIP`  | diagnostics only        |
//! | `0x40` | `SNAPSHOT_MODE`  | diagnostics only        |

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask of upstream event flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFlags(u32);

impl EventFlags {
    /// Transaction is incomplete; more events of the same transaction follow.
    pub const TX_PENDING: Self = Self(0x1);
    /// The event removes the record at its key.
    pub const REMOVE: Self = Self(0x2);
    /// First event of a snapshot batch.
    pub const SNAPSHOT_BEGIN: Self = Self(0x4);
    /// Last event of a snapshot batch.
    pub const SNAPSHOT_END: Self = Self(0x8);
    /// Snapshot was truncated upstream.
    pub const SNAPSHOT_SNIP: Self = Self(0x10);
    /// Snapshot mode is active for the subscription.
    pub const SNAPSHOT_MODE: Self = Self(0x40);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::TX_PENDING, "TX_PENDING"),
        (Self::REMOVE, "REMOVE_EVENT"),
        (Self::SNAPSHOT_BEGIN, "SNAPSHOT_BEGIN"),
        (Self::SNAPSHOT_END, "SNAPSHOT_END"),
        (Self::SNAPSHOT_SNIP, "SNAPSHOT_SNIP"),
        (Self::SNAPSHOT_MODE, "SNAPSHOT_MODE"),
    ];

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap a raw upstream bitmask. Unknown bits are kept.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `TX_PENDING` is set.
    #[must_use]
    pub const fn is_tx_pending(self) -> bool {
        self.contains(Self::TX_PENDING)
    }

    /// `REMOVE_EVENT` is set.
    #[must_use]
    pub const fn is_remove(self) -> bool {
        self.contains(Self::REMOVE)
    }

    /// `SNAPSHOT_BEGIN` is set.
    #[must_use]
    pub const fn is_snapshot_begin(self) -> bool {
        self.contains(Self::SNAPSHOT_BEGIN)
    }

    /// `SNAPSHOT_END` is set.
    #[must_use]
    pub const fn is_snapshot_end(self) -> bool {
        self.contains(Self::SNAPSHOT_END)
    }

    /// `SNAPSHOT_SNIP` is set.
    #[must_use]
    pub const fn is_snapshot_snip(self) -> bool {
        self.contains(Self::SNAPSHOT_SNIP)
    }

    /// `SNAPSHOT_MODE` is set.
    #[must_use]
    pub const fn is_snapshot_mode(self) -> bool {
        self.contains(Self::SNAPSHOT_MODE)
    }

    /// Names of the active known flags, in bit order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMED
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl From<u32> for EventFlags {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for name in self.names() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }
        if first {
            write!(f, "{:#x}", self.0)?;
        }
        Ok(())
    }
}
