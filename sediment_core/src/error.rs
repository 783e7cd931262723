// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for record storage.

use core::fmt;

/// Errors from growing a [`Storage`](crate::storage::Storage).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The allocator could not provide the requested capacity.
    AllocationFailed {
        /// Capacity in bytes that was requested.
        requested: usize,
        /// Capacity in bytes held before the request.
        allocated: usize,
    },
    /// The requested capacity does not fit in `usize`.
    CapacityOverflow,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed {
                requested,
                allocated,
            } => write!(
                f,
                "failed to grow record storage from {allocated} to {requested} bytes"
            ),
            Self::CapacityOverflow => f.write_str("record storage capacity overflow"),
        }
    }
}

impl core::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_mentions_sizes() {
        let e = StorageError::AllocationFailed {
            requested: 8192,
            allocated: 4096,
        };
        assert_eq!(
            e.to_string(),
            "failed to grow record storage from 4096 to 8192 bytes"
        );
        assert_eq!(
            StorageError::CapacityOverflow.to_string(),
            "record storage capacity overflow"
        );
    }
}
