// Copyright 2026 the Sediment Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Save-layer option flags.

use core::fmt;

/// Independent boolean options for a save-layer record, packed into one byte.
///
/// This is a value type: the `with_*` methods return a new value and never
/// allocate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SaveLayerOptions(u8);

impl SaveLayerOptions {
    const RENDERS_WITH_ATTRIBUTES: u8 = 1 << 0;
    const CAN_DISTRIBUTE_OPACITY: u8 = 1 << 1;

    /// No flags set.
    pub const NO_ATTRIBUTES: Self = Self(0);

    /// The layer is composited using the current attributes.
    pub const WITH_ATTRIBUTES: Self = Self(Self::RENDERS_WITH_ATTRIBUTES);

    /// Every flag set.
    pub const ALL: Self = Self(Self::RENDERS_WITH_ATTRIBUTES | Self::CAN_DISTRIBUTE_OPACITY);

    /// Whether the layer is composited with the current attributes.
    #[inline]
    #[must_use]
    pub const fn renders_with_attributes(self) -> bool {
        self.0 & Self::RENDERS_WITH_ATTRIBUTES != 0
    }

    /// Returns a copy with the renders-with-attributes flag set.
    #[inline]
    #[must_use]
    pub const fn with_renders_with_attributes(self) -> Self {
        Self(self.0 | Self::RENDERS_WITH_ATTRIBUTES)
    }

    /// Whether a group opacity applied to the layer may instead be applied
    /// to each of its children.
    #[inline]
    #[must_use]
    pub const fn can_distribute_opacity(self) -> bool {
        self.0 & Self::CAN_DISTRIBUTE_OPACITY != 0
    }

    /// Returns a copy with the can-distribute-opacity flag set.
    #[inline]
    #[must_use]
    pub const fn with_can_distribute_opacity(self) -> Self {
        Self(self.0 | Self::CAN_DISTRIBUTE_OPACITY)
    }

    /// Returns a copy with every optimization hint cleared.
    ///
    /// Only the renders-with-attributes flag changes rendering; the rest are
    /// hints computed by the recorder.
    #[inline]
    #[must_use]
    pub const fn without_optimizations(self) -> Self {
        Self(self.0 & Self::RENDERS_WITH_ATTRIBUTES)
    }

    #[inline]
    pub(crate) const fn bits(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub(crate) fn from_bits(bits: u32) -> Self {
        assert!(bits <= u32::from(Self::ALL.0), "invalid SaveLayerOptions bits {bits:#x}");
        #[expect(
            clippy::cast_possible_truncation,
            reason = "range checked by the assertion above"
        )]
        Self(bits as u8)
    }
}

impl fmt::Debug for SaveLayerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveLayerOptions")
            .field("renders_with_attributes", &self.renders_with_attributes())
            .field("can_distribute_opacity", &self.can_distribute_opacity())
            .finish()
    }
}
