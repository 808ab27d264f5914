//! Read-only ROM image registry.
//!
//! Owns the byte spans the rest of the crate reads patch data from: the
//! base device ROM and up to [`EXPANSION_SLOTS`] pluggable board images.
//! Images are reference-counted and live for the registry's lifetime, so
//! catalog records can refer into them with `(ImageId, offset, length)`
//! tuples instead of raw pointers.

use std::sync::Arc;

use thiserror::Error;

/// Number of expansion board slots.
pub const EXPANSION_SLOTS: usize = 20;

/// Identifies which registry-owned image a byte span lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageId {
    /// The base device ROM.
    BaseRom,
    /// The waveform image of the board in the given slot.
    Expansion(u8),
    /// The companion patch-table image of the board in the given slot.
    ExpansionPatchTable(u8),
}

/// Errors from registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The slot index is outside the fixed slot set.
    #[error("expansion slot {0} outside the fixed 0..20 slot set")]
    OutOfRange(usize),
    /// The slot exists but no board image was registered in it.
    #[error("expansion slot {0} is not populated")]
    Empty(usize),
    /// A byte span does not fit inside its image.
    #[error("span {offset:#x}+{len:#x} exceeds {image:?} ({image_len:#x} bytes)")]
    OutOfBounds {
        /// Image the span was resolved against.
        image: ImageId,
        /// Span start offset.
        offset: usize,
        /// Span length.
        len: usize,
        /// Actual image size.
        image_len: usize,
    },
}

/// One expansion board: its waveform image plus, for boards that ship
/// their patch data separately, a companion patch-table image.
#[derive(Clone)]
pub struct ExpansionImage {
    waveforms: Arc<[u8]>,
    patch_table: Option<Arc<[u8]>>,
}

impl ExpansionImage {
    /// A board whose patch tables live inside the waveform image.
    pub fn new(waveforms: impl Into<Arc<[u8]>>) -> Self {
        Self {
            waveforms: waveforms.into(),
            patch_table: None,
        }
    }

    /// A board with a separate patch-table dump.
    pub fn with_patch_table(
        waveforms: impl Into<Arc<[u8]>>,
        patch_table: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            waveforms: waveforms.into(),
            patch_table: Some(patch_table.into()),
        }
    }

    /// The full waveform image copied into the engine on board switch.
    pub fn waveforms(&self) -> &[u8] {
        &self.waveforms
    }

    /// The image holding the board's patch and drum tables.
    pub fn tables(&self) -> &[u8] {
        self.patch_table.as_deref().unwrap_or(&self.waveforms)
    }

    /// True if the board ships its tables in a companion image.
    pub fn has_patch_table(&self) -> bool {
        self.patch_table.is_some()
    }
}

/// Owns the base ROM and the expansion slot array.  Pure lookup.
pub struct RomImageRegistry {
    base_rom: Arc<[u8]>,
    expansions: [Option<ExpansionImage>; EXPANSION_SLOTS],
}

impl RomImageRegistry {
    /// Create a registry holding only the base ROM.
    pub fn new(base_rom: impl Into<Arc<[u8]>>) -> Self {
        Self {
            base_rom: base_rom.into(),
            expansions: Default::default(),
        }
    }

    /// Register a board image in `slot`.
    pub fn insert_expansion(
        &mut self,
        slot: usize,
        image: ExpansionImage,
    ) -> Result<(), RegistryError> {
        let entry = self
            .expansions
            .get_mut(slot)
            .ok_or(RegistryError::OutOfRange(slot))?;
        *entry = Some(image);
        Ok(())
    }

    /// The base device ROM.
    pub fn base_rom(&self) -> &[u8] {
        &self.base_rom
    }

    /// Look up the board in `slot`.
    pub fn expansion(&self, slot: usize) -> Result<&ExpansionImage, RegistryError> {
        self.expansions
            .get(slot)
            .ok_or(RegistryError::OutOfRange(slot))?
            .as_ref()
            .ok_or(RegistryError::Empty(slot))
    }

    /// Populated slots in ascending order - the catalog discovery order.
    pub fn populated(&self) -> impl Iterator<Item = (u8, &ExpansionImage)> {
        self.expansions
            .iter()
            .enumerate()
            .filter_map(|(slot, image)| image.as_ref().map(|img| (slot as u8, img)))
    }

    /// Resolve a non-owning record reference to its bytes.
    pub fn resolve(
        &self,
        image: ImageId,
        offset: usize,
        len: usize,
    ) -> Result<&[u8], RegistryError> {
        let bytes = match image {
            ImageId::BaseRom => self.base_rom(),
            ImageId::Expansion(slot) => self.expansion(slot as usize)?.waveforms(),
            ImageId::ExpansionPatchTable(slot) => self.expansion(slot as usize)?.tables(),
        };
        bytes
            .get(offset..offset.saturating_add(len))
            .ok_or(RegistryError::OutOfBounds {
                image,
                offset,
                len,
                image_len: bytes.len(),
            })
    }
}
