//! Bit-exact persistent snapshot of device configuration.
//!
//! The host persists an opaque blob between sessions; its layout is
//! fixed and byte-exact, so restore rejects anything that is not
//! exactly [`STATE_LEN`] bytes.  The snapshot stores the *index* of the
//! selected expansion board, not its image - the registry must still
//! hold that image at restore time.

use thiserror::Error;

use crate::engine::{load_expansion_image, nvram, Engine, DRUM_LEN, PATCH_LEN};
use crate::rom::RomImageRegistry;

/// Serialized size of a [`PersistentState`] blob:
/// tune, reverb, chorus, expansion index (i32), mode, patch and drum
/// window mirrors.  No padding is tolerated.
pub const STATE_LEN: usize = 1 + 1 + 1 + 4 + 1 + PATCH_LEN + DRUM_LEN;

/// Errors from the persistent-state codec.
#[derive(Debug, Error)]
pub enum StateError {
    /// The blob is not exactly [`STATE_LEN`] bytes.
    #[error("state blob is {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Required blob size.
        expected: usize,
        /// Size of the blob offered.
        actual: usize,
    },
    /// The snapshot names an expansion the registry does not hold.
    #[error("persisted expansion {0} is not present in the registry")]
    MissingExpansion(u8),
}

/// The device-configuration snapshot kept in sync with engine NVRAM.
#[derive(Clone)]
pub struct PersistentState {
    /// Master tune byte.
    pub master_tune: i8,
    /// Reverb effect enabled.
    pub reverb_enabled: bool,
    /// Chorus effect enabled.
    pub chorus_enabled: bool,
    /// Currently loaded expansion board slot.
    pub current_expansion: Option<u8>,
    /// True while a drum kit is the active program.
    pub is_drums: bool,
    /// Mirror of the engine's melodic patch window.
    pub patch: [u8; PATCH_LEN],
    /// Mirror of the engine's drum kit window.
    pub drums: [u8; DRUM_LEN],
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            master_tune: 0,
            reverb_enabled: false,
            chorus_enabled: false,
            current_expansion: None,
            is_drums: false,
            patch: [0u8; PATCH_LEN],
            drums: [0u8; DRUM_LEN],
        }
    }
}

impl PersistentState {
    /// Pack the snapshot into its fixed little-endian layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(STATE_LEN);
        blob.push(self.master_tune as u8);
        blob.push(self.reverb_enabled as u8);
        blob.push(self.chorus_enabled as u8);
        let expansion: i32 = match self.current_expansion {
            Some(slot) => i32::from(slot),
            None => -1,
        };
        blob.extend_from_slice(&expansion.to_le_bytes());
        blob.push(self.is_drums as u8);
        blob.extend_from_slice(&self.patch);
        blob.extend_from_slice(&self.drums);
        debug_assert_eq!(blob.len(), STATE_LEN);
        blob
    }

    /// Decode a blob, requiring the exact serialized size.
    pub fn from_bytes(blob: &[u8]) -> Result<Self, StateError> {
        if blob.len() != STATE_LEN {
            return Err(StateError::SizeMismatch {
                expected: STATE_LEN,
                actual: blob.len(),
            });
        }
        let expansion = i32::from_le_bytes([blob[3], blob[4], blob[5], blob[6]]);
        let mut state = Self {
            master_tune: blob[0] as i8,
            reverb_enabled: blob[1] != 0,
            chorus_enabled: blob[2] != 0,
            current_expansion: u8::try_from(expansion).ok(),
            is_drums: blob[7] != 0,
            patch: [0u8; PATCH_LEN],
            drums: [0u8; DRUM_LEN],
        };
        state.patch.copy_from_slice(&blob[8..8 + PATCH_LEN]);
        state.drums.copy_from_slice(&blob[8 + PATCH_LEN..]);
        Ok(state)
    }

    /// Refresh the NVRAM-owned fields from the engine and serialize.
    pub fn serialize(&mut self, engine: &dyn Engine) -> Vec<u8> {
        let nv = engine.nvram();
        self.master_tune = nv[nvram::MASTER_TUNE] as i8;
        self.reverb_enabled = nv[nvram::FX_FLAGS] & 0x01 != 0;
        self.chorus_enabled = nv[nvram::FX_FLAGS] & 0x02 != 0;
        self.to_bytes()
    }

    /// Decode `blob` and push the snapshot into the engine.
    ///
    /// Fails with [`StateError::SizeMismatch`] on a wrong-sized blob, in
    /// which case the prior state is left untouched.
    pub fn deserialize(
        &mut self,
        blob: &[u8],
        engine: &mut dyn Engine,
        registry: &RomImageRegistry,
    ) -> Result<(), StateError> {
        *self = Self::from_bytes(blob)?;
        self.apply(engine, registry)
    }

    /// Write every persisted field into engine NVRAM and reload the
    /// persisted expansion's waveform image from the registry.
    ///
    /// The engine's "settings last applied" flag is forced so the next
    /// reset picks the restored configuration up.
    pub fn apply(
        &self,
        engine: &mut dyn Engine,
        registry: &RomImageRegistry,
    ) -> Result<(), StateError> {
        let nv = engine.nvram_mut();
        nv[nvram::SETTINGS] |= nvram::SETTINGS_APPLIED_BIT;
        nv[nvram::MASTER_TUNE] = self.master_tune as u8;
        nv[nvram::FX_FLAGS] = self.reverb_enabled as u8 | (self.chorus_enabled as u8) << 1;
        nv[nvram::MODE] = if self.is_drums { 0 } else { 1 };
        nv[nvram::DRUM_WINDOW..nvram::DRUM_WINDOW + DRUM_LEN].copy_from_slice(&self.drums);
        nv[nvram::PATCH_WINDOW..nvram::PATCH_WINDOW + PATCH_LEN].copy_from_slice(&self.patch);

        if let Some(slot) = self.current_expansion {
            let image = registry.expansion(slot as usize).map_err(|err| {
                log::error!("state restore: {}", err);
                StateError::MissingExpansion(slot)
            })?;
            load_expansion_image(engine, image.waveforms());
        }
        Ok(())
    }
}
