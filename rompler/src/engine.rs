//! The synthesis engine collaborator surface.
//!
//! The engine itself (sample generation, effects, the emulated device
//! firmware) lives outside this crate.  This module pins down the three
//! primitives the catalog/state layer needs from it - a blocking reset,
//! raw access to its non-volatile configuration memory, and an event
//! queue addressed in the engine's own sample clock - plus the byte
//! offsets of the NVRAM windows this crate writes into.  Those offsets
//! are a binary ABI contract with the engine and must not change.

/// Size of the engine's non-volatile configuration memory, in bytes.
pub const NVRAM_LEN: usize = 0x8000;

/// Size of one melodic patch record, in bytes.
pub const PATCH_LEN: usize = 0x16a;

/// Size of one drum kit record, in bytes.
pub const DRUM_LEN: usize = 0xa7c;

/// Size of the expansion waveform window: one full board image.
pub const EXPANSION_LEN: usize = 0x80_0000;

/// Fixed byte offsets into engine NVRAM.
pub mod nvram {
    /// Master tune byte.
    pub const MASTER_TUNE: usize = 0x00;
    /// Effect flag byte: bit 0 enables reverb, bit 1 enables chorus.
    pub const FX_FLAGS: usize = 0x02;
    /// Settings byte carrying the "settings last applied" flag.
    pub const SETTINGS: usize = 0x0d;
    /// Bit within [`SETTINGS`] marking that host settings were applied.
    pub const SETTINGS_APPLIED_BIT: u8 = 1 << 5;
    /// Mode flag byte: 0 selects drum mode, 1 melodic mode.
    pub const MODE: usize = 0x11;
    /// Start of the melodic patch window ([`super::PATCH_LEN`] bytes).
    pub const PATCH_WINDOW: usize = 0x0d70;
    /// Start of the drum kit window ([`super::DRUM_LEN`] bytes).
    pub const DRUM_WINDOW: usize = 0x67f0;
}

/// The black-box engine primitives used by this crate.
///
/// A reset blocks until the engine has re-read its NVRAM; every
/// configuration write this crate performs lands in the byte windows
/// described by the [`nvram`] offsets.
pub trait Engine: Send {
    /// Perform a full device reset, blocking until complete.
    fn reset(&mut self);
    /// The NVRAM window, [`NVRAM_LEN`] bytes.
    fn nvram(&self) -> &[u8];
    /// Mutable access to the NVRAM window.
    fn nvram_mut(&mut self) -> &mut [u8];
    /// The expansion waveform window, [`EXPANSION_LEN`] bytes.
    fn expansion_rom_mut(&mut self) -> &mut [u8];
    /// Queue a raw MIDI event at an engine-clock sample offset.
    fn enqueue_midi(&mut self, bytes: &[u8], offset: u64);
}

/// Copy a board's waveform image into the engine's expansion window.
///
/// Images shorter than the window leave the tail untouched.
pub fn load_expansion_image(engine: &mut dyn Engine, image: &[u8]) {
    let window = engine.expansion_rom_mut();
    let len = image.len().min(window.len());
    window[..len].copy_from_slice(&image[..len]);
}

/// A RAM-backed [`Engine`] stand-in.
///
/// Used by hosts that run without the emulator core linked in, and by
/// tests throughout this workspace.  NVRAM and the expansion window are
/// zero-filled; resets and queued events are recorded for inspection.
pub struct RamEngine {
    nvram: Box<[u8]>,
    expansion_rom: Box<[u8]>,
    events: Vec<(Vec<u8>, u64)>,
    resets: u32,
}

impl RamEngine {
    /// Create a stand-in engine with zeroed memory windows.
    pub fn new() -> Self {
        Self {
            nvram: vec![0u8; NVRAM_LEN].into_boxed_slice(),
            expansion_rom: vec![0u8; EXPANSION_LEN].into_boxed_slice(),
            events: Vec::new(),
            resets: 0,
        }
    }

    /// Number of resets performed since construction.
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Events queued so far, in arrival order.
    pub fn events(&self) -> &[(Vec<u8>, u64)] {
        &self.events
    }

    /// Forget all recorded events.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Read-only view of the expansion waveform window.
    pub fn expansion_rom(&self) -> &[u8] {
        &self.expansion_rom
    }
}

impl Default for RamEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for RamEngine {
    fn reset(&mut self) {
        self.resets += 1;
    }
    fn nvram(&self) -> &[u8] {
        &self.nvram
    }
    fn nvram_mut(&mut self) -> &mut [u8] {
        &mut self.nvram
    }
    fn expansion_rom_mut(&mut self) -> &mut [u8] {
        &mut self.expansion_rom
    }
    fn enqueue_midi(&mut self, bytes: &[u8], offset: u64) {
        self.events.push((bytes.to_vec(), offset));
    }
}
