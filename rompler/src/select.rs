//! Program selection.
//!
//! Maps a host program number onto engine NVRAM writes and decides when
//! a full device reset is unavoidable.  Three costs are distinguished,
//! cheapest first: a live program-change message (melodic-to-melodic
//! switch in melodic mode), a reset (any mode transition, any drum kit),
//! and a multi-megabyte waveform copy plus reset (expansion board
//! switch).

use wmidi::{MidiMessage, U7};

use crate::catalog::Catalog;
use crate::engine::{load_expansion_image, nvram, Engine};
use crate::rom::RomImageRegistry;
use crate::sched::{MidiScheduler, MELODIC_CHANNEL};
use crate::state::PersistentState;

/// Selection state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// No program selected since construction.
    #[default]
    None,
    /// The catalog index of the selected program.
    Program(usize),
}

/// The program-selection state machine.
#[derive(Debug, Default)]
pub struct SelectionController {
    selection: Selection,
}

impl SelectionController {
    /// A controller with no program selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// The selected catalog index, if any.
    pub fn current_program(&self) -> Option<usize> {
        match self.selection {
            Selection::None => None,
            Selection::Program(index) => Some(index),
        }
    }

    /// Select the program at `index`.
    ///
    /// An out-of-range index (negative or past the end of the catalog)
    /// is ignored: invalid program numbers from a host control surface
    /// must not disrupt playback.
    pub fn select_program(
        &mut self,
        index: i32,
        catalog: &Catalog,
        registry: &RomImageRegistry,
        engine: &mut dyn Engine,
        state: &mut PersistentState,
        sched: &MidiScheduler,
    ) {
        if index < 0 {
            return;
        }
        let record = match catalog.get(index as usize) {
            Some(record) => record,
            None => return,
        };

        // Board switch: copy the target board's waveforms and reset.
        // Skipped whenever the expansion is unchanged; records without
        // an expansion never unload the current board.
        if let Some(slot) = record.expansion {
            if state.current_expansion != Some(slot) {
                let image = match registry.expansion(slot as usize) {
                    Ok(image) => image,
                    Err(err) => {
                        log::error!("cannot select program {}: {}", index, err);
                        return;
                    }
                };
                log::debug!("loading expansion {} waveforms", slot);
                load_expansion_image(engine, image.waveforms());
                state.current_expansion = Some(slot);
                engine.reset();
            }
        }

        let bytes = match registry.resolve(record.source, record.offset, record.len) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("cannot select program {}: {}", index, err);
                return;
            }
        };

        if record.is_drum_kit {
            state.is_drums = true;
            let nv = engine.nvram_mut();
            nv[nvram::MODE] = 0;
            nv[nvram::DRUM_WINDOW..nvram::DRUM_WINDOW + record.len].copy_from_slice(bytes);
            state.drums.copy_from_slice(bytes);
            // drum kit activation is reset-equivalent on this engine
            engine.reset();
        } else {
            state.is_drums = false;
            if engine.nvram()[nvram::MODE] != 1 {
                // first transition into melodic mode
                let nv = engine.nvram_mut();
                nv[nvram::MODE] = 1;
                nv[nvram::PATCH_WINDOW..nvram::PATCH_WINDOW + record.len].copy_from_slice(bytes);
                state.patch.copy_from_slice(bytes);
                engine.reset();
            } else {
                let nv = engine.nvram_mut();
                nv[nvram::PATCH_WINDOW..nvram::PATCH_WINDOW + record.len].copy_from_slice(bytes);
                state.patch.copy_from_slice(bytes);
                // already in melodic mode: a live program change picks
                // the rewritten patch window up without a reset
                let msg = MidiMessage::ProgramChange(MELODIC_CHANNEL, U7::from_u8_lossy(0));
                sched.dispatch(engine, msg, 0, false);
            }
        }

        self.selection = Selection::Program(index as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, RamEngine, DRUM_LEN, PATCH_LEN};
    use crate::rom::ExpansionImage;

    // Minimal base ROM covering the three internal bank tables.
    fn base_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x20000];
        // distinguishable record contents for the mirrors
        rom[0x008ce0] = 0x51; // User patch 0
        rom[0x008ce0 + PATCH_LEN] = 0x52; // User patch 1
        rom[0x00e760] = 0x61; // User drum kit
        rom
    }

    fn expansion_image() -> Vec<u8> {
        let patch_table = 0x100usize;
        let mut image = vec![0u8; patch_table + 2 * PATCH_LEN + DRUM_LEN];
        image[0x66..0x68].copy_from_slice(&2u16.to_be_bytes());
        image[0x68..0x6a].copy_from_slice(&1u16.to_be_bytes());
        image[0x8c..0x90].copy_from_slice(&(patch_table as u32).to_be_bytes());
        image[0x90..0x94].copy_from_slice(&((patch_table + 2 * PATCH_LEN) as u32).to_be_bytes());
        image[patch_table] = b'E'; // valid name byte doubles as content
        image
    }

    struct Fixture {
        catalog: Catalog,
        registry: RomImageRegistry,
        engine: RamEngine,
        state: PersistentState,
        sched: MidiScheduler,
        controller: SelectionController,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = RomImageRegistry::new(base_rom());
            registry
                .insert_expansion(3, ExpansionImage::new(expansion_image()))
                .unwrap();
            let catalog = Catalog::build(&registry);
            Self {
                catalog,
                registry,
                engine: RamEngine::new(),
                state: PersistentState::default(),
                sched: MidiScheduler::new(48_000.0),
                controller: SelectionController::new(),
            }
        }

        fn select(&mut self, index: i32) {
            self.controller.select_program(
                index,
                &self.catalog,
                &self.registry,
                &mut self.engine,
                &mut self.state,
                &self.sched,
            );
        }
    }

    #[test]
    fn out_of_range_is_a_no_op() {
        let mut fx = Fixture::new();
        let nvram_before = fx.engine.nvram().to_vec();
        let state_before = fx.state.to_bytes();
        fx.select(-1);
        fx.select(fx.catalog.len() as i32);
        assert_eq!(fx.engine.nvram(), &nvram_before[..]);
        assert_eq!(fx.state.to_bytes(), state_before);
        assert_eq!(fx.engine.resets(), 0);
        assert!(fx.engine.events().is_empty());
        assert_eq!(fx.controller.current_program(), None);
    }

    #[test]
    fn first_melodic_selection_resets_then_switches_live() {
        let mut fx = Fixture::new();
        fx.select(0);
        assert_eq!(fx.engine.resets(), 1);
        assert_eq!(fx.engine.nvram()[nvram::MODE], 1);
        assert_eq!(fx.engine.nvram()[nvram::PATCH_WINDOW], 0x51);
        assert_eq!(fx.state.patch[0], 0x51);
        assert!(!fx.state.is_drums);
        assert!(fx.engine.events().is_empty());
        assert_eq!(fx.controller.current_program(), Some(0));

        // same mode: no further reset, live program change instead
        fx.select(1);
        assert_eq!(fx.engine.resets(), 1);
        assert_eq!(fx.engine.nvram()[nvram::PATCH_WINDOW], 0x52);
        assert_eq!(fx.engine.events().len(), 1);
        let (bytes, offset) = &fx.engine.events()[0];
        assert_eq!(bytes, &vec![0xc0, 0x00]);
        assert_eq!(*offset, 0);
        assert_eq!(fx.controller.current_program(), Some(1));
    }

    #[test]
    fn reselecting_the_same_patch_does_not_reset_again() {
        let mut fx = Fixture::new();
        fx.select(0);
        fx.select(0);
        assert_eq!(fx.engine.resets(), 1);
        assert_eq!(fx.engine.events().len(), 1);
    }

    #[test]
    fn drum_kit_always_resets() {
        let mut fx = Fixture::new();
        fx.select(64); // Internal User drum kit
        assert_eq!(fx.engine.resets(), 1);
        assert_eq!(fx.engine.nvram()[nvram::MODE], 0);
        assert_eq!(fx.engine.nvram()[nvram::DRUM_WINDOW], 0x61);
        assert_eq!(fx.state.drums[0], 0x61);
        assert!(fx.state.is_drums);

        fx.select(64);
        assert_eq!(fx.engine.resets(), 2);
    }

    #[test]
    fn expansion_switch_loads_waveforms_once() {
        let mut fx = Fixture::new();
        let first_expansion_program = (3 * 65) as i32;

        fx.select(first_expansion_program);
        // board switch reset + melodic mode transition reset
        assert_eq!(fx.engine.resets(), 2);
        assert_eq!(fx.state.current_expansion, Some(3));
        // header bytes of the board image landed in the waveform window
        assert_eq!(&fx.engine.expansion_rom()[0x66..0x68], &2u16.to_be_bytes());

        // second patch on the same board: no copy, no reset
        fx.select(first_expansion_program + 1);
        assert_eq!(fx.engine.resets(), 2);
        assert_eq!(fx.engine.events().len(), 1);
    }

    #[test]
    fn internal_selection_keeps_the_loaded_board() {
        let mut fx = Fixture::new();
        fx.select((3 * 65) as i32);
        assert_eq!(fx.state.current_expansion, Some(3));
        let resets = fx.engine.resets();

        fx.select(0); // internal patch: board stays loaded
        assert_eq!(fx.state.current_expansion, Some(3));
        assert_eq!(fx.engine.resets(), resets);
    }
}
