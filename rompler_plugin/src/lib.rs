//! The processor a host embeds to run the device.
//!
//! [`Processor`] owns the engine and the ROM registry, builds the patch
//! catalog once at construction, and exposes the host-facing surface:
//! the program list, selection, persistent state save/restore, live
//! parameter edits and the per-block MIDI path.
//!
//! Program selection and state restore mutate the same engine memory
//! the audio callback reads, so hosts running a dedicated audio thread
//! must not call them concurrently with [`Processor::process_block`].
//! The [`ControlHandle`] exists for exactly that case: it queues
//! control-path requests, and the processor applies them at the top of
//! the next block, before any rendering touches the engine.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use wmidi::MidiMessage;

use rompler::catalog::Catalog;
use rompler::engine::Engine;
use rompler::rom::RomImageRegistry;
use rompler::sched::MidiScheduler;
use rompler::select::SelectionController;
use rompler::state::{PersistentState, StateError};
use rompler::sysex;

const DEFAULT_SAMPLE_RATE: f64 = 44_100.0;

/// Depth of the control-path command queue.
const COMMAND_QUEUE_LEN: usize = 32;

/// A control-path request applied on the audio thread between blocks.
pub enum Command {
    /// Select the program with this host program number.
    SelectProgram(i32),
    /// Restore a persisted state blob.
    LoadState(Vec<u8>),
    /// Send a live parameter edit to the engine.
    ParamChange {
        /// 21-bit engine register address.
        address: u32,
        /// Raw parameter value.
        value: u8,
    },
}

/// The embeddable device processor, generic over the engine it drives
/// (the emulator core in production, [`rompler::engine::RamEngine`] in
/// tests and engine-less hosts).
pub struct Processor<E: Engine> {
    engine: E,
    registry: Arc<RomImageRegistry>,
    catalog: Catalog,
    state: PersistentState,
    controller: SelectionController,
    sched: MidiScheduler,
    cmd_tx: SyncSender<Command>,
    cmd_rx: Receiver<Command>,
}

impl<E: Engine> Processor<E> {
    /// Build the processor around an engine instance and the registry.
    ///
    /// The catalog is scanned here, once; it is immutable afterwards.
    pub fn new(engine: E, registry: Arc<RomImageRegistry>) -> Self {
        let catalog = Catalog::build(&registry);
        let (cmd_tx, cmd_rx) = sync_channel(COMMAND_QUEUE_LEN);
        Self {
            engine,
            registry,
            catalog,
            state: PersistentState::default(),
            controller: SelectionController::new(),
            sched: MidiScheduler::new(DEFAULT_SAMPLE_RATE),
            cmd_tx,
            cmd_rx,
        }
    }

    /// The program catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Number of selectable programs.
    pub fn num_programs(&self) -> usize {
        self.catalog.len()
    }

    /// Program name for a host program number, if in range.
    pub fn program_name(&self, index: usize) -> Option<&str> {
        self.catalog.name(index)
    }

    /// The selected program number, if any.
    pub fn current_program(&self) -> Option<usize> {
        self.controller.current_program()
    }

    /// The in-memory device-configuration snapshot.
    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    /// Borrow the engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Borrow the engine mutably, e.g. for the host's render call.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Update the host sample rate used to rebase event offsets.
    pub fn set_sample_rate(&mut self, rate: f64) {
        self.sched.set_host_rate(rate);
    }

    /// Select a program.  Out-of-range numbers are ignored.
    pub fn select_program(&mut self, index: i32) {
        self.controller.select_program(
            index,
            &self.catalog,
            &self.registry,
            &mut self.engine,
            &mut self.state,
            &self.sched,
        );
    }

    /// Snapshot the device configuration for host persistence.
    pub fn save_state(&mut self) -> Vec<u8> {
        self.state.serialize(&self.engine)
    }

    /// Restore a persisted snapshot into the engine.
    pub fn load_state(&mut self, blob: &[u8]) -> Result<(), StateError> {
        self.state
            .deserialize(blob, &mut self.engine, &self.registry)
    }

    /// Send a single live parameter edit to the engine.
    pub fn send_param_change(&mut self, address: u32, value: u8) {
        let frame = sysex::encode_param_change(address, value);
        self.engine.enqueue_midi(&frame, 0);
    }

    /// A clonable handle for queueing control-path requests from
    /// outside the audio thread.
    pub fn control_handle(&self) -> ControlHandle {
        ControlHandle {
            tx: self.cmd_tx.clone(),
        }
    }

    /// Run one audio block's control work: apply pending control-path
    /// commands, then route the block's host-timed MIDI events into the
    /// engine queue in arrival order.
    pub fn process_block<'a>(&mut self, events: impl IntoIterator<Item = (u32, MidiMessage<'a>)>) {
        self.drain_commands();
        let drums = self.state.is_drums;
        for (host_offset, msg) in events {
            self.sched
                .dispatch(&mut self.engine, msg, host_offset, drums);
        }
    }

    fn drain_commands(&mut self) {
        loop {
            let cmd = match self.cmd_rx.try_recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            };
            match cmd {
                Command::SelectProgram(index) => self.select_program(index),
                Command::LoadState(blob) => {
                    if let Err(err) = self.load_state(&blob) {
                        log::error!("deferred state restore failed: {}", err);
                    }
                }
                Command::ParamChange { address, value } => self.send_param_change(address, value),
            }
        }
    }
}

/// Control-thread side of the command queue.
///
/// Requests are applied by the processor at the start of its next
/// block, keeping engine mutation off the rendering path.  A full queue
/// drops the request with a log entry rather than blocking a UI thread.
#[derive(Clone)]
pub struct ControlHandle {
    tx: SyncSender<Command>,
}

impl ControlHandle {
    /// Queue a program selection.
    pub fn select_program(&self, index: i32) {
        self.send(Command::SelectProgram(index));
    }

    /// Queue a state restore.
    pub fn load_state(&self, blob: Vec<u8>) {
        self.send(Command::LoadState(blob));
    }

    /// Queue a live parameter edit.
    pub fn param_change(&self, address: u32, value: u8) {
        self.send(Command::ParamChange { address, value });
    }

    fn send(&self, cmd: Command) {
        match self.tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("control command queue full, request dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("processor gone, control request dropped");
            }
        }
    }
}
