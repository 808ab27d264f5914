//! Patch catalog and device-state synchronization for a ROM-playback
//! synthesizer.
//!
//! This crate is the data layer between a host and a stateful synthesis
//! engine: it decodes the proprietary fixed-offset layouts of the base
//! device ROM and pluggable expansion-board dumps into a selectable
//! program catalog, drives the engine's non-volatile memory when a
//! program is selected, keeps a bit-exact persistent snapshot of the
//! device configuration, and rebases host-timed control events onto the
//! engine's internal sample clock.
//!
//! The engine itself is an external collaborator reached through the
//! [`engine::Engine`] trait; nothing in this crate generates audio.
//! Hosts embed the higher-level processor from the `rompler_plugin`
//! crate rather than wiring these modules together by hand.

#![warn(missing_docs)]

pub mod catalog;
pub mod engine;
pub mod rom;
pub mod sched;
pub mod select;
pub mod state;
pub mod sysex;

pub use catalog::{Catalog, PatchRecord};
pub use engine::Engine;
pub use rom::{ExpansionImage, ImageId, RegistryError, RomImageRegistry};
pub use sched::MidiScheduler;
pub use select::{Selection, SelectionController};
pub use state::{PersistentState, StateError};
