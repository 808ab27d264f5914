//! Host-clock to engine-clock event scheduling and part routing.
//!
//! The engine runs on its own fixed internal sample clock, independent
//! of the host sample rate, and models a single active part per mode.
//! Host-timed control events are therefore rebased onto the engine
//! clock and rewritten onto the fixed part channel before they are
//! queued.  Events are forwarded in host arrival order; equal computed
//! offsets keep their original relative order.

use wmidi::{Channel, MidiMessage};

use crate::engine::Engine;

/// The engine's fixed internal sample clock, in Hz.
pub const ENGINE_CLOCK_HZ: u32 = 64_000;

/// MIDI channel carrying the percussion part.
pub const DRUM_CHANNEL: Channel = Channel::Ch10;

/// MIDI channel carrying the melodic part.
pub const MELODIC_CHANNEL: Channel = Channel::Ch1;

/// Converts host-buffer-relative offsets and routes events into the
/// engine's event queue.
#[derive(Debug, Clone, Copy)]
pub struct MidiScheduler {
    host_rate: f64,
}

impl MidiScheduler {
    /// Create a scheduler for the given host sample rate, in Hz.
    pub fn new(host_rate: f64) -> Self {
        Self {
            host_rate: host_rate.max(1.0),
        }
    }

    /// Update the host sample rate.  Non-positive rates are ignored.
    pub fn set_host_rate(&mut self, rate: f64) {
        if rate > 0.0 {
            self.host_rate = rate;
        } else {
            log::warn!("ignoring non-positive host sample rate {}", rate);
        }
    }

    /// The current host sample rate, in Hz.
    pub fn host_rate(&self) -> f64 {
        self.host_rate
    }

    /// Rebase a host-buffer-relative sample offset onto the engine clock.
    pub fn engine_offset(&self, host_offset: u32) -> u64 {
        (f64::from(host_offset) / self.host_rate * f64::from(ENGINE_CLOCK_HZ)) as u64
    }

    /// The fixed part channel for the current mode.
    pub fn part_channel(drums: bool) -> Channel {
        if drums {
            DRUM_CHANNEL
        } else {
            MELODIC_CHANNEL
        }
    }

    /// Route one host-timed message into the engine's event queue.
    pub fn dispatch(
        &self,
        engine: &mut dyn Engine,
        msg: MidiMessage<'_>,
        host_offset: u32,
        drums: bool,
    ) {
        let routed = with_channel(msg, Self::part_channel(drums));
        let offset = self.engine_offset(host_offset);
        let mut inline = [0u8; 64];
        match routed.copy_to_slice(&mut inline) {
            Ok(len) => engine.enqueue_midi(&inline[..len], offset),
            Err(_) => {
                // oversized system-exclusive payload
                let mut bytes = vec![0u8; routed.bytes_size()];
                if let Ok(len) = routed.copy_to_slice(&mut bytes) {
                    engine.enqueue_midi(&bytes[..len], offset);
                }
            }
        }
    }
}

/// Rewrite the channel of a channel-voice message.  System messages
/// carry no channel and pass through unchanged.
pub fn with_channel(msg: MidiMessage<'_>, channel: Channel) -> MidiMessage<'_> {
    use MidiMessage::*;
    match msg {
        NoteOff(_, note, velocity) => NoteOff(channel, note, velocity),
        NoteOn(_, note, velocity) => NoteOn(channel, note, velocity),
        PolyphonicKeyPressure(_, note, pressure) => PolyphonicKeyPressure(channel, note, pressure),
        ControlChange(_, function, value) => ControlChange(channel, function, value),
        ProgramChange(_, program) => ProgramChange(channel, program),
        ChannelPressure(_, pressure) => ChannelPressure(channel, pressure),
        PitchBendChange(_, bend) => PitchBendChange(channel, bend),
        other => other,
    }
}
