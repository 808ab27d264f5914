//! End-to-end checks of the processor against the RAM-backed engine.

use std::sync::Arc;

use wmidi::{Channel, MidiMessage, Note, U7};

use rompler::engine::{nvram, Engine, RamEngine, DRUM_LEN, PATCH_LEN};
use rompler::rom::{ExpansionImage, RomImageRegistry};
use rompler::state::STATE_LEN;
use rompler_plugin::Processor;

const INTERNAL_PROGRAMS: usize = 3 * 65;

fn write_name(image: &mut [u8], offset: usize, name: &str) {
    image[offset..offset + name.len()].copy_from_slice(name.as_bytes());
}

fn base_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x20000];
    let user_bank = 0x008ce0;
    write_name(&mut rom, user_bank, "Init Pno");
    write_name(&mut rom, user_bank + PATCH_LEN, "Strings");
    rom
}

fn expansion_image(marker: u8) -> Vec<u8> {
    let patch_table = 0x100usize;
    let drum_table = patch_table + 2 * PATCH_LEN;
    let mut image = vec![0u8; drum_table + DRUM_LEN];
    image[0x66..0x68].copy_from_slice(&2u16.to_be_bytes());
    image[0x68..0x6a].copy_from_slice(&1u16.to_be_bytes());
    image[0x8c..0x90].copy_from_slice(&(patch_table as u32).to_be_bytes());
    image[0x90..0x94].copy_from_slice(&(drum_table as u32).to_be_bytes());
    write_name(&mut image, patch_table, "Expa Lead");
    image[0] = marker;
    image
}

fn registry() -> Arc<RomImageRegistry> {
    let mut registry = RomImageRegistry::new(base_rom());
    registry
        .insert_expansion(2, ExpansionImage::new(expansion_image(0x7a)))
        .unwrap();
    Arc::new(registry)
}

fn processor() -> Processor<RamEngine> {
    Processor::new(RamEngine::new(), registry())
}

#[test]
fn program_surface() {
    let p = processor();
    assert_eq!(p.num_programs(), INTERNAL_PROGRAMS + 3);
    assert_eq!(p.program_name(0), Some("Init Pno"));
    assert_eq!(p.program_name(1), Some("Strings"));
    assert_eq!(p.program_name(64), Some("Drums Internal User"));
    assert_eq!(p.program_name(INTERNAL_PROGRAMS), Some("Expa Lead"));
    assert_eq!(p.program_name(INTERNAL_PROGRAMS + 2), Some("Exp 2 Drums 0"));
    assert_eq!(p.program_name(INTERNAL_PROGRAMS + 3), None);
    assert_eq!(p.current_program(), None);
}

#[test]
fn selection_and_state_round_trip() {
    let mut p = processor();
    p.select_program(INTERNAL_PROGRAMS as i32); // expansion patch
    assert_eq!(p.current_program(), Some(INTERNAL_PROGRAMS));
    assert_eq!(p.state().current_expansion, Some(2));

    let blob = p.save_state();
    assert_eq!(blob.len(), STATE_LEN);

    let mut restored = processor();
    restored.load_state(&blob).unwrap();
    assert_eq!(restored.state().current_expansion, Some(2));
    assert!(!restored.state().is_drums);
    // the engine got the expansion waveforms and the windows back
    assert_eq!(restored.engine().expansion_rom()[0], 0x7a);
    assert_eq!(restored.engine().nvram()[nvram::MODE], 1);
    assert_eq!(
        restored.engine().nvram()[nvram::SETTINGS] & nvram::SETTINGS_APPLIED_BIT,
        nvram::SETTINGS_APPLIED_BIT
    );

    // and a fresh save emits the identical blob
    assert_eq!(restored.save_state(), blob);
}

#[test]
fn load_state_rejects_wrong_size() {
    let mut p = processor();
    assert!(p.load_state(&vec![0u8; STATE_LEN + 1]).is_err());
    assert_eq!(p.engine().resets(), 0);
}

#[test]
fn block_events_are_rebased_and_rerouted() {
    let mut p = processor();
    p.set_sample_rate(48_000.0);
    p.select_program(0);
    p.engine_mut().clear_events();

    let note = Note::from_u8_lossy(61);
    p.process_block(vec![
        (0, MidiMessage::NoteOn(Channel::Ch7, note, U7::from_u8_lossy(90))),
        (4800, MidiMessage::NoteOff(Channel::Ch7, note, U7::from_u8_lossy(0))),
    ]);

    let events = p.engine().events();
    assert_eq!(events.len(), 2);
    // melodic mode: part channel 1
    assert_eq!(events[0].0[0], 0x90);
    assert_eq!(events[0].1, 0);
    assert_eq!(events[1].0[0], 0x80);
    assert_eq!(events[1].1, 6400); // 4800 / 48k * 64k
}

#[test]
fn drum_mode_routes_to_channel_ten() {
    let mut p = processor();
    p.select_program(64); // internal drum kit
    p.engine_mut().clear_events();

    let note = Note::from_u8_lossy(40);
    p.process_block(vec![(
        0,
        MidiMessage::NoteOn(Channel::Ch1, note, U7::from_u8_lossy(127)),
    )]);
    assert_eq!(p.engine().events()[0].0[0], 0x99);
}

#[test]
fn param_change_sends_checksummed_frame() {
    let mut p = processor();
    p.send_param_change(0x0000_4081, 0x12);
    let (bytes, offset) = &p.engine().events()[0];
    assert_eq!(*offset, 0);
    assert_eq!(bytes.len(), 12);
    assert_eq!(bytes[0], 0xf0);
    assert_eq!(bytes[11], 0xf7);
    let sum: u32 = bytes[5..11].iter().map(|&b| u32::from(b)).sum();
    assert_eq!(sum % 128, 0);
}

#[test]
fn control_handle_applies_before_the_block() {
    let mut p = processor();
    let handle = p.control_handle();
    handle.select_program(1);
    assert_eq!(p.current_program(), None); // nothing applied yet

    p.process_block(Vec::new());
    assert_eq!(p.current_program(), Some(1));
    assert_eq!(p.state().patch[0], b'S'); // the "Strings" record was applied
}
