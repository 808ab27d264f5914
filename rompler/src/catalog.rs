//! Patch catalog construction.
//!
//! A one-shot scan over the registry images produces the [`Catalog`]: a
//! flat, host-facing program list plus a grouping into banks mirroring
//! the device's physical paging (three internal banks, then one bank per
//! populated expansion slot).  The catalog is built once at startup and
//! immutable afterwards.
//!
//! Expansion dumps are externally supplied and may be malformed, so the
//! scan never aborts on bad data: a record whose name field fails the
//! charset check (or whose bytes cannot be read at all) is kept with a
//! diagnostic name, preserving the program numbering.

use crate::engine::{DRUM_LEN, PATCH_LEN};
use crate::rom::{ImageId, RomImageRegistry};

/// Length of the name field at the start of a melodic patch record.
pub const NAME_LEN: usize = 12;

// Base ROM layout: three internal banks of 64 melodic patches plus one
// drum kit each.
const INTERNAL_PATCH_TABLES: [usize; 3] = [0x008ce0, 0x010ce0, 0x018ce0];
const INTERNAL_DRUM_KITS: [usize; 3] = [0x00e760, 0x016760, 0x01e760];
const INTERNAL_BANK_NAMES: [&str; 3] = ["Internal User", "Internal A", "Internal B"];
const INTERNAL_BANK_PATCHES: usize = 64;

// Expansion header fields, big-endian.
const HDR_PATCH_COUNT: usize = 0x66;
const HDR_DRUM_COUNT: usize = 0x68;
const HDR_PATCH_TABLE: usize = 0x8c;
const HDR_DRUM_TABLE: usize = 0x90;

// The RD-500-class board in slot 0 predates the generic header: fixed
// counts, and its tables split into three runs of 64 records.
const RD500_SLOT: u8 = 0;
const RD500_PATCH_COUNT: usize = 192;
const RD500_DRUM_COUNT: usize = 3;
const RD500_PATCH_RUNS: [usize; 3] = [0x0ce0, 0x8370, 0x12b82];
const RD500_DRUM_RUNS: [usize; 3] = [0x6760, 0xd2a0, 0x18602];

/// One selectable program.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    /// Decoded patch name, or a diagnostic placeholder.
    pub name: String,
    /// Image the record's bytes live in.
    pub source: ImageId,
    /// Byte offset of the record within its image.
    pub offset: usize,
    /// Record length: [`PATCH_LEN`] or [`DRUM_LEN`].
    pub len: usize,
    /// Expansion slot the record belongs to, `None` for internal banks.
    pub expansion: Option<u8>,
    /// Position of the record within its own bank table.
    pub patch_index: usize,
    /// True for drum kits, false for melodic patches.
    pub is_drum_kit: bool,
    /// Dense host-facing program number, assigned in insertion order.
    pub catalog_index: usize,
}

/// A physical paging unit: an internal bank or one expansion board.
#[derive(Debug, Clone)]
pub struct Bank {
    /// Display name of the bank.
    pub name: String,
    /// Catalog indices of the bank's records, in discovery order.
    pub records: Vec<usize>,
}

/// The flat program list and its bank grouping.
pub struct Catalog {
    records: Vec<PatchRecord>,
    banks: Vec<Bank>,
    expansion_patch_total: usize,
}

impl Catalog {
    /// Scan the registry and build the catalog.
    ///
    /// The base ROM must be a complete device ROM image; expansion
    /// dumps may be arbitrarily malformed.
    pub fn build(registry: &RomImageRegistry) -> Self {
        let mut builder = CatalogBuilder {
            registry,
            records: Vec::new(),
            banks: Vec::new(),
            expansion_patch_total: 0,
        };
        builder.scan_internal_banks();
        for (slot, _) in registry.populated() {
            builder.scan_expansion(slot);
        }
        let catalog = Catalog {
            records: builder.records,
            banks: builder.banks,
            expansion_patch_total: builder.expansion_patch_total,
        };
        log::info!(
            "patch catalog: {} programs in {} banks ({} expansion patches)",
            catalog.len(),
            catalog.banks().len(),
            catalog.expansion_patch_total()
        );
        catalog
    }

    /// Number of selectable programs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the catalog holds no programs.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for a host program number, if in range.
    pub fn get(&self, index: usize) -> Option<&PatchRecord> {
        self.records.get(index)
    }

    /// All records in catalog order.
    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    /// The bank grouping, in discovery order.
    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    /// Program name for a host program number, if in range.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(|r| r.name.as_str())
    }

    /// Total melodic patch count across all expansion boards.
    pub fn expansion_patch_total(&self) -> usize {
        self.expansion_patch_total
    }
}

struct CatalogBuilder<'a> {
    registry: &'a RomImageRegistry,
    records: Vec<PatchRecord>,
    banks: Vec<Bank>,
    expansion_patch_total: usize,
}

impl CatalogBuilder<'_> {
    fn begin_bank(&mut self, name: String) {
        self.banks.push(Bank {
            name,
            records: Vec::new(),
        });
    }

    /// Append a record, assigning the next dense catalog index.
    fn push(&mut self, mut record: PatchRecord) {
        record.catalog_index = self.records.len();
        if let Some(bank) = self.banks.last_mut() {
            bank.records.push(record.catalog_index);
        }
        self.records.push(record);
    }

    fn scan_internal_banks(&mut self) {
        let base = self.registry.base_rom();
        for (bank, (&table, &drum_kit)) in INTERNAL_PATCH_TABLES
            .iter()
            .zip(INTERNAL_DRUM_KITS.iter())
            .enumerate()
        {
            self.begin_bank(INTERNAL_BANK_NAMES[bank].to_string());
            for patch in 0..INTERNAL_BANK_PATCHES {
                let offset = table + patch * PATCH_LEN;
                // The base ROM ships with the device; its names are
                // decoded as-is.
                self.push(PatchRecord {
                    name: read_name(&base[offset..offset + NAME_LEN]),
                    source: ImageId::BaseRom,
                    offset,
                    len: PATCH_LEN,
                    expansion: None,
                    patch_index: patch,
                    is_drum_kit: false,
                    catalog_index: 0,
                });
            }
            self.push(PatchRecord {
                name: format!("Drums {}", INTERNAL_BANK_NAMES[bank]),
                source: ImageId::BaseRom,
                offset: drum_kit,
                len: DRUM_LEN,
                expansion: None,
                patch_index: 0,
                is_drum_kit: true,
                catalog_index: 0,
            });
        }
    }

    fn scan_expansion(&mut self, slot: u8) {
        let image = match self.registry.expansion(slot as usize) {
            Ok(image) => image,
            Err(_) => return,
        };
        let tables = image.tables();
        let source = if image.has_patch_table() {
            ImageId::ExpansionPatchTable(slot)
        } else {
            ImageId::Expansion(slot)
        };
        self.begin_bank(format!("Expansion {}", slot));

        let (patch_count, drum_count, patch_table, drum_table) = if slot == RD500_SLOT {
            (RD500_PATCH_COUNT, RD500_DRUM_COUNT, 0, 0)
        } else {
            (
                read_u16_be(tables, HDR_PATCH_COUNT, slot) as usize,
                read_u16_be(tables, HDR_DRUM_COUNT, slot) as usize,
                read_u32_be(tables, HDR_PATCH_TABLE, slot) as usize,
                read_u32_be(tables, HDR_DRUM_TABLE, slot) as usize,
            )
        };

        for patch in 0..patch_count {
            let offset = if slot == RD500_SLOT {
                rd500_run(patch, &RD500_PATCH_RUNS) + (patch % 64) * PATCH_LEN
            } else {
                patch_table + patch * PATCH_LEN
            };
            let name = self.expansion_patch_name(source, offset, slot, patch);
            self.push(PatchRecord {
                name,
                source,
                offset,
                len: PATCH_LEN,
                expansion: Some(slot),
                patch_index: patch,
                is_drum_kit: false,
                catalog_index: 0,
            });
        }
        self.expansion_patch_total += patch_count;

        for kit in 0..drum_count {
            let offset = if slot == RD500_SLOT {
                // no per-kit stride: the run switch alone places RD-500 kits
                rd500_run(kit, &RD500_DRUM_RUNS)
            } else {
                drum_table + kit * DRUM_LEN
            };
            self.push(PatchRecord {
                name: format!("Exp {} Drums {}", slot, kit),
                source,
                offset,
                len: DRUM_LEN,
                expansion: Some(slot),
                patch_index: kit,
                is_drum_kit: true,
                catalog_index: 0,
            });
        }
    }

    /// Decode and validate an expansion patch name, falling back to the
    /// diagnostic form on any disallowed byte or unreadable span.
    fn expansion_patch_name(
        &self,
        source: ImageId,
        offset: usize,
        slot: u8,
        patch: usize,
    ) -> String {
        let name = self
            .registry
            .resolve(source, offset, NAME_LEN)
            .ok()
            .and_then(|bytes| match validated_name(bytes) {
                Ok(name) => Some(name),
                Err(byte) => {
                    log::warn!(
                        "expansion {} patch {} name contains invalid byte {:#04x}",
                        slot,
                        patch,
                        byte
                    );
                    None
                }
            });
        name.unwrap_or_else(|| format!("ERROR EXP={} PATCH={}", slot, patch))
    }
}

fn rd500_run(index: usize, runs: &[usize; 3]) -> usize {
    if index < 64 {
        runs[0]
    } else if index < 128 {
        runs[1]
    } else {
        runs[2]
    }
}

fn name_byte_allowed(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b' ' | b'-' | b'+' | b'.' | b'/')
}

/// Decode a name field up to its first NUL.
fn read_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decode a name field, rejecting the first byte outside the allowed
/// charset.  Bytes past a NUL terminator are not inspected.
fn validated_name(bytes: &[u8]) -> Result<String, u8> {
    for &byte in bytes {
        if byte == 0 {
            break;
        }
        if !name_byte_allowed(byte) {
            return Err(byte);
        }
    }
    Ok(read_name(bytes))
}

fn read_u16_be(data: &[u8], offset: usize, slot: u8) -> u16 {
    match data.get(offset..offset + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => {
            log::warn!("expansion {} header truncated at {:#x}", slot, offset);
            0
        }
    }
}

fn read_u32_be(data: &[u8], offset: usize, slot: u8) -> u32 {
    match data.get(offset..offset + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => {
            log::warn!("expansion {} header truncated at {:#x}", slot, offset);
            0
        }
    }
}
