//! `__debug_info` string-reference relocation.
//!
//! After a `__debug_str` rebuild, every `DW_FORM_strp` attribute holds a
//! stale offset. The walker steps through each compilation unit's debugging
//! entries using the abbreviation table the unit names, consuming attribute
//! values by their form; `strp` is the only form that is rewritten, and the
//! only reason this section is touched at all.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, NativeEndian};
use tracing::debug;

use crate::error::{Error, Result};
use crate::reader::ByteReader;

use super::abbrev::AbbreviationTable;
use super::constants::*;
use super::strings::RelocationTable;

/// A pending offset rewrite at a fixed position in the section.
#[derive(Debug, Clone, Copy)]
struct StrpWrite {
    /// Byte position of the offset field.
    position: usize,
    /// Relocated offset value.
    value: u64,
    /// Whether the field is 64 bits wide (DWARF-64 unit).
    dwarf64: bool,
}

/// Relocates `DW_FORM_strp` references through `relocations`.
///
/// Returns whether any offset changed; `data` is modified in place and keeps
/// its size either way.
pub fn relocate_string_references(
    data: &mut [u8],
    swap_bytes: bool,
    abbrev_tables: &BTreeMap<u64, AbbreviationTable>,
    relocations: &RelocationTable,
) -> Result<bool> {
    let mut writes: Vec<StrpWrite> = Vec::new();

    {
        let mut reader = ByteReader::new(data, swap_bytes);
        while reader.remaining() > 0 {
            walk_compilation_unit(&mut reader, abbrev_tables, relocations, &mut writes)?;
        }
    }

    if writes.is_empty() {
        return Ok(false);
    }

    debug!("relocating {} string reference(s)", writes.len());
    for write in writes {
        if write.dwarf64 {
            let value = if swap_bytes {
                write.value.swap_bytes()
            } else {
                write.value
            };
            NativeEndian::write_u64(&mut data[write.position..write.position + 8], value);
        } else {
            let narrow = write.value as u32;
            let value = if swap_bytes {
                narrow.swap_bytes()
            } else {
                narrow
            };
            NativeEndian::write_u32(&mut data[write.position..write.position + 4], value);
        }
    }
    Ok(true)
}

/// Walks one compilation unit, recording strp rewrites.
fn walk_compilation_unit(
    reader: &mut ByteReader<'_>,
    abbrev_tables: &BTreeMap<u64, AbbreviationTable>,
    relocations: &RelocationTable,
    writes: &mut Vec<StrpWrite>,
) -> Result<()> {
    let unit_start = reader.position();
    let mut dwarf64 = false;
    let mut unit_length = u64::from(reader.read_u32()?);
    if unit_length as u32 == DWARF64_LENGTH_ESCAPE {
        dwarf64 = true;
        unit_length = reader.read_u64()?;
    }
    let unit_end = reader.position() + unit_length as usize;
    if unit_end > reader.len() {
        return Err(Error::invalid(format!(
            "compilation unit at {unit_start} extends beyond section end"
        )));
    }

    let version = reader.read_u16()?;
    let abbrev_offset = if dwarf64 {
        reader.read_u64()?
    } else {
        u64::from(reader.read_u32()?)
    };
    let table = abbrev_tables.get(&abbrev_offset).ok_or_else(|| {
        Error::invalid(format!(
            "compilation unit at {unit_start} references unknown abbreviation table {abbrev_offset}"
        ))
    })?;
    let address_size = reader.read_u8()?;

    while reader.position() < unit_end {
        let code = reader.read_uleb128()?;
        if code == 0 {
            // Null entry used as sibling-chain padding.
            continue;
        }
        let abbreviation = table.get(&code).ok_or_else(|| {
            Error::invalid(format!(
                "debugging entry at {} uses undefined abbreviation code {code}",
                reader.position()
            ))
        })?;

        for attribute in &abbreviation.attributes {
            consume_form(
                reader,
                attribute.form,
                address_size,
                version,
                dwarf64,
                relocations,
                writes,
            )?;
        }
    }

    reader.seek(unit_end)
}

/// Consumes one attribute value according to its form.
fn consume_form(
    reader: &mut ByteReader<'_>,
    form: u64,
    address_size: u8,
    version: u16,
    dwarf64: bool,
    relocations: &RelocationTable,
    writes: &mut Vec<StrpWrite>,
) -> Result<()> {
    match form {
        DW_FORM_ADDR => reader.skip(address_size as usize),
        DW_FORM_BLOCK2 => {
            let len = reader.read_u16()?;
            reader.skip(len as usize)
        }
        DW_FORM_BLOCK4 => {
            let len = reader.read_u32()?;
            reader.skip(len as usize)
        }
        DW_FORM_BLOCK => {
            let len = reader.read_uleb128()?;
            reader.skip(len as usize)
        }
        DW_FORM_BLOCK1 => {
            let len = reader.read_u8()?;
            reader.skip(len as usize)
        }
        DW_FORM_DATA1 | DW_FORM_REF1 | DW_FORM_FLAG => reader.skip(1),
        DW_FORM_DATA2 | DW_FORM_REF2 => reader.skip(2),
        DW_FORM_DATA4 | DW_FORM_REF4 => reader.skip(4),
        DW_FORM_DATA8 | DW_FORM_REF8 => reader.skip(8),
        DW_FORM_STRING => reader.read_cstr().map(|_| ()),
        // sdata is signed LEB128; the encoded byte count is identical, and
        // the value is discarded.
        DW_FORM_SDATA | DW_FORM_UDATA | DW_FORM_REF_UDATA => reader.read_uleb128().map(|_| ()),
        DW_FORM_STRP => {
            let position = reader.position();
            let offset = if dwarf64 {
                reader.read_u64()?
            } else {
                u64::from(reader.read_u32()?)
            };
            if let Some(&new_offset) = relocations.get(&offset) {
                if new_offset != offset {
                    writes.push(StrpWrite {
                        position,
                        value: new_offset,
                        dwarf64,
                    });
                }
            }
            Ok(())
        }
        DW_FORM_REF_ADDR => {
            // Address-sized through DWARF v2, offset-sized after.
            if version <= 2 {
                reader.skip(address_size as usize)
            } else if dwarf64 {
                reader.skip(8)
            } else {
                reader.skip(4)
            }
        }
        DW_FORM_INDIRECT => {
            let real_form = reader.read_uleb128()?;
            consume_form(
                reader,
                real_form,
                address_size,
                version,
                dwarf64,
                relocations,
                writes,
            )
        }
        other => Err(Error::NotImplemented(format!(
            "DWARF attribute form {other:#04x}"
        ))),
    }
}
