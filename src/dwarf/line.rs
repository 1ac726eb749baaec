//! `__debug_line` directory-table rewriting.
//!
//! Each line-number program header embeds an ASCIIZ directory table.
//! Rewriting a prefix changes the table's length, and the unit's
//! `unit_length` and `header_length` fields both cover it. A shrunken table
//! is padded back to its original size with a filler directory (extra
//! directories are harmless: file entries index directories 1-based and the
//! existing indices keep their meaning). A table that must grow forces the
//! unit to grow, which rebuilds the whole section.

use byteorder::{ByteOrder, NativeEndian};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prefix::PrefixMap;
use crate::reader::ByteReader;

use super::constants::DWARF64_LENGTH_ESCAPE;

/// A directory table cannot lose exactly one byte: a one-byte filler entry
/// would be the empty string that terminates the table. The unit instead
/// grows by appending this single-character directory plus its NUL.
const GROWTH_FILLER: &[u8] = b"!\0";

/// Byte used to fill padding directories.
const PAD_BYTE: u8 = b'!';

/// Per-unit patch record for a rewritten directory table.
#[derive(Debug)]
struct LineUnitPatch {
    dwarf64: bool,
    /// Position of the 32-bit length word (or the DWARF-64 escape).
    unit_length_offset: usize,
    unit_length: u64,
    /// Position of the header-length field.
    header_length_offset: usize,
    header_length: u64,
    /// Position of the first directory byte.
    dir_table_offset: usize,
    /// Length of the directory entries, excluding the table terminator.
    old_table_len: usize,
    /// Replacement entries, excluding the table terminator.
    new_table: Vec<u8>,
    /// Bytes the unit grows by (0 when padded back to size).
    delta: usize,
}

/// Outcome of patching the line-number section.
#[derive(Debug)]
pub enum LinePatch {
    /// No directory matched the prefix map.
    Unchanged,
    /// Every rewritten table kept its size; same-size section data.
    InPlace(Vec<u8>),
    /// At least one unit grew; the section was rebuilt and is larger.
    Rebuilt(Vec<u8>),
}

/// Rewrites directory-table prefixes across all compilation units.
pub fn patch_line_section(
    data: Vec<u8>,
    swap_bytes: bool,
    prefix_map: &PrefixMap,
) -> Result<LinePatch> {
    let mut patches: Vec<LineUnitPatch> = Vec::new();

    {
        let mut reader = ByteReader::new(&data, swap_bytes);
        while reader.remaining() > 0 {
            if let Some(patch) = read_line_unit(&mut reader, prefix_map)? {
                patches.push(patch);
            }
        }
    }

    if patches.is_empty() {
        return Ok(LinePatch::Unchanged);
    }

    if patches.iter().all(|p| p.delta == 0) {
        let mut patched = data;
        for patch in &patches {
            patched[patch.dir_table_offset..patch.dir_table_offset + patch.old_table_len]
                .copy_from_slice(&patch.new_table);
        }
        return Ok(LinePatch::InPlace(patched));
    }

    Ok(LinePatch::Rebuilt(rebuild_section(
        &data, swap_bytes, &patches,
    )))
}

/// Parses one line-program unit; returns a patch when its directory table
/// needs rewriting.
fn read_line_unit(
    reader: &mut ByteReader<'_>,
    prefix_map: &PrefixMap,
) -> Result<Option<LineUnitPatch>> {
    let unit_length_offset = reader.position();
    let mut dwarf64 = false;
    let mut unit_length = u64::from(reader.read_u32()?);
    if unit_length as u32 == DWARF64_LENGTH_ESCAPE {
        dwarf64 = true;
        unit_length = reader.read_u64()?;
    }
    let unit_end = reader.position() + unit_length as usize;
    if unit_end > reader.len() {
        return Err(Error::invalid(format!(
            "line-number unit at {unit_length_offset} extends beyond section end"
        )));
    }

    let version = reader.read_u16()?;
    if !(2..=4).contains(&version) {
        return Err(Error::invalid(format!(
            "line-number program version {version} is not supported"
        )));
    }

    let header_length_offset = reader.position();
    let header_length = if dwarf64 {
        reader.read_u64()?
    } else {
        u64::from(reader.read_u32()?)
    };

    reader.skip(1)?; // minimum_instruction_length
    if version == 4 {
        reader.skip(1)?; // maximum_operations_per_instruction
    }
    reader.skip(3)?; // default_is_stmt, line_base, line_range
    let opcode_base = reader.read_u8()?;
    if opcode_base == 0 {
        return Err(Error::invalid(format!(
            "line-number unit at {unit_length_offset} has opcode_base 0"
        )));
    }
    reader.skip(opcode_base as usize - 1)?; // standard_opcode_lengths

    let dir_table_offset = reader.position();
    let mut old_table_len = 0usize;
    let mut new_table = Vec::new();
    let mut table_modified = false;
    loop {
        let directory = reader.read_cstr()?;
        if directory.is_empty() {
            break;
        }
        old_table_len += directory.len() + 1;
        match prefix_map.rewrite_bytes(directory) {
            Some(replaced) if replaced != directory => {
                table_modified = true;
                new_table.extend_from_slice(&replaced);
            }
            _ => new_table.extend_from_slice(directory),
        }
        new_table.push(0);
    }

    // The file-name table and line program follow; nothing there changes.
    reader.seek(unit_end)?;

    if !table_modified {
        return Ok(None);
    }

    let new_len = new_table.len();
    let delta = if new_len == old_table_len {
        0
    } else if new_len + 1 < old_table_len {
        // Pad back to the original size with one filler directory whose
        // content is the difference minus its NUL terminator.
        let filler_len = old_table_len - new_len - 1;
        new_table.extend(std::iter::repeat(PAD_BYTE).take(filler_len));
        new_table.push(0);
        0
    } else if new_len + 1 == old_table_len {
        new_table.extend_from_slice(GROWTH_FILLER);
        1
    } else {
        new_len - old_table_len
    };

    if delta > 0 && !dwarf64 && unit_length + delta as u64 >= u64::from(DWARF64_LENGTH_ESCAPE) {
        return Err(Error::NotImplemented(
            "growing a line-number unit across the DWARF-32/64 length boundary".into(),
        ));
    }

    debug!(
        "line-number unit at {unit_length_offset}: directory table {} -> {} bytes (delta {delta})",
        old_table_len,
        new_table.len()
    );

    Ok(Some(LineUnitPatch {
        dwarf64,
        unit_length_offset,
        unit_length,
        header_length_offset,
        header_length,
        dir_table_offset,
        old_table_len,
        new_table,
        delta,
    }))
}

/// Rebuilds the section, growing each patched unit by its delta.
fn rebuild_section(data: &[u8], swap_bytes: bool, patches: &[LineUnitPatch]) -> Vec<u8> {
    let total_delta: usize = patches.iter().map(|p| p.delta).sum();
    let mut out = Vec::with_capacity(data.len() + total_delta);

    let mut copied = 0usize;
    let mut shift = 0usize;
    for patch in patches {
        out.extend_from_slice(&data[copied..patch.dir_table_offset]);
        out.extend_from_slice(&patch.new_table);
        copied = patch.dir_table_offset + patch.old_table_len;

        write_unit_length(
            &mut out,
            patch.unit_length_offset + shift,
            patch.dwarf64,
            patch.unit_length + patch.delta as u64,
            swap_bytes,
        );
        write_header_length(
            &mut out,
            patch.header_length_offset + shift,
            patch.dwarf64,
            patch.header_length + patch.delta as u64,
            swap_bytes,
        );
        shift += patch.delta;
    }
    out.extend_from_slice(&data[copied..]);
    out
}

fn write_unit_length(out: &mut [u8], offset: usize, dwarf64: bool, value: u64, swap: bool) {
    if dwarf64 {
        // The 32-bit escape word stays; the real length follows it.
        write_u64_at(out, offset + 4, value, swap);
    } else {
        write_u32_at(out, offset, value as u32, swap);
    }
}

fn write_header_length(out: &mut [u8], offset: usize, dwarf64: bool, value: u64, swap: bool) {
    if dwarf64 {
        write_u64_at(out, offset, value, swap);
    } else {
        write_u32_at(out, offset, value as u32, swap);
    }
}

fn write_u32_at(out: &mut [u8], offset: usize, value: u32, swap: bool) {
    let value = if swap { value.swap_bytes() } else { value };
    NativeEndian::write_u32(&mut out[offset..offset + 4], value);
}

fn write_u64_at(out: &mut [u8], offset: usize, value: u64, swap: bool) {
    let value = if swap { value.swap_bytes() } else { value };
    NativeEndian::write_u64(&mut out[offset..offset + 8], value);
}
