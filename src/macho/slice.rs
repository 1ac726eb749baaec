//! A single Mach-O image within a container.
//!
//! [`MachSlice`] parses the header, load commands, segments, sections, and
//! symbol table of one image and exposes section-granular read/write access.
//! Size-preserving writes hit the file immediately; size-changing writes are
//! queued as deferred replacements and applied by [`MachSlice::serialize`],
//! which rebuilds the slice with every affected segment and section offset
//! patched.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use tracing::{debug, warn};
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Error, Result, WriteStatus};
use crate::util::cstr_len;

use super::arch::{MachArch, RawStruct};
use super::constants::{load_command_name, stab_type_name, LC_SYMTAB, N_OSO, N_SO};
use super::structs::{
    LoadCommand, MachHeaderExt, NlistExt, SectionExt, SegmentCommandExt, SymtabCommand,
};

/// `(segment_name, section_name)` key identifying one section.
pub type SectionPath = (String, String);

/// A queued size-changing section replacement.
#[derive(Debug)]
pub struct DeferredWrite {
    /// Replacement section bytes.
    pub data: Vec<u8>,
    /// Size of the section being replaced.
    pub original_size: u64,
}

/// A parsed segment: its command, the command's offset within the slice, and
/// its section entries.
#[derive(Debug, Clone)]
pub struct MachSegment<A: MachArch> {
    /// Offset of the segment command relative to the slice start.
    pub command_offset: u64,
    /// The segment command (host byte order).
    pub command: A::SegmentCommand,
    /// Section entries in file order (host byte order).
    pub sections: Vec<A::Section>,
}

/// Symbol table metadata captured during the load-command walk.
///
/// Only STAB entries are retained; the table is inspected for verbose
/// output and is never modified.
#[derive(Debug, Clone)]
pub struct SymbolTable<A: MachArch> {
    /// The LC_SYMTAB command (host byte order).
    pub command: SymtabCommand,
    /// STAB debugging entries from the symbol table.
    pub debug_symbols: Vec<A::Nlist>,
}

/// Section-granular access shared by both slice bitnesses.
///
/// Patchers operate through this interface so the same code handles 32-bit
/// and 64-bit images.
pub trait MachFile {
    /// Returns whether multi-byte values in this image need byte swapping.
    fn swap_bytes(&self) -> bool;
    /// Absolute offset of this image within the outer file.
    fn content_offset(&self) -> u64;
    /// Size of this image in bytes.
    fn content_size(&self) -> u64;
    /// Short architecture name for log output.
    fn arch_name(&self) -> &'static str;
    /// Returns true if size-changing writes are queued.
    fn has_deferred_writes(&self) -> bool;
    /// Looks up a section, returning its absolute file offset and size.
    fn section_info(&self, segment: &str, section: &str) -> Option<(u64, u64)>;
    /// Reads a section's bytes, appending `trailing_zero_bytes` zeros.
    ///
    /// Returns `Ok(None)` when the section does not exist.
    fn read_section(
        &mut self,
        segment: &str,
        section: &str,
        trailing_zero_bytes: usize,
    ) -> Result<Option<Vec<u8>>>;
    /// Replaces a section's data.
    ///
    /// Same-size data is written to the file immediately; differently-sized
    /// data is queued as a deferred write. Writing to a non-existent section
    /// fails with [`Error::WriteFailed`].
    fn write_section(&mut self, segment: &str, section: &str, data: Vec<u8>)
        -> Result<WriteStatus>;
    /// Appends this image, with all deferred writes applied, to `out`.
    fn serialize(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

/// One Mach-O image, parameterized by bitness.
#[derive(Debug)]
pub struct MachSlice<A: MachArch> {
    file: File,
    content_offset: u64,
    content_size: u64,
    swap_bytes: bool,
    header: A::Header,
    segments: Vec<MachSegment<A>>,
    symbol_table: Option<SymbolTable<A>>,
    deferred_writes: BTreeMap<SectionPath, DeferredWrite>,
}

/// Reads one raw struct from the file at its current position, swapping to
/// host order if required.
fn read_struct<T: RawStruct>(file: &mut File, swap: bool) -> Result<T> {
    let mut buf = vec![0u8; size_of::<T>()];
    file.read_exact(&mut buf)
        .map_err(|e| Error::ReadFailed(format!("short struct read: {e}")))?;
    let mut value =
        T::read_from_bytes(&buf).map_err(|_| Error::invalid("unreadable structure"))?;
    if swap {
        value.swap_fields();
    }
    Ok(value)
}

/// Reads one raw struct out of a byte buffer at `offset`.
fn struct_at<T: RawStruct>(buf: &[u8], offset: usize, swap: bool) -> Result<T> {
    let end = offset
        .checked_add(size_of::<T>())
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| Error::invalid("structure beyond buffer end"))?;
    let mut value =
        T::read_from_bytes(&buf[offset..end]).map_err(|_| Error::invalid("unreadable structure"))?;
    if swap {
        value.swap_fields();
    }
    Ok(value)
}

/// Writes one raw struct into a byte buffer at `offset`, swapping back to
/// file order if required.
fn write_struct_at<T: RawStruct>(buf: &mut [u8], offset: usize, mut value: T, swap: bool) {
    if swap {
        value.swap_fields();
    }
    buf[offset..offset + size_of::<T>()].copy_from_slice(value.as_bytes());
}

impl<A: MachArch> MachSlice<A> {
    /// Parses the image at `[content_offset, content_offset + content_size)`.
    pub fn read(
        mut file: File,
        content_offset: u64,
        content_size: u64,
        swap_bytes: bool,
    ) -> Result<Self> {
        file.seek(SeekFrom::Start(content_offset))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        let header: A::Header = read_struct(&mut file, swap_bytes)?;

        let mut slice = Self {
            file,
            content_offset,
            content_size,
            swap_bytes,
            header,
            segments: Vec::new(),
            symbol_table: None,
            deferred_writes: BTreeMap::new(),
        };
        slice.read_load_commands()?;
        Ok(slice)
    }

    fn read_load_commands(&mut self) -> Result<()> {
        let mut pos = self.content_offset + size_of::<A::Header>() as u64;

        for _ in 0..self.header.ncmds() {
            self.file
                .seek(SeekFrom::Start(pos))
                .map_err(|e| Error::ReadFailed(e.to_string()))?;
            let lc: LoadCommand = read_struct(&mut self.file, self.swap_bytes)?;
            debug!(
                "@{}: {} ({} bytes)",
                pos,
                load_command_name(lc.cmd),
                lc.cmdsize
            );
            if (lc.cmdsize as usize) < LoadCommand::SIZE {
                return Err(Error::invalid(format!(
                    "load command at {pos} has cmdsize {}",
                    lc.cmdsize
                )));
            }

            if lc.cmd == A::SEGMENT_COMMAND {
                self.file
                    .seek(SeekFrom::Start(pos))
                    .map_err(|e| Error::ReadFailed(e.to_string()))?;
                let segment = self.read_segment(pos - self.content_offset)?;
                self.segments.push(segment);
            } else if lc.cmd == LC_SYMTAB {
                self.file
                    .seek(SeekFrom::Start(pos))
                    .map_err(|e| Error::ReadFailed(e.to_string()))?;
                let table = self.read_symbol_table()?;
                self.symbol_table = Some(table);
            }

            pos += u64::from(lc.cmdsize);
        }

        Ok(())
    }

    fn read_segment(&mut self, command_offset: u64) -> Result<MachSegment<A>> {
        let command: A::SegmentCommand = read_struct(&mut self.file, self.swap_bytes)?;
        if command.file_off() + command.file_size() > self.content_size {
            return Err(Error::invalid(format!(
                "segment '{}' extends beyond image end ({} + {} > {})",
                command.name(),
                command.file_off(),
                command.file_size(),
                self.content_size
            )));
        }

        let mut sections = Vec::with_capacity(command.nsects() as usize);
        for _ in 0..command.nsects() {
            let section: A::Section = read_struct(&mut self.file, self.swap_bytes)?;
            sections.push(section);
        }

        Ok(MachSegment {
            command_offset,
            command,
            sections,
        })
    }

    fn read_symbol_table(&mut self) -> Result<SymbolTable<A>> {
        let command: SymtabCommand = read_struct(&mut self.file, self.swap_bytes)?;

        let strsize = command.strsize as usize;
        let mut string_table = Vec::new();
        string_table
            .try_reserve_exact(strsize)
            .map_err(|_| Error::OutOfMemory { needed: strsize })?;
        string_table.resize(strsize, 0);
        self.file
            .seek(SeekFrom::Start(
                self.content_offset + u64::from(command.stroff),
            ))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        self.file
            .read_exact(&mut string_table)
            .map_err(|_| Error::ReadFailed("failed to read symbol string table".into()))?;

        self.file
            .seek(SeekFrom::Start(
                self.content_offset + u64::from(command.symoff),
            ))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;

        let mut debug_symbols = Vec::new();
        for _ in 0..command.nsyms {
            let entry: A::Nlist = read_struct(&mut self.file, self.swap_bytes)?;
            if !entry.is_stab() {
                continue;
            }

            if let Some(name) = stab_type_name(entry.type_byte()) {
                let strx = entry.strx() as usize;
                let symbol = if strx < string_table.len() {
                    let rest = &string_table[strx..];
                    String::from_utf8_lossy(&rest[..cstr_len(rest)]).into_owned()
                } else {
                    String::new()
                };
                match entry.type_byte() {
                    N_SO => debug!("{name} source file: '{symbol}'"),
                    N_OSO => debug!("{name} object file: '{symbol}' mtime {}", entry.value()),
                    _ => debug!("{name} '{symbol}'"),
                }
            }

            debug_symbols.push(entry);
        }

        Ok(SymbolTable {
            command,
            debug_symbols,
        })
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[MachSegment<A>] {
        &self.segments
    }

    /// Returns the symbol table, if the image has one.
    pub fn symbol_table(&self) -> Option<&SymbolTable<A>> {
        self.symbol_table.as_ref()
    }

    /// Loads this slice's raw bytes onto the end of `out`.
    fn load_buffer(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let start = out.len();
        let size = self.content_size as usize;
        out.try_reserve_exact(size)
            .map_err(|_| Error::OutOfMemory { needed: size })?;
        out.resize(start + size, 0);
        self.file
            .seek(SeekFrom::Start(self.content_offset))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        self.file
            .read_exact(&mut out[start..])
            .map_err(|_| Error::ReadFailed("failed to load image for serialization".into()))?;
        Ok(start)
    }

    /// Sums deferred-write growth per segment. Fails on any shrink.
    fn segment_resizes(&self) -> Result<(BTreeMap<String, u64>, u64)> {
        let mut resizes: BTreeMap<String, u64> = BTreeMap::new();
        let mut total: u64 = 0;
        for ((segment_name, section_name), write) in &self.deferred_writes {
            let new_size = write.data.len() as u64;
            if new_size < write.original_size {
                warn!("shrinking section {segment_name},{section_name} is unsupported");
                return Err(Error::NotImplemented("shrinking segments".into()));
            }
            let adjustment = new_size - write.original_size;
            *resizes.entry(segment_name.clone()).or_insert(0) += adjustment;
            total += adjustment;
        }
        Ok((resizes, total))
    }
}

impl<A: MachArch> MachFile for MachSlice<A> {
    fn swap_bytes(&self) -> bool {
        self.swap_bytes
    }

    fn content_offset(&self) -> u64 {
        self.content_offset
    }

    fn content_size(&self) -> u64 {
        self.content_size
    }

    fn arch_name(&self) -> &'static str {
        A::NAME
    }

    fn has_deferred_writes(&self) -> bool {
        !self.deferred_writes.is_empty()
    }

    fn section_info(&self, segment: &str, section: &str) -> Option<(u64, u64)> {
        for seg in &self.segments {
            if seg.command.name() != segment {
                continue;
            }
            for sect in &seg.sections {
                if sect.name() == section {
                    let offset = u64::from(sect.file_offset()) + self.content_offset;
                    return Some((offset, sect.data_size()));
                }
            }
        }
        None
    }

    fn read_section(
        &mut self,
        segment: &str,
        section: &str,
        trailing_zero_bytes: usize,
    ) -> Result<Option<Vec<u8>>> {
        let Some((offset, size)) = self.section_info(segment, section) else {
            return Ok(None);
        };

        let size = size as usize;
        let total = size + trailing_zero_bytes;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| Error::OutOfMemory { needed: total })?;
        data.resize(size, 0);

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        self.file.read_exact(&mut data).map_err(|_| {
            Error::ReadFailed(format!("failed to read section {segment},{section}"))
        })?;

        data.resize(total, 0);
        Ok(Some(data))
    }

    fn write_section(
        &mut self,
        segment: &str,
        section: &str,
        data: Vec<u8>,
    ) -> Result<WriteStatus> {
        let Some((offset, existing_size)) = self.section_info(segment, section) else {
            return Err(Error::WriteFailed(format!(
                "attempt to write non-existent section {segment},{section}"
            )));
        };

        if data.len() as u64 == existing_size {
            self.file
                .seek(SeekFrom::Start(offset))
                .map_err(|e| Error::WriteFailed(e.to_string()))?;
            self.file.write_all(&data).map_err(|_| {
                Error::WriteFailed(format!("failed to write section {segment},{section}"))
            })?;
            return Ok(WriteStatus::Applied);
        }

        debug!(
            "deferring resize of {segment},{section}: {} -> {} bytes",
            existing_size,
            data.len()
        );
        self.deferred_writes.insert(
            (segment.to_string(), section.to_string()),
            DeferredWrite {
                data,
                original_size: existing_size,
            },
        );
        Ok(WriteStatus::Deferred)
    }

    fn serialize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let mach_offset = self.load_buffer(out)?;
        if self.deferred_writes.is_empty() {
            return Ok(());
        }

        let (segment_resizes, total_resize) = self.segment_resizes()?;

        // End of the last segment's data within the buffer. Anything after it
        // (symbol tables in object files, container slack) shifts up whole.
        let last = self
            .segments
            .last()
            .ok_or_else(|| Error::invalid("image has no segments"))?;
        let segment_data_end =
            mach_offset + (last.command.file_off() + last.command.file_size()) as usize;
        let trailing = out.len() - segment_data_end;

        let grown_len = out.len() + total_resize as usize;
        out.try_reserve_exact(total_resize as usize)
            .map_err(|_| Error::OutOfMemory {
                needed: total_resize as usize,
            })?;
        out.resize(grown_len, 0);
        if trailing > 0 {
            out.copy_within(
                segment_data_end..segment_data_end + trailing,
                segment_data_end + total_resize as usize,
            );
        }

        // Walk segments in reverse file order so every move lands in space
        // that has already been vacated (or never occupied).
        let swap = self.swap_bytes;
        let mut remaining = total_resize;
        for seg in self.segments.iter().rev() {
            if remaining == 0 {
                break;
            }

            let segment_name = seg.command.name().to_string();
            let segment_resize = segment_resizes.get(&segment_name).copied().unwrap_or(0);
            let old_fileoff = seg.command.file_off();
            let filesize = seg.command.file_size();
            remaining -= segment_resize;
            let new_fileoff = old_fileoff + remaining;

            let command_offset = mach_offset + seg.command_offset as usize;
            let mut command: A::SegmentCommand = struct_at(out, command_offset, swap)?;
            command.set_file_off(new_fileoff);
            command.set_file_size(filesize + segment_resize);
            write_struct_at(out, command_offset, command, swap);

            if segment_resize == 0 {
                // No sections replaced: the data block moves as a whole.
                let src = mach_offset + old_fileoff as usize;
                let dst = mach_offset + new_fileoff as usize;
                out.copy_within(src..src + filesize as usize, dst);
                continue;
            }

            // Replaced sections consume shift as they are injected; the
            // sections above them move by whatever is still outstanding.
            let section_base = command_offset + size_of::<A::SegmentCommand>();
            let mut section_shift = remaining + segment_resize;
            for index in (0..seg.sections.len()).rev() {
                let entry_offset = section_base + index * size_of::<A::Section>();
                let mut section: A::Section = struct_at(out, entry_offset, swap)?;
                let path = (segment_name.clone(), section.name().to_string());

                if let Some(write) = self.deferred_writes.get(&path) {
                    section_shift -= write.data.len() as u64 - write.original_size;
                    let new_offset = section.file_offset() + section_shift as u32;
                    section.set_file_offset(new_offset);
                    section.set_data_size(write.data.len() as u64);
                    let dst = mach_offset + new_offset as usize;
                    out[dst..dst + write.data.len()].copy_from_slice(&write.data);
                } else {
                    let old_offset = section.file_offset();
                    let new_offset = old_offset + section_shift as u32;
                    let src = mach_offset + old_offset as usize;
                    let dst = mach_offset + new_offset as usize;
                    out.copy_within(src..src + section.data_size() as usize, dst);
                    section.set_file_offset(new_offset);
                }

                write_struct_at(out, entry_offset, section, swap);
            }
        }
        // Segments below the lowest resized one are already in place.

        self.deferred_writes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::arch::Arch64;
    use crate::macho::constants::{LC_SEGMENT_64, MH_MAGIC_64};
    use crate::macho::structs::{MachHeader64, Section64, SegmentCommand64};
    use std::io::Write as _;
    use zerocopy::FromZeros;

    const HEADER_SIZE: usize = size_of::<MachHeader64>();
    const SEG_SIZE: usize = size_of::<SegmentCommand64>();
    const SECT_SIZE: usize = size_of::<Section64>();

    /// Builds a thin 64-bit image: one segment holding three 8-byte
    /// sections laid out back to back after the load commands.
    fn build_test_macho() -> Vec<u8> {
        let nsects = 3u32;
        let cmdsize = (SEG_SIZE + nsects as usize * SECT_SIZE) as u32;
        let data_start = (HEADER_SIZE + cmdsize as usize) as u64;

        let header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: 0x0100000C,
            cpusubtype: 0,
            filetype: 0x1,
            ncmds: 1,
            sizeofcmds: cmdsize,
            flags: 0,
            reserved: 0,
        };

        let mut seg = SegmentCommand64::new_zeroed();
        seg.cmd = LC_SEGMENT_64;
        seg.cmdsize = cmdsize;
        seg.set_name("__TEST");
        seg.fileoff = data_start;
        seg.filesize = 24;
        seg.nsects = nsects;

        let mut out = Vec::new();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(seg.as_bytes());

        for (i, name) in ["__one", "__two", "__three"].iter().enumerate() {
            let mut sect = Section64::new_zeroed();
            sect.set_name(name);
            sect.set_segment_name("__TEST");
            sect.size = 8;
            sect.offset = (data_start + i as u64 * 8) as u32;
            out.extend_from_slice(sect.as_bytes());
        }

        out.extend_from_slice(&[0x11; 8]);
        out.extend_from_slice(&[0x22; 8]);
        out.extend_from_slice(&[0x33; 8]);
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn open_slice(f: &tempfile::NamedTempFile, size: u64) -> MachSlice<Arch64> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(f.path())
            .unwrap();
        MachSlice::<Arch64>::read(file, 0, size, false).unwrap()
    }

    #[test]
    fn test_parse_segments_and_sections() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let slice = open_slice(&f, bytes.len() as u64);

        assert_eq!(slice.segments().len(), 1);
        assert_eq!(slice.segments()[0].command.name(), "__TEST");
        assert_eq!(slice.segments()[0].sections.len(), 3);

        let (off, size) = slice.section_info("__TEST", "__two").unwrap();
        assert_eq!(size, 8);
        assert_eq!(off, (HEADER_SIZE + SEG_SIZE + 3 * SECT_SIZE + 8) as u64);
        assert!(slice.section_info("__TEST", "__none").is_none());
        assert!(slice.section_info("__NONE", "__two").is_none());
    }

    #[test]
    fn test_read_section_with_trailer() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let mut slice = open_slice(&f, bytes.len() as u64);

        let data = slice.read_section("__TEST", "__one", 2).unwrap().unwrap();
        assert_eq!(data.len(), 10);
        assert_eq!(&data[..8], &[0x11; 8]);
        assert_eq!(&data[8..], &[0, 0]);

        assert!(slice.read_section("__TEST", "__missing", 0).unwrap().is_none());
    }

    #[test]
    fn test_write_section_in_place() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let mut slice = open_slice(&f, bytes.len() as u64);

        let status = slice
            .write_section("__TEST", "__two", vec![0xAA; 8])
            .unwrap();
        assert_eq!(status, WriteStatus::Applied);
        assert!(!slice.has_deferred_writes());

        let data = slice.read_section("__TEST", "__two", 0).unwrap().unwrap();
        assert_eq!(data, vec![0xAA; 8]);
    }

    #[test]
    fn test_write_missing_section_fails() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let mut slice = open_slice(&f, bytes.len() as u64);

        let err = slice
            .write_section("__TEST", "__missing", vec![0; 8])
            .unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
    }

    #[test]
    fn test_serialize_grows_section_and_patches_offsets() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let mut slice = open_slice(&f, bytes.len() as u64);

        let status = slice
            .write_section("__TEST", "__two", vec![0xBB; 12])
            .unwrap();
        assert_eq!(status, WriteStatus::Deferred);
        assert!(slice.has_deferred_writes());

        let mut out = Vec::new();
        slice.serialize(&mut out).unwrap();
        assert_eq!(out.len(), bytes.len() + 4);

        // Re-parse the serialized image.
        let f2 = write_temp(&out);
        let mut reparsed = open_slice(&f2, out.len() as u64);

        let (one_off, one_size) = reparsed.section_info("__TEST", "__one").unwrap();
        let (two_off, two_size) = reparsed.section_info("__TEST", "__two").unwrap();
        let (three_off, three_size) = reparsed.section_info("__TEST", "__three").unwrap();

        // __one untouched, __two grew in place, __three shifted up by 4.
        let data_start = (HEADER_SIZE + SEG_SIZE + 3 * SECT_SIZE) as u64;
        assert_eq!((one_off, one_size), (data_start, 8));
        assert_eq!((two_off, two_size), (data_start + 8, 12));
        assert_eq!((three_off, three_size), (data_start + 24, 8));

        assert_eq!(
            reparsed.read_section("__TEST", "__one", 0).unwrap().unwrap(),
            vec![0x11; 8]
        );
        assert_eq!(
            reparsed.read_section("__TEST", "__two", 0).unwrap().unwrap(),
            vec![0xBB; 12]
        );
        assert_eq!(
            reparsed
                .read_section("__TEST", "__three", 0)
                .unwrap()
                .unwrap(),
            vec![0x33; 8]
        );

        // Segment command reflects the growth.
        let seg = &reparsed.segments()[0];
        assert_eq!(seg.command.file_size(), 28);
        assert_eq!(seg.command.file_off(), data_start);
    }

    #[test]
    fn test_parse_swapped_image() {
        // Serialize every structure in reversed byte order, as a file from
        // an opposite-endian producer would appear.
        let nsects = 1u32;
        let cmdsize = (SEG_SIZE + SECT_SIZE) as u32;
        let data_start = (HEADER_SIZE + cmdsize as usize) as u64;

        let mut header = MachHeader64 {
            magic: MH_MAGIC_64,
            cputype: 0x0100000C,
            cpusubtype: 0,
            filetype: 0x1,
            ncmds: 1,
            sizeofcmds: cmdsize,
            flags: 0,
            reserved: 0,
        };
        let mut seg = SegmentCommand64::new_zeroed();
        seg.cmd = LC_SEGMENT_64;
        seg.cmdsize = cmdsize;
        seg.set_name("__TEST");
        seg.fileoff = data_start;
        seg.filesize = 8;
        seg.nsects = nsects;
        let mut sect = Section64::new_zeroed();
        sect.set_name("__one");
        sect.set_segment_name("__TEST");
        sect.size = 8;
        sect.offset = data_start as u32;

        use crate::macho::structs::SwapBytes as _;
        header.swap_fields();
        seg.swap_fields();
        sect.swap_fields();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(seg.as_bytes());
        bytes.extend_from_slice(sect.as_bytes());
        bytes.extend_from_slice(&[0x44; 8]);

        let f = write_temp(&bytes);
        let file = File::options()
            .read(true)
            .write(true)
            .open(f.path())
            .unwrap();
        let mut slice =
            MachSlice::<Arch64>::read(file, 0, bytes.len() as u64, true).unwrap();

        assert_eq!(slice.segments()[0].command.name(), "__TEST");
        let (off, size) = slice.section_info("__TEST", "__one").unwrap();
        assert_eq!((off, size), (data_start, 8));
        assert_eq!(
            slice.read_section("__TEST", "__one", 0).unwrap().unwrap(),
            vec![0x44; 8]
        );

        // A grown section serializes with the swapped byte order intact.
        slice
            .write_section("__TEST", "__one", vec![0x55; 12])
            .unwrap();
        let mut out = Vec::new();
        slice.serialize(&mut out).unwrap();

        let f2 = write_temp(&out);
        let file2 = File::options()
            .read(true)
            .write(true)
            .open(f2.path())
            .unwrap();
        let mut reparsed =
            MachSlice::<Arch64>::read(file2, 0, out.len() as u64, true).unwrap();
        let (off, size) = reparsed.section_info("__TEST", "__one").unwrap();
        assert_eq!((off, size), (data_start, 12));
        assert_eq!(reparsed.segments()[0].command.file_size(), 12);
        assert_eq!(
            reparsed.read_section("__TEST", "__one", 0).unwrap().unwrap(),
            vec![0x55; 12]
        );
    }

    #[test]
    fn test_serialize_rejects_shrink() {
        let bytes = build_test_macho();
        let f = write_temp(&bytes);
        let mut slice = open_slice(&f, bytes.len() as u64);

        slice
            .write_section("__TEST", "__two", vec![0xCC; 4])
            .unwrap();
        let mut out = Vec::new();
        let err = slice.serialize(&mut out).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }
}
