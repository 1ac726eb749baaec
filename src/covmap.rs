//! LLVM coverage-map patching.
//!
//! `__DATA,__llvm_covmap` holds one or more coverage mappings, each carrying
//! a group of length-prefixed filenames that encoded coverage data references
//! by index. Rewriting a path prefix changes filename lengths, but the
//! section cannot move relative to its neighbors, so a modified group is
//! re-serialized at exactly its original byte size by appending synthetic
//! filler filenames. Fillers are appended after the real names and are never
//! referenced by the coverage data, so they are invisible to consumers.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::macho::MachFile;
use crate::prefix::PrefixMap;
use crate::reader::ByteReader;
use crate::util::{encode_uleb128, uleb128_len};

/// Segment holding the coverage map.
pub const COVMAP_SEGMENT: &str = "__DATA";
/// Section holding the coverage map.
pub const COVMAP_SECTION: &str = "__llvm_covmap";

/// A filename group: its section offset, current serialized size, and names.
#[derive(Debug, Clone)]
struct FilenameGroup {
    /// Byte offset of the group within the section.
    offset: usize,
    /// Serialized size of the group as it exists in the section.
    size: usize,
    /// Filenames in index order.
    filenames: Vec<Vec<u8>>,
}

impl FilenameGroup {
    /// Serialized size of the group without any padding.
    fn natural_size(&self) -> usize {
        let mut size = uleb128_len(self.filenames.len() as u64);
        for name in &self.filenames {
            size += uleb128_len(name.len() as u64) + name.len();
        }
        size
    }

    /// Serializes the group, padding with filler filenames up to
    /// `minimum_size`.
    ///
    /// The order of the real strings is preserved because coverage data
    /// refers to filenames by index; fillers go at the end where nothing
    /// references them. Fails when the group cannot be expressed in exactly
    /// `minimum_size` bytes.
    fn serialize(&self, out: &mut Vec<u8>, minimum_size: usize) -> Result<()> {
        let natural = self.natural_size();
        if natural > minimum_size {
            return Err(Error::invalid(format!(
                "covmap filename group at offset {} grew from {} to {natural} bytes; \
                 resizing the section is unsupported",
                self.offset, minimum_size
            )));
        }

        let real_count = self.filenames.len() as u64;
        let mut padding = minimum_size - natural;
        let mut fillers: u64 = 0;
        if padding > 0 {
            // Growing the count may lengthen its ULEB128 encoding; the
            // growth has to come out of the padding byte budget, which in
            // turn can change how many fillers are needed. The recurrence
            // settles immediately unless the count sits at an encoding
            // boundary; a count and padding that never settle cannot be
            // expressed in exactly this many bytes.
            fillers = (padding as u64 + 127) / 128;
            let mut converged = false;
            for _ in 0..4 {
                let delta = uleb128_len(real_count + fillers) - uleb128_len(real_count);
                if delta >= padding {
                    return Err(Error::invalid(format!(
                        "cannot pad covmap filename group at offset {}: {padding} bytes \
                         needed but the filename count requires {delta} more",
                        self.offset
                    )));
                }
                let adjusted = padding - delta;
                let needed = (adjusted as u64 + 127) / 128;
                if needed == fillers {
                    padding = adjusted;
                    converged = true;
                    break;
                }
                fillers = needed;
            }
            if !converged {
                return Err(Error::invalid(format!(
                    "cannot pad covmap filename group at offset {}: padding does not \
                     fit around the filename count encoding",
                    self.offset
                )));
            }
        }

        out.reserve(minimum_size);
        encode_uleb128(out, real_count + fillers);
        for name in &self.filenames {
            encode_uleb128(out, name.len() as u64);
            out.extend_from_slice(name);
        }

        // Inject NUL-filled 127-character fillers (128 bytes each), leaving
        // room for one or two final strings. A residue of 129 is special
        // cased into a 126-char and a 1-char filler, as a single trailing
        // byte cannot be expressed as a length-prefixed string.
        while padding > 129 {
            out.push(127);
            out.extend(std::iter::repeat(0).take(127));
            padding -= 128;
        }
        if padding == 129 {
            out.push(126);
            out.extend(std::iter::repeat(0).take(126));
            padding -= 127;
        }
        if padding > 0 {
            out.push((padding - 1) as u8);
            out.extend(std::iter::repeat(0).take(padding - 1));
        }

        Ok(())
    }
}

/// A parsed `__llvm_covmap` section.
#[derive(Debug)]
pub struct CovmapSection {
    data: Vec<u8>,
    groups: Vec<FilenameGroup>,
}

impl CovmapSection {
    /// Parses every coverage mapping in the section.
    ///
    /// Fails unless the final mapping ends exactly at the section end.
    pub fn parse(data: Vec<u8>, swap_bytes: bool) -> Result<Self> {
        let mut groups = Vec::new();
        {
            let mut reader = ByteReader::new(&data, swap_bytes);
            let mut has_more = true;
            while has_more {
                has_more = Self::read_coverage_mapping(&mut reader, &mut groups)?;
            }
            if reader.remaining() != 0 {
                return Err(Error::invalid(format!(
                    "covmap parse ended at {} of {} bytes",
                    reader.position(),
                    reader.len()
                )));
            }
        }
        Ok(Self { data, groups })
    }

    /// Reads one coverage mapping; returns whether another follows.
    fn read_coverage_mapping(
        reader: &mut ByteReader<'_>,
        groups: &mut Vec<FilenameGroup>,
    ) -> Result<bool> {
        let function_records = reader.read_u32()?;
        let filenames_size = reader.read_u32()? as usize;
        let coverage_size = reader.read_u32()? as usize;
        let version = reader.read_u32()? + 1;

        match version {
            1 => {
                for _ in 0..function_records {
                    reader.read_u64()?; // name_ref
                    reader.read_u32()?; // name_len
                    reader.read_u32()?; // data_size
                    reader.read_u64()?; // func_hash
                }
            }
            2 => {
                for _ in 0..function_records {
                    reader.read_u64()?; // name_md5
                    reader.read_u32()?; // data_size
                    reader.read_u64()?; // func_hash
                }
            }
            _ => {
                return Err(Error::invalid(format!(
                    "covmap version {version} is not supported"
                )));
            }
        }

        let data_start = reader.position();
        groups.push(Self::read_filename_group(reader)?);

        let data_end = data_start + filenames_size + coverage_size;
        if data_end > reader.len() {
            return Err(Error::invalid("covmap data extends beyond end of section"));
        }
        reader.seek(data_end)?;

        if data_end >= reader.len() {
            return Ok(false);
        }
        // The next mapping begins at the next 8-byte boundary.
        let misalign = data_end & 0x7;
        if misalign != 0 {
            reader.skip(8 - misalign)?;
        }
        Ok(true)
    }

    fn read_filename_group(reader: &mut ByteReader<'_>) -> Result<FilenameGroup> {
        let offset = reader.position();
        let num_filenames = reader.read_uleb128()?;

        let mut filenames = Vec::with_capacity(num_filenames as usize);
        for _ in 0..num_filenames {
            let len = reader.read_uleb128()? as usize;
            filenames.push(reader.read_bytes(len)?.to_vec());
        }

        Ok(FilenameGroup {
            offset,
            size: reader.position() - offset,
            filenames,
        })
    }

    /// Rewrites filename prefixes, consuming the section.
    ///
    /// Returns the (possibly rewritten) section bytes and whether anything
    /// changed. Every modified group re-serializes at its original size, so
    /// the returned buffer always matches the input length.
    pub fn patch_filenames(mut self, prefix_map: &PrefixMap) -> Result<(Vec<u8>, bool)> {
        let mut modified = false;
        let mut replacements: Vec<(usize, Vec<u8>)> = Vec::new();

        for group in &self.groups {
            let mut new_filenames = Vec::with_capacity(group.filenames.len());
            let mut needs_rewrite = false;

            for name in &group.filenames {
                match prefix_map.rewrite_bytes(name) {
                    Some(replaced) if replaced != *name => {
                        needs_rewrite = true;
                        new_filenames.push(replaced);
                    }
                    _ => new_filenames.push(name.clone()),
                }
            }

            if !needs_rewrite {
                continue;
            }
            modified = true;

            let new_group = FilenameGroup {
                offset: group.offset,
                size: group.size,
                filenames: new_filenames,
            };
            let mut serialized = Vec::new();
            new_group.serialize(&mut serialized, group.size)?;
            debug_assert_eq!(serialized.len(), group.size);
            replacements.push((group.offset, serialized));
        }

        if !modified {
            return Ok((self.data, false));
        }

        for (offset, bytes) in replacements {
            self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }
        Ok((self.data, true))
    }

    /// Number of filename groups found during parsing.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Rewrites path prefixes inside LLVM coverage maps.
#[derive(Debug)]
pub struct CovmapPatcher {
    prefix_map: PrefixMap,
}

impl CovmapPatcher {
    /// Creates a patcher applying `prefix_map`.
    pub fn new(prefix_map: PrefixMap) -> Self {
        Self { prefix_map }
    }

    /// Patches the coverage map of one image.
    ///
    /// A missing `__llvm_covmap` section is a warning, not an error.
    pub fn patch(&self, file: &mut dyn MachFile) -> Result<()> {
        let Some(data) = file.read_section(COVMAP_SEGMENT, COVMAP_SECTION, 0)? else {
            warn!(
                "no {COVMAP_SEGMENT},{COVMAP_SECTION} section in {} slice; skipping",
                file.arch_name()
            );
            return Ok(());
        };

        let section = CovmapSection::parse(data, file.swap_bytes())?;
        debug!(
            "parsed {} covmap filename group(s) in {} slice",
            section.group_count(),
            file.arch_name()
        );

        let (new_data, data_was_modified) = section.patch_filenames(&self.prefix_map)?;
        if data_was_modified {
            file.write_section(COVMAP_SEGMENT, COVMAP_SECTION, new_data)?;
            debug!("rewrote {COVMAP_SEGMENT},{COVMAP_SECTION} in place");
        }

        Ok(())
    }
}
