//! machpatch - rewrites source-path prefixes in Mach-O debug information.
//!
//! Builds that run inside a sandbox bake absolute sandbox paths into their
//! binaries' debug data. This library rewrites those prefixes in place so
//! debuggers and coverage tools resolve sources on the developer's
//! workstation, in two places:
//!
//! - LLVM code-coverage maps (`__DATA,__llvm_covmap`)
//! - DWARF debug info (`__DWARF,__debug_str`, `__debug_info`,
//!   `__debug_abbrev`, `__debug_line`)
//!
//! Rewrites that change a section's size are deferred and applied by
//! re-serializing the affected image with every segment and section offset
//! patched, so the output stays a valid Mach-O file.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use machpatch::{patch_file, PatchSettings, PrefixMap};
//!
//! fn main() -> machpatch::Result<()> {
//!     let settings = PatchSettings {
//!         patch_coverage_maps: true,
//!         patch_dwarf: true,
//!         prefix_map: PrefixMap::from_pair("/private/var/sandbox/src", "/Users/dev/src"),
//!     };
//!     patch_file(Path::new("build/out.o"), &settings)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod covmap;
pub mod dwarf;
pub mod error;
pub mod macho;
pub mod prefix;
pub mod reader;
pub mod util;

// Re-export main types
pub use covmap::CovmapPatcher;
pub use dwarf::DwarfPatcher;
pub use error::{Error, Result, WriteStatus};
pub use macho::{FileFormat, MachFile, MachOContainer};
pub use prefix::PrefixMap;

use std::path::Path;

use tracing::info;

/// What to patch and with which rewrites.
#[derive(Debug)]
pub struct PatchSettings {
    /// Patch LLVM coverage maps.
    pub patch_coverage_maps: bool,
    /// Patch DWARF strings, line info, and string references.
    pub patch_dwarf: bool,
    /// Prefix rewrite rules, applied longest-match-first.
    pub prefix_map: PrefixMap,
}

/// Patches one Mach-O file in place.
///
/// Every enabled patcher runs against every image in the file; queued
/// size-changing writes are committed at the end. The file is modified
/// only where a prefix actually matched.
pub fn patch_file(path: &Path, settings: &PatchSettings) -> Result<()> {
    info!("patching {}", path.display());
    let mut container = MachOContainer::open(path)?;

    let covmap_patcher = settings
        .patch_coverage_maps
        .then(|| CovmapPatcher::new(settings.prefix_map.clone()));
    let dwarf_patcher = settings
        .patch_dwarf
        .then(|| DwarfPatcher::new(settings.prefix_map.clone()));

    for slice in container.slices() {
        info!("processing {} slice", slice.arch_name());
        if let Some(patcher) = &covmap_patcher {
            patcher.patch(&mut *slice)?;
        }
        if let Some(patcher) = &dwarf_patcher {
            patcher.patch(&mut *slice)?;
        }
    }

    container.commit_deferred_writes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwarf::{
        DEBUG_ABBREV_SECTION, DEBUG_INFO_SECTION, DEBUG_STR_SECTION, DWARF_SEGMENT,
    };
    use crate::macho::structs::{SectionExt, SegmentCommandExt};
    use crate::macho::{MachHeader64, Section64, SegmentCommand64, LC_SEGMENT_64, MH_MAGIC_64};
    use crate::util::encode_uleb128;
    use std::fs;
    use std::io::Write as _;
    use std::mem::size_of;
    use zerocopy::{FromZeros, IntoBytes};

    /// Builds a thin 64-bit object with one segment holding the given
    /// sections back to back.
    fn build_object(segment: &str, sections: &[(&str, &[u8])]) -> Vec<u8> {
        let nsects = sections.len() as u32;
        let cmdsize =
            (size_of::<SegmentCommand64>() + nsects as usize * size_of::<Section64>()) as u32;
        let data_start = (size_of::<MachHeader64>() + cmdsize as usize) as u64;
        let total_data: u64 = sections.iter().map(|(_, d)| d.len() as u64).sum();

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
        seg.set_name(segment);
        seg.fileoff = data_start;
        seg.filesize = total_data;
        seg.nsects = nsects;

        let mut out = Vec::new();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(seg.as_bytes());

        let mut offset = data_start;
        for (name, data) in sections {
            let mut sect = Section64::new_zeroed();
            sect.set_name(name);
            sect.set_segment_name(segment);
            sect.size = data.len() as u64;
            sect.offset = offset as u32;
            out.extend_from_slice(sect.as_bytes());
            offset += data.len() as u64;
        }
        for (_, data) in sections {
            out.extend_from_slice(data);
        }
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    fn dwarf_settings(old: &str, new: &str) -> PatchSettings {
        PatchSettings {
            patch_coverage_maps: false,
            patch_dwarf: true,
            prefix_map: PrefixMap::from_pair(old, new),
        }
    }

    fn read_section(path: &Path, segment: &str, section: &str) -> Vec<u8> {
        let mut container = MachOContainer::open(path).unwrap();
        let mut slices = container.slices();
        slices[0].read_section(segment, section, 0).unwrap().unwrap()
    }

    // __debug_str "/a/x.c\0/usr/y.c\0" with an info unit referencing both
    // strings through DW_FORM_strp.
    fn build_dwarf_object() -> Vec<u8> {
        let debug_str = b"/a/x.c\0/usr/y.c\0";

        let mut abbrev = crate::dwarf::abbrev::tests::declaration(
            1,
            0x11,
            false,
            &[(0x03, crate::dwarf::DW_FORM_STRP), (0x1B, crate::dwarf::DW_FORM_STRP)],
        );
        abbrev.push(0);

        let mut entries = Vec::new();
        encode_uleb128(&mut entries, 1);
        entries.extend_from_slice(&0u32.to_ne_bytes()); // strp -> "/a/x.c"
        entries.extend_from_slice(&7u32.to_ne_bytes()); // strp -> "/usr/y.c"

        let mut info_body = Vec::new();
        info_body.extend_from_slice(&4u16.to_ne_bytes()); // version
        info_body.extend_from_slice(&0u32.to_ne_bytes()); // abbrev offset
        info_body.push(8); // address_size
        info_body.extend_from_slice(&entries);
        let mut debug_info = Vec::new();
        debug_info.extend_from_slice(&(info_body.len() as u32).to_ne_bytes());
        debug_info.extend_from_slice(&info_body);

        build_object(
            DWARF_SEGMENT,
            &[
                ("__debug_abbrev", &abbrev),
                ("__debug_info", &debug_info),
                ("__debug_str", debug_str),
            ],
        )
    }

    #[test]
    fn test_same_length_dwarf_patch_in_place() {
        let bytes = build_dwarf_object();
        let f = write_temp(&bytes);

        patch_file(f.path(), &dwarf_settings("/a", "/b")).unwrap();

        let after = fs::read(f.path()).unwrap();
        assert_eq!(after.len(), bytes.len());
        assert_eq!(
            read_section(f.path(), DWARF_SEGMENT, DEBUG_STR_SECTION),
            b"/b/x.c\0/usr/y.c\0"
        );
        // Untargeted sections are byte-identical.
        assert_eq!(
            read_section(f.path(), DWARF_SEGMENT, DEBUG_INFO_SECTION),
            {
                let g = write_temp(&bytes);
                read_section(g.path(), DWARF_SEGMENT, DEBUG_INFO_SECTION)
            }
        );
    }

    #[test]
    fn test_lengthening_dwarf_patch_grows_file_and_relocates() {
        let bytes = build_dwarf_object();
        let f = write_temp(&bytes);

        patch_file(f.path(), &dwarf_settings("/a", "/bbbb")).unwrap();

        // "/a" -> "/bbbb" grows the pool by 3 bytes, and so the file.
        let after = fs::read(f.path()).unwrap();
        assert_eq!(after.len(), bytes.len() + 3);

        let strings = read_section(f.path(), DWARF_SEGMENT, DEBUG_STR_SECTION);
        assert_eq!(strings, b"/bbbb/x.c\0/usr/y.c\0");

        // The second string moved from offset 7 to 10; the strp follows.
        let info = read_section(f.path(), DWARF_SEGMENT, DEBUG_INFO_SECTION);
        let strp_base = info.len() - 8;
        assert_eq!(
            u32::from_ne_bytes(info[strp_base..strp_base + 4].try_into().unwrap()),
            0
        );
        assert_eq!(
            u32::from_ne_bytes(info[strp_base + 4..].try_into().unwrap()),
            10
        );

        // The abbreviation schema is untouched.
        let g = write_temp(&bytes);
        assert_eq!(
            read_section(f.path(), DWARF_SEGMENT, DEBUG_ABBREV_SECTION),
            read_section(g.path(), DWARF_SEGMENT, DEBUG_ABBREV_SECTION)
        );
    }

    #[test]
    fn test_unmatched_prefix_leaves_file_untouched() {
        let bytes = build_dwarf_object();
        let f = write_temp(&bytes);

        patch_file(f.path(), &dwarf_settings("/nothing", "/matches")).unwrap();
        assert_eq!(fs::read(f.path()).unwrap(), bytes);
    }

    #[test]
    fn test_reverse_patch_restores_string_payloads() {
        let bytes = build_dwarf_object();
        let f = write_temp(&bytes);

        patch_file(f.path(), &dwarf_settings("/a", "/longer")).unwrap();
        patch_file(f.path(), &dwarf_settings("/longer", "/a")).unwrap();

        // The first pass rebuilt the pool ("/longer/x.c" at 0, "/usr/y.c"
        // at 12); the reverse pass shrinks in place, so the second string
        // keeps that offset. Payloads are restored even though the byte
        // layout differs from the original.
        let strings = read_section(f.path(), DWARF_SEGMENT, DEBUG_STR_SECTION);
        assert!(strings.starts_with(b"/a/x.c\0"));
        assert!(strings[12..].starts_with(b"/usr/y.c"));

        // The strp offsets still resolve to those strings.
        let info = read_section(f.path(), DWARF_SEGMENT, DEBUG_INFO_SECTION);
        let strp_base = info.len() - 8;
        let first = u32::from_ne_bytes(info[strp_base..strp_base + 4].try_into().unwrap());
        let second = u32::from_ne_bytes(info[strp_base + 4..].try_into().unwrap());
        assert_eq!(first, 0);
        assert_eq!(second, 12);
    }

    #[test]
    fn test_two_passes_compose() {
        // Patching old->new then new->newer must equal patching old->newer.
        let bytes = build_dwarf_object();
        let two_pass = write_temp(&bytes);
        patch_file(two_pass.path(), &dwarf_settings("/a", "/q")).unwrap();
        patch_file(two_pass.path(), &dwarf_settings("/q", "/z")).unwrap();

        let one_pass = write_temp(&bytes);
        patch_file(one_pass.path(), &dwarf_settings("/a", "/z")).unwrap();

        assert_eq!(
            fs::read(two_pass.path()).unwrap(),
            fs::read(one_pass.path()).unwrap()
        );
    }

    fn build_covmap_object() -> Vec<u8> {
        let mut group = Vec::new();
        encode_uleb128(&mut group, 2);
        for name in [b"/private/sandbox/foo.c".as_slice(), b"/usr/lib/bar.c"] {
            encode_uleb128(&mut group, name.len() as u64);
            group.extend_from_slice(name);
        }

        let coverage = [0xAB_u8; 6];
        let mut covmap = Vec::new();
        covmap.extend_from_slice(&1u32.to_le_bytes());
        covmap.extend_from_slice(&(group.len() as u32).to_le_bytes());
        covmap.extend_from_slice(&(coverage.len() as u32).to_le_bytes());
        covmap.extend_from_slice(&1u32.to_le_bytes()); // version 2
        covmap.extend_from_slice(&0u64.to_le_bytes()); // name_md5
        covmap.extend_from_slice(&8u32.to_le_bytes()); // data_size
        covmap.extend_from_slice(&0u64.to_le_bytes()); // func_hash
        covmap.extend_from_slice(&group);
        covmap.extend_from_slice(&coverage);

        build_object("__DATA", &[("__llvm_covmap", &covmap)])
    }

    #[test]
    fn test_covmap_patch_preserves_section_size() {
        let bytes = build_covmap_object();
        let f = write_temp(&bytes);

        let settings = PatchSettings {
            patch_coverage_maps: true,
            patch_dwarf: false,
            prefix_map: PrefixMap::from_pair("/private/sandbox", "/home/u"),
        };
        patch_file(f.path(), &settings).unwrap();

        let after = fs::read(f.path()).unwrap();
        assert_eq!(after.len(), bytes.len());

        let section = read_section(f.path(), "__DATA", "__llvm_covmap");
        let contains = |needle: &[u8]| section.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"/home/u/foo.c"));
        assert!(contains(b"/usr/lib/bar.c"));
        assert!(!contains(b"/private/sandbox"));

        let parsed = crate::covmap::CovmapSection::parse(section, false).unwrap();
        assert_eq!(parsed.group_count(), 1);
    }

    #[test]
    fn test_missing_covmap_section_is_a_warning() {
        // A DWARF-only object patched in covmap mode: warn and succeed.
        let bytes = build_dwarf_object();
        let f = write_temp(&bytes);

        let settings = PatchSettings {
            patch_coverage_maps: true,
            patch_dwarf: false,
            prefix_map: PrefixMap::from_pair("/a", "/b"),
        };
        patch_file(f.path(), &settings).unwrap();
        assert_eq!(fs::read(f.path()).unwrap(), bytes);
    }
}
