//! DWARF patch orchestration.
//!
//! Sections are processed in dependency order: `__debug_line` first (it is
//! self-contained), then `__debug_str`; only when the string pool grows are
//! `__debug_abbrev` and `__debug_info` touched, because the info walk exists
//! solely to relocate string references through the map the rebuild
//! produced.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::macho::MachFile;
use crate::prefix::PrefixMap;

use super::abbrev::parse_abbrev_tables;
use super::info::relocate_string_references;
use super::line::{patch_line_section, LinePatch};
use super::strings::{patch_string_section, RelocationTable, StringPatch};

/// Segment holding the DWARF sections.
pub const DWARF_SEGMENT: &str = "__DWARF";
/// String pool section.
pub const DEBUG_STR_SECTION: &str = "__debug_str";
/// Debugging-entry tree section.
pub const DEBUG_INFO_SECTION: &str = "__debug_info";
/// Abbreviation schema section.
pub const DEBUG_ABBREV_SECTION: &str = "__debug_abbrev";
/// Line-number program section.
pub const DEBUG_LINE_SECTION: &str = "__debug_line";

/// Rewrites path prefixes inside DWARF debug information.
#[derive(Debug)]
pub struct DwarfPatcher {
    prefix_map: PrefixMap,
}

impl DwarfPatcher {
    /// Creates a patcher applying `prefix_map`.
    pub fn new(prefix_map: PrefixMap) -> Self {
        Self { prefix_map }
    }

    /// Patches the DWARF sections of one image.
    ///
    /// Missing sections are warnings, not errors; object files built
    /// without debug info simply pass through.
    pub fn patch(&self, file: &mut dyn MachFile) -> Result<()> {
        self.patch_line_info(file)?;

        let Some(relocations) = self.patch_string_table(file)? else {
            return Ok(());
        };

        // The string pool grew: every strp reference needs relocating.
        let Some(info_data) = file.read_section(DWARF_SEGMENT, DEBUG_INFO_SECTION, 0)? else {
            warn!(
                "no {DWARF_SEGMENT},{DEBUG_INFO_SECTION} section in {} slice; \
                 no string references to relocate",
                file.arch_name()
            );
            return Ok(());
        };
        let Some(abbrev_data) = file.read_section(DWARF_SEGMENT, DEBUG_ABBREV_SECTION, 0)? else {
            return Err(Error::invalid(format!(
                "{DEBUG_INFO_SECTION} present without {DEBUG_ABBREV_SECTION}"
            )));
        };
        let abbrev_tables = parse_abbrev_tables(&abbrev_data)?;
        debug!("parsed {} abbreviation table(s)", abbrev_tables.len());

        let mut info_data = info_data;
        let modified = relocate_string_references(
            &mut info_data,
            file.swap_bytes(),
            &abbrev_tables,
            &relocations,
        )?;
        if modified {
            // Same-size write; only offset values changed.
            file.write_section(DWARF_SEGMENT, DEBUG_INFO_SECTION, info_data)?;
            debug!("rewrote {DWARF_SEGMENT},{DEBUG_INFO_SECTION} string references");
        }

        Ok(())
    }

    fn patch_line_info(&self, file: &mut dyn MachFile) -> Result<()> {
        let Some(data) = file.read_section(DWARF_SEGMENT, DEBUG_LINE_SECTION, 0)? else {
            warn!(
                "no {DWARF_SEGMENT},{DEBUG_LINE_SECTION} section in {} slice; skipping",
                file.arch_name()
            );
            return Ok(());
        };

        match patch_line_section(data, file.swap_bytes(), &self.prefix_map)? {
            LinePatch::Unchanged => {}
            LinePatch::InPlace(patched) => {
                file.write_section(DWARF_SEGMENT, DEBUG_LINE_SECTION, patched)?;
                debug!("rewrote {DWARF_SEGMENT},{DEBUG_LINE_SECTION} in place");
            }
            LinePatch::Rebuilt(patched) => {
                file.write_section(DWARF_SEGMENT, DEBUG_LINE_SECTION, patched)?;
                debug!("queued grown {DWARF_SEGMENT},{DEBUG_LINE_SECTION}");
            }
        }
        Ok(())
    }

    /// Patches `__debug_str`, returning the relocation table when the pool
    /// was rebuilt at a new size.
    fn patch_string_table(&self, file: &mut dyn MachFile) -> Result<Option<RelocationTable>> {
        // One guard byte terminates the final entry; DWARF string tables
        // may omit its NUL and delimit by section size.
        let Some(data) = file.read_section(DWARF_SEGMENT, DEBUG_STR_SECTION, 1)? else {
            warn!(
                "no {DWARF_SEGMENT},{DEBUG_STR_SECTION} section in {} slice; skipping",
                file.arch_name()
            );
            return Ok(None);
        };

        match patch_string_section(&data, &self.prefix_map) {
            StringPatch::Unchanged => Ok(None),
            StringPatch::InPlace(patched) => {
                file.write_section(DWARF_SEGMENT, DEBUG_STR_SECTION, patched)?;
                debug!("rewrote {DWARF_SEGMENT},{DEBUG_STR_SECTION} in place");
                Ok(None)
            }
            StringPatch::Rebuilt { data, relocations } => {
                file.write_section(DWARF_SEGMENT, DEBUG_STR_SECTION, data)?;
                debug!(
                    "queued grown {DWARF_SEGMENT},{DEBUG_STR_SECTION} \
                     ({} relocated string(s))",
                    relocations.len()
                );
                Ok(Some(relocations))
            }
        }
    }
}
