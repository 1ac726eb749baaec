//! DWARF debug-information patching.
//!
//! The patcher rewrites source-path prefixes in the `__debug_str` string
//! pool and `__debug_line` directory tables, and relocates `DW_FORM_strp`
//! references in `__debug_info` when the string pool has to grow. No DWARF
//! semantics are interpreted beyond what locating and resizing those
//! strings requires.

pub mod abbrev;
pub mod constants;
pub mod info;
pub mod line;
pub mod patcher;
pub mod strings;

pub use abbrev::{Abbreviation, AbbreviationTable, Attribute};
pub use constants::*;
pub use line::LinePatch;
pub use patcher::{
    DwarfPatcher, DEBUG_ABBREV_SECTION, DEBUG_INFO_SECTION, DEBUG_LINE_SECTION,
    DEBUG_STR_SECTION, DWARF_SEGMENT,
};
pub use strings::{RelocationTable, StringPatch};
