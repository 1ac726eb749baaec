//! Mach-O container and image handling.
//!
//! This module provides the format-discriminating container, the generic
//! 32/64-bit slice parser with its deferred-write engine, and the raw
//! on-disk structures they share.

pub mod arch;
pub mod constants;
pub mod container;
pub mod slice;
pub mod structs;

pub use arch::{Arch32, Arch64, MachArch};
pub use constants::*;
pub use container::{FileFormat, MachOContainer};
pub use slice::{DeferredWrite, MachFile, MachSegment, MachSlice, SectionPath, SymbolTable};
pub use structs::*;
