//! Bitness descriptors for the generic slice machinery.
//!
//! The same parsing and serialization algorithms serve 32-bit and 64-bit
//! images; the descriptor binds the concrete header, segment-command,
//! section, and nlist layouts plus the segment load-command ID for one
//! bitness. The slice code is written once against the accessor traits in
//! [`super::structs`].

use std::fmt::Debug;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::{LC_SEGMENT, LC_SEGMENT_64};
use super::structs::{
    MachHeader32, MachHeader64, MachHeaderExt, Nlist32, Nlist64, NlistExt, Section32, Section64,
    SectionExt, SegmentCommand32, SegmentCommand64, SegmentCommandExt, SwapBytes,
};

/// Bound alias for the zerocopy + swap machinery every raw struct needs.
pub trait RawStruct:
    FromBytes + IntoBytes + KnownLayout + Immutable + SwapBytes + Clone + Copy + Debug + Send + Sync
{
}

impl<T> RawStruct for T where
    T: FromBytes
        + IntoBytes
        + KnownLayout
        + Immutable
        + SwapBytes
        + Clone
        + Copy
        + Debug
        + Send
        + Sync
{
}

/// Descriptor selecting the on-disk layouts for one Mach-O bitness.
pub trait MachArch: Debug + Send + Sync + 'static {
    /// Mach header layout.
    type Header: RawStruct + MachHeaderExt;
    /// Segment command layout.
    type SegmentCommand: RawStruct + SegmentCommandExt;
    /// Section entry layout.
    type Section: RawStruct + SectionExt;
    /// Symbol table entry layout.
    type Nlist: RawStruct + NlistExt;

    /// Load command ID introducing a segment of this bitness.
    const SEGMENT_COMMAND: u32;
    /// Short name used in log output.
    const NAME: &'static str;
}

/// 32-bit Mach-O images.
#[derive(Debug)]
pub enum Arch32 {}

/// 64-bit Mach-O images.
#[derive(Debug)]
pub enum Arch64 {}

impl MachArch for Arch32 {
    type Header = MachHeader32;
    type SegmentCommand = SegmentCommand32;
    type Section = Section32;
    type Nlist = Nlist32;

    const SEGMENT_COMMAND: u32 = LC_SEGMENT;
    const NAME: &'static str = "32-bit";
}

impl MachArch for Arch64 {
    type Header = MachHeader64;
    type SegmentCommand = SegmentCommand64;
    type Section = Section64;
    type Nlist = Nlist64;

    const SEGMENT_COMMAND: u32 = LC_SEGMENT_64;
    const NAME: &'static str = "64-bit";
}
