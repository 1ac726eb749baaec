//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files, in both the
//! 32-bit and 64-bit layouts. Structures read from a byte-swapped file are
//! converted to host order with [`SwapBytes::swap_fields`] immediately after
//! parsing, and swapped back just before being written.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::N_STAB;

/// Returns the string content of a fixed 16-byte, NUL-padded name field.
pub fn name_from_bytes(bytes: &[u8; 16]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(16);
    std::str::from_utf8(&bytes[..end]).unwrap_or("")
}

fn set_name_bytes(field: &mut [u8; 16], name: &str) {
    *field = [0u8; 16];
    let bytes = name.as_bytes();
    let len = bytes.len().min(16);
    field[..len].copy_from_slice(&bytes[..len]);
}

/// In-place conversion between file and host byte order.
///
/// Implementations swap every multi-byte field; fixed byte-array name fields
/// are order-independent and left alone.
pub trait SwapBytes {
    /// Byte-swaps all multi-byte fields.
    fn swap_fields(&mut self);
}

// =============================================================================
// Headers
// =============================================================================

/// 32-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader32 {
    /// Magic number (MH_MAGIC)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
}

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

/// Accessors shared by both header widths.
pub trait MachHeaderExt {
    /// Number of load commands.
    fn ncmds(&self) -> u32;
    /// Total size of the load command region.
    fn sizeofcmds(&self) -> u32;
}

impl MachHeaderExt for MachHeader32 {
    fn ncmds(&self) -> u32 {
        self.ncmds
    }
    fn sizeofcmds(&self) -> u32 {
        self.sizeofcmds
    }
}

impl MachHeaderExt for MachHeader64 {
    fn ncmds(&self) -> u32 {
        self.ncmds
    }
    fn sizeofcmds(&self) -> u32 {
        self.sizeofcmds
    }
}

impl SwapBytes for MachHeader32 {
    fn swap_fields(&mut self) {
        self.magic = self.magic.swap_bytes();
        self.cputype = self.cputype.swap_bytes();
        self.cpusubtype = self.cpusubtype.swap_bytes();
        self.filetype = self.filetype.swap_bytes();
        self.ncmds = self.ncmds.swap_bytes();
        self.sizeofcmds = self.sizeofcmds.swap_bytes();
        self.flags = self.flags.swap_bytes();
    }
}

impl SwapBytes for MachHeader64 {
    fn swap_fields(&mut self) {
        self.magic = self.magic.swap_bytes();
        self.cputype = self.cputype.swap_bytes();
        self.cpusubtype = self.cpusubtype.swap_bytes();
        self.filetype = self.filetype.swap_bytes();
        self.ncmds = self.ncmds.swap_bytes();
        self.sizeofcmds = self.sizeofcmds.swap_bytes();
        self.flags = self.flags.swap_bytes();
        self.reserved = self.reserved.swap_bytes();
    }
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

impl SwapBytes for LoadCommand {
    fn swap_fields(&mut self) {
        self.cmd = self.cmd.swap_bytes();
        self.cmdsize = self.cmdsize.swap_bytes();
    }
}

// =============================================================================
// Segment Commands
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand32 {
    /// LC_SEGMENT
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Segment name (16 bytes, NUL-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u32,
    /// Virtual memory size
    pub vmsize: u32,
    /// File offset
    pub fileoff: u32,
    /// Amount of file to map
    pub filesize: u32,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Segment name (16 bytes, NUL-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file to map
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

/// Accessors shared by both segment command widths.
pub trait SegmentCommandExt {
    /// Segment name as a string.
    fn name(&self) -> &str;
    /// Sets the segment name.
    fn set_name(&mut self, name: &str);
    /// Offset of the segment data within the slice.
    fn file_off(&self) -> u64;
    /// Sets the segment data offset.
    fn set_file_off(&mut self, off: u64);
    /// Size of the segment data in the file.
    fn file_size(&self) -> u64;
    /// Sets the segment data size.
    fn set_file_size(&mut self, size: u64);
    /// Number of section entries following the command.
    fn nsects(&self) -> u32;
}

impl SegmentCommandExt for SegmentCommand32 {
    fn name(&self) -> &str {
        name_from_bytes(&self.segname)
    }
    fn set_name(&mut self, name: &str) {
        set_name_bytes(&mut self.segname, name);
    }
    fn file_off(&self) -> u64 {
        u64::from(self.fileoff)
    }
    fn set_file_off(&mut self, off: u64) {
        self.fileoff = off as u32;
    }
    fn file_size(&self) -> u64 {
        u64::from(self.filesize)
    }
    fn set_file_size(&mut self, size: u64) {
        self.filesize = size as u32;
    }
    fn nsects(&self) -> u32 {
        self.nsects
    }
}

impl SegmentCommandExt for SegmentCommand64 {
    fn name(&self) -> &str {
        name_from_bytes(&self.segname)
    }
    fn set_name(&mut self, name: &str) {
        set_name_bytes(&mut self.segname, name);
    }
    fn file_off(&self) -> u64 {
        self.fileoff
    }
    fn set_file_off(&mut self, off: u64) {
        self.fileoff = off;
    }
    fn file_size(&self) -> u64 {
        self.filesize
    }
    fn set_file_size(&mut self, size: u64) {
        self.filesize = size;
    }
    fn nsects(&self) -> u32 {
        self.nsects
    }
}

impl SwapBytes for SegmentCommand32 {
    fn swap_fields(&mut self) {
        self.cmd = self.cmd.swap_bytes();
        self.cmdsize = self.cmdsize.swap_bytes();
        self.vmaddr = self.vmaddr.swap_bytes();
        self.vmsize = self.vmsize.swap_bytes();
        self.fileoff = self.fileoff.swap_bytes();
        self.filesize = self.filesize.swap_bytes();
        self.maxprot = self.maxprot.swap_bytes();
        self.initprot = self.initprot.swap_bytes();
        self.nsects = self.nsects.swap_bytes();
        self.flags = self.flags.swap_bytes();
    }
}

impl SwapBytes for SegmentCommand64 {
    fn swap_fields(&mut self) {
        self.cmd = self.cmd.swap_bytes();
        self.cmdsize = self.cmdsize.swap_bytes();
        self.vmaddr = self.vmaddr.swap_bytes();
        self.vmsize = self.vmsize.swap_bytes();
        self.fileoff = self.fileoff.swap_bytes();
        self.filesize = self.filesize.swap_bytes();
        self.maxprot = self.maxprot.swap_bytes();
        self.initprot = self.initprot.swap_bytes();
        self.nsects = self.nsects.swap_bytes();
        self.flags = self.flags.swap_bytes();
    }
}

// =============================================================================
// Sections
// =============================================================================

/// 32-bit section entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section32 {
    /// Section name (16 bytes, NUL-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, NUL-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u32,
    /// Size in bytes
    pub size: u32,
    /// File offset (relative to the slice)
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
}

/// 64-bit section entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section64 {
    /// Section name (16 bytes, NUL-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, NUL-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset (relative to the slice)
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved1: u32,
    /// Reserved
    pub reserved2: u32,
    /// Reserved
    pub reserved3: u32,
}

/// Accessors shared by both section widths.
pub trait SectionExt {
    /// Section name as a string.
    fn name(&self) -> &str;
    /// Sets the section name.
    fn set_name(&mut self, name: &str);
    /// Owning segment name as a string.
    fn segment_name(&self) -> &str;
    /// Sets the owning segment name.
    fn set_segment_name(&mut self, name: &str);
    /// File offset of the section data, relative to the slice.
    fn file_offset(&self) -> u32;
    /// Sets the section data offset.
    fn set_file_offset(&mut self, off: u32);
    /// Size of the section data in bytes.
    fn data_size(&self) -> u64;
    /// Sets the section data size.
    fn set_data_size(&mut self, size: u64);
}

impl SectionExt for Section32 {
    fn name(&self) -> &str {
        name_from_bytes(&self.sectname)
    }
    fn set_name(&mut self, name: &str) {
        set_name_bytes(&mut self.sectname, name);
    }
    fn segment_name(&self) -> &str {
        name_from_bytes(&self.segname)
    }
    fn set_segment_name(&mut self, name: &str) {
        set_name_bytes(&mut self.segname, name);
    }
    fn file_offset(&self) -> u32 {
        self.offset
    }
    fn set_file_offset(&mut self, off: u32) {
        self.offset = off;
    }
    fn data_size(&self) -> u64 {
        u64::from(self.size)
    }
    fn set_data_size(&mut self, size: u64) {
        self.size = size as u32;
    }
}

impl SectionExt for Section64 {
    fn name(&self) -> &str {
        name_from_bytes(&self.sectname)
    }
    fn set_name(&mut self, name: &str) {
        set_name_bytes(&mut self.sectname, name);
    }
    fn segment_name(&self) -> &str {
        name_from_bytes(&self.segname)
    }
    fn set_segment_name(&mut self, name: &str) {
        set_name_bytes(&mut self.segname, name);
    }
    fn file_offset(&self) -> u32 {
        self.offset
    }
    fn set_file_offset(&mut self, off: u32) {
        self.offset = off;
    }
    fn data_size(&self) -> u64 {
        self.size
    }
    fn set_data_size(&mut self, size: u64) {
        self.size = size;
    }
}

impl SwapBytes for Section32 {
    fn swap_fields(&mut self) {
        self.addr = self.addr.swap_bytes();
        self.size = self.size.swap_bytes();
        self.offset = self.offset.swap_bytes();
        self.align = self.align.swap_bytes();
        self.reloff = self.reloff.swap_bytes();
        self.nreloc = self.nreloc.swap_bytes();
        self.flags = self.flags.swap_bytes();
        self.reserved1 = self.reserved1.swap_bytes();
        self.reserved2 = self.reserved2.swap_bytes();
    }
}

impl SwapBytes for Section64 {
    fn swap_fields(&mut self) {
        self.addr = self.addr.swap_bytes();
        self.size = self.size.swap_bytes();
        self.offset = self.offset.swap_bytes();
        self.align = self.align.swap_bytes();
        self.reloff = self.reloff.swap_bytes();
        self.nreloc = self.nreloc.swap_bytes();
        self.flags = self.flags.swap_bytes();
        self.reserved1 = self.reserved1.swap_bytes();
        self.reserved2 = self.reserved2.swap_bytes();
        self.reserved3 = self.reserved3.swap_bytes();
    }
}

// =============================================================================
// Symbol Table
// =============================================================================

/// Symbol table load command.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SymtabCommand {
    /// LC_SYMTAB
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Symbol table offset (relative to the slice)
    pub symoff: u32,
    /// Number of symbol table entries
    pub nsyms: u32,
    /// String table offset (relative to the slice)
    pub stroff: u32,
    /// String table size in bytes
    pub strsize: u32,
}

impl SwapBytes for SymtabCommand {
    fn swap_fields(&mut self) {
        self.cmd = self.cmd.swap_bytes();
        self.cmdsize = self.cmdsize.swap_bytes();
        self.symoff = self.symoff.swap_bytes();
        self.nsyms = self.nsyms.swap_bytes();
        self.stroff = self.stroff.swap_bytes();
        self.strsize = self.strsize.swap_bytes();
    }
}

/// 32-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist32 {
    /// Index into string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Description field
    pub n_desc: u16,
    /// Value
    pub n_value: u32,
}

/// 64-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist64 {
    /// Index into string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Description field
    pub n_desc: u16,
    /// Value
    pub n_value: u64,
}

/// Accessors shared by both nlist widths.
pub trait NlistExt {
    /// Index into the string table.
    fn strx(&self) -> u32;
    /// Raw type byte.
    fn type_byte(&self) -> u8;
    /// Symbol value.
    fn value(&self) -> u64;
    /// Returns true if this is a STAB debugging entry.
    fn is_stab(&self) -> bool {
        self.type_byte() & N_STAB != 0
    }
}

impl NlistExt for Nlist32 {
    fn strx(&self) -> u32 {
        self.n_strx
    }
    fn type_byte(&self) -> u8 {
        self.n_type
    }
    fn value(&self) -> u64 {
        u64::from(self.n_value)
    }
}

impl NlistExt for Nlist64 {
    fn strx(&self) -> u32 {
        self.n_strx
    }
    fn type_byte(&self) -> u8 {
        self.n_type
    }
    fn value(&self) -> u64 {
        self.n_value
    }
}

impl SwapBytes for Nlist32 {
    fn swap_fields(&mut self) {
        self.n_strx = self.n_strx.swap_bytes();
        self.n_desc = self.n_desc.swap_bytes();
        self.n_value = self.n_value.swap_bytes();
    }
}

impl SwapBytes for Nlist64 {
    fn swap_fields(&mut self) {
        self.n_strx = self.n_strx.swap_bytes();
        self.n_desc = self.n_desc.swap_bytes();
        self.n_value = self.n_value.swap_bytes();
    }
}

// =============================================================================
// Fat (universal) container
// =============================================================================

/// Fat container header. Stored big-endian on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC
    pub magic: u32,
    /// Number of fat_arch records following
    pub nfat_arch: u32,
}

/// Fat container architecture record. Stored big-endian on disk.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of this architecture's image
    pub offset: u32,
    /// Size of this architecture's image
    pub size: u32,
    /// Alignment (power of 2)
    pub align: u32,
}

impl SwapBytes for FatHeader {
    fn swap_fields(&mut self) {
        self.magic = self.magic.swap_bytes();
        self.nfat_arch = self.nfat_arch.swap_bytes();
    }
}

impl SwapBytes for FatArch {
    fn swap_fields(&mut self) {
        self.cputype = self.cputype.swap_bytes();
        self.cpusubtype = self.cpusubtype.swap_bytes();
        self.offset = self.offset.swap_bytes();
        self.size = self.size.swap_bytes();
        self.align = self.align.swap_bytes();
    }
}
