//! DWARF attribute form constants.
//!
//! Only the forms that can appear in DWARF v2-v4 debugging entries are
//! listed; the `__debug_info` walker needs every form's size rule to step
//! over attributes it does not rewrite.

/// Address of `address_size` bytes
pub const DW_FORM_ADDR: u64 = 0x01;
/// Block with u16 length prefix
pub const DW_FORM_BLOCK2: u64 = 0x03;
/// Block with u32 length prefix
pub const DW_FORM_BLOCK4: u64 = 0x04;
/// 2-byte constant
pub const DW_FORM_DATA2: u64 = 0x05;
/// 4-byte constant
pub const DW_FORM_DATA4: u64 = 0x06;
/// 8-byte constant
pub const DW_FORM_DATA8: u64 = 0x07;
/// Inline NUL-terminated string
pub const DW_FORM_STRING: u64 = 0x08;
/// Block with ULEB128 length prefix
pub const DW_FORM_BLOCK: u64 = 0x09;
/// Block with u8 length prefix
pub const DW_FORM_BLOCK1: u64 = 0x0A;
/// 1-byte constant
pub const DW_FORM_DATA1: u64 = 0x0B;
/// 1-byte flag
pub const DW_FORM_FLAG: u64 = 0x0C;
/// Signed LEB128 constant
pub const DW_FORM_SDATA: u64 = 0x0D;
/// Offset into `__debug_str`
pub const DW_FORM_STRP: u64 = 0x0E;
/// Unsigned LEB128 constant
pub const DW_FORM_UDATA: u64 = 0x0F;
/// Reference to a debugging entry in any compilation unit
pub const DW_FORM_REF_ADDR: u64 = 0x10;
/// 1-byte reference within the compilation unit
pub const DW_FORM_REF1: u64 = 0x11;
/// 2-byte reference within the compilation unit
pub const DW_FORM_REF2: u64 = 0x12;
/// 4-byte reference within the compilation unit
pub const DW_FORM_REF4: u64 = 0x13;
/// 8-byte reference within the compilation unit
pub const DW_FORM_REF8: u64 = 0x14;
/// ULEB128 reference within the compilation unit
pub const DW_FORM_REF_UDATA: u64 = 0x15;
/// The actual form follows as a ULEB128
pub const DW_FORM_INDIRECT: u64 = 0x16;

/// Escape value in a 32-bit unit length announcing a 64-bit length.
pub const DWARF64_LENGTH_ESCAPE: u32 = 0xFFFF_FFFF;
