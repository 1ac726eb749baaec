//! Mach-O constants and verbose-mode lookup tables.

// =============================================================================
// Magic Numbers
// =============================================================================

/// 32-bit Mach-O magic (host order)
pub const MH_MAGIC: u32 = 0xFEEDFACE;
/// 32-bit Mach-O magic (reversed, needs byte swap)
pub const MH_CIGAM: u32 = 0xCEFAEDFE;
/// 64-bit Mach-O magic (host order)
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;
/// 64-bit Mach-O magic (reversed, needs byte swap)
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE;
/// Fat binary magic (host order)
pub const FAT_MAGIC: u32 = 0xCAFEBABE;
/// Fat binary magic (reversed, needs byte swap)
pub const FAT_CIGAM: u32 = 0xBEBAFECA;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command requiring dynamic linker
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Segment of this file (32-bit)
pub const LC_SEGMENT: u32 = 0x1;
/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Dynamic link-edit symbol table info
pub const LC_DYSYMTAB: u32 = 0xB;
/// Load a dynamically linked shared library
pub const LC_LOAD_DYLIB: u32 = 0xC;
/// Dynamically linked shared library identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Segment of this file (64-bit)
pub const LC_SEGMENT_64: u32 = 0x19;
/// UUID of the image
pub const LC_UUID: u32 = 0x1B;
/// Code signature location
pub const LC_CODE_SIGNATURE: u32 = 0x1D;
/// Compressed dyld information
pub const LC_DYLD_INFO: u32 = 0x22;
/// Compressed dyld information only
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
/// Minimum macOS version
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
/// Minimum iOS version
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
/// Function starts table location
pub const LC_FUNCTION_STARTS: u32 = 0x26;
/// Entry point
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
/// Data-in-code table location
pub const LC_DATA_IN_CODE: u32 = 0x29;
/// Source version
pub const LC_SOURCE_VERSION: u32 = 0x2A;
/// Build version (platform + SDK)
pub const LC_BUILD_VERSION: u32 = 0x32;

/// Returns a human-readable name for a load command ID (verbose mode).
pub fn load_command_name(cmd: u32) -> &'static str {
    match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        0x3 => "LC_SYMSEG",
        0x4 => "LC_THREAD",
        0x5 => "LC_UNIXTHREAD",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        0xE => "LC_LOAD_DYLINKER",
        0xF => "LC_ID_DYLINKER",
        0x16 => "LC_TWOLEVEL_HINTS",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        0x1A => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        0x8000_001C => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        0x1E => "LC_SEGMENT_SPLIT_INFO",
        0x20 => "LC_LAZY_LOAD_DYLIB",
        0x21 => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        0x27 => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        0x2B => "LC_DYLIB_CODE_SIGN_DRS",
        0x2C => "LC_ENCRYPTION_INFO_64",
        0x2F => "LC_VERSION_MIN_TVOS",
        0x30 => "LC_VERSION_MIN_WATCHOS",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        0x8000_0018 => "LC_LOAD_WEAK_DYLIB",
        0x8000_001F => "LC_REEXPORT_DYLIB",
        0x8000_0033 => "LC_DYLD_EXPORTS_TRIE",
        0x8000_0034 => "LC_DYLD_CHAINED_FIXUPS",
        _ => "LC_???",
    }
}

// =============================================================================
// Symbol Table (nlist)
// =============================================================================

/// Mask isolating the STAB debug bits of `n_type`.
pub const N_STAB: u8 = 0xE0;

/// STAB: global symbol
pub const N_GSYM: u8 = 0x20;
/// STAB: procedure name
pub const N_FNAME: u8 = 0x22;
/// STAB: procedure
pub const N_FUN: u8 = 0x24;
/// STAB: static symbol
pub const N_STSYM: u8 = 0x26;
/// STAB: begin nsect symbol
pub const N_BNSYM: u8 = 0x2E;
/// STAB: source file name
pub const N_SO: u8 = 0x64;
/// STAB: object file name
pub const N_OSO: u8 = 0x66;
/// STAB: local symbol
pub const N_LSYM: u8 = 0x80;
/// STAB: end nsect symbol
pub const N_ENSYM: u8 = 0x4E;

/// Returns a human-readable name for a STAB type (verbose mode).
pub fn stab_type_name(n_type: u8) -> Option<&'static str> {
    let name = match n_type {
        N_GSYM => "N_GSYM",
        N_FNAME => "N_FNAME",
        N_FUN => "N_FUN",
        N_STSYM => "N_STSYM",
        0x28 => "N_LCSYM",
        N_BNSYM => "N_BNSYM",
        0x32 => "N_AST",
        0x3C => "N_OPT",
        0x40 => "N_RSYM",
        0x44 => "N_SLINE",
        N_ENSYM => "N_ENSYM",
        0x60 => "N_SSYM",
        N_SO => "N_SO",
        N_OSO => "N_OSO",
        N_LSYM => "N_LSYM",
        0x82 => "N_BINCL",
        0x84 => "N_SOL",
        0x86 => "N_PARAMS",
        0x88 => "N_VERSION",
        0x8A => "N_OLEVEL",
        0xA0 => "N_PSYM",
        0xA2 => "N_EINCL",
        0xA4 => "N_ENTRY",
        0xC0 => "N_LBRAC",
        0xC2 => "N_EXCL",
        0xE0 => "N_RBRAC",
        0xE2 => "N_BCOMM",
        0xE4 => "N_ECOMM",
        0xE8 => "N_ECOML",
        0xFE => "N_LENG",
        _ => return None,
    };
    Some(name)
}
