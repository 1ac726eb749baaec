//! Container handling for thin and fat Mach-O files.
//!
//! A [`MachOContainer`] owns the read/write file handle, discriminates the
//! outer format by magic number, parses each contained image into a
//! [`MachSlice`], and applies queued size-changing writes when asked to
//! commit.
//!
//! At most one 32-bit and one 64-bit image are retained; the behavior for
//! containers holding several images of the same bitness is undefined, which
//! matches the inputs this tool is pointed at (thin object files, or fat
//! files with one slice per bitness).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zerocopy::FromBytes;

use crate::error::{Error, Result};

use super::arch::{Arch32, Arch64};
use super::constants::{FAT_CIGAM, FAT_MAGIC, MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64};
use super::slice::{MachFile, MachSlice};
use super::structs::{FatArch, FatHeader, SwapBytes};

/// Upper bound on fat-arch records; anything larger is a corrupt count.
const MAX_FAT_ARCHS: u32 = 128;

/// Outer file format, discriminated by magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Unrecognized magic.
    Invalid,
    /// Thin 32-bit Mach-O image.
    MachO32,
    /// Thin 64-bit Mach-O image.
    MachO64,
    /// Fat container of one or more images.
    Fat,
}

/// A Mach-O file: the handle plus the parsed images it contains.
#[derive(Debug)]
pub struct MachOContainer {
    path: PathBuf,
    file: File,
    format: FileFormat,
    slice32: Option<MachSlice<Arch32>>,
    slice64: Option<MachSlice<Arch64>>,
}

impl MachOContainer {
    /// Opens `path` read/write and parses every contained image.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let file_size = file
            .metadata()
            .map_err(|e| Error::ReadFailed(e.to_string()))?
            .len();

        let (format, swap_bytes) = peek_magic(&mut file, 0)?;
        debug!("{}: {:?} (swap: {})", path.display(), format, swap_bytes);

        let mut container = Self {
            path: path.to_path_buf(),
            file,
            format,
            slice32: None,
            slice64: None,
        };

        match format {
            FileFormat::MachO32 => container.read_slice32(0, file_size, swap_bytes)?,
            FileFormat::MachO64 => container.read_slice64(0, file_size, swap_bytes)?,
            FileFormat::Fat => container.read_fat(swap_bytes, file_size)?,
            FileFormat::Invalid => return Err(Error::invalid("unrecognized magic number")),
        }

        Ok(container)
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Outer format of the file.
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Returns the contained images, 32-bit first.
    pub fn slices(&mut self) -> Vec<&mut dyn MachFile> {
        let mut slices: Vec<&mut dyn MachFile> = Vec::new();
        if let Some(slice) = self.slice32.as_mut() {
            slices.push(slice);
        }
        if let Some(slice) = self.slice64.as_mut() {
            slices.push(slice);
        }
        slices
    }

    fn clone_handle(&self) -> Result<File> {
        self.file.try_clone().map_err(|source| Error::OpenFailed {
            path: self.path.clone(),
            source,
        })
    }

    fn read_slice32(&mut self, offset: u64, size: u64, swap_bytes: bool) -> Result<()> {
        let file = self.clone_handle()?;
        self.slice32 = Some(MachSlice::<Arch32>::read(file, offset, size, swap_bytes)?);
        Ok(())
    }

    fn read_slice64(&mut self, offset: u64, size: u64, swap_bytes: bool) -> Result<()> {
        let file = self.clone_handle()?;
        self.slice64 = Some(MachSlice::<Arch64>::read(file, offset, size, swap_bytes)?);
        Ok(())
    }

    fn read_fat(&mut self, swap_bytes: bool, file_size: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::ReadFailed(e.to_string()))?;
        let mut header_bytes = [0u8; size_of::<FatHeader>()];
        self.file
            .read_exact(&mut header_bytes)
            .map_err(|_| Error::ReadFailed("failed to read fat header".into()))?;
        let mut header = FatHeader::read_from_bytes(&header_bytes)
            .map_err(|_| Error::invalid("unreadable fat header"))?;
        if swap_bytes {
            header.swap_fields();
        }

        if header.nfat_arch > MAX_FAT_ARCHS {
            return Err(Error::invalid(format!(
                "implausible fat arch count {}",
                header.nfat_arch
            )));
        }

        let mut archs = Vec::new();
        archs
            .try_reserve_exact(header.nfat_arch as usize)
            .map_err(|_| Error::OutOfMemory {
                needed: header.nfat_arch as usize * size_of::<FatArch>(),
            })?;
        for _ in 0..header.nfat_arch {
            let mut arch_bytes = [0u8; size_of::<FatArch>()];
            self.file
                .read_exact(&mut arch_bytes)
                .map_err(|_| Error::ReadFailed("failed to read fat arch record".into()))?;
            let mut arch = FatArch::read_from_bytes(&arch_bytes)
                .map_err(|_| Error::invalid("unreadable fat arch record"))?;
            if swap_bytes {
                arch.swap_fields();
            }
            archs.push(arch);
        }

        for arch in archs {
            let offset = u64::from(arch.offset);
            let size = u64::from(arch.size);
            if offset + size > file_size {
                return Err(Error::invalid(format!(
                    "fat arch region {offset}+{size} exceeds file size {file_size}"
                )));
            }

            let (format, swap) = peek_magic(&mut self.file, offset)?;
            match format {
                FileFormat::MachO32 => self.read_slice32(offset, size, swap)?,
                FileFormat::MachO64 => self.read_slice64(offset, size, swap)?,
                _ => {
                    return Err(Error::invalid(format!(
                        "unexpected nested format {format:?} in fat arch at offset {offset}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Applies all queued size-changing writes.
    ///
    /// A slice with deferred writes is re-serialized in full and written back
    /// at its content offset. Rewriting both slices of a fat container would
    /// require renumbering the fat arch table and is not implemented.
    pub fn commit_deferred_writes(&mut self) -> Result<()> {
        let dirty32 = self
            .slice32
            .as_ref()
            .is_some_and(|s| s.has_deferred_writes());
        let dirty64 = self
            .slice64
            .as_ref()
            .is_some_and(|s| s.has_deferred_writes());

        if !dirty32 && !dirty64 {
            return Ok(());
        }
        if dirty32 && dirty64 {
            return Err(Error::NotImplemented(
                "rewriting both slices of a fat container".into(),
            ));
        }

        if dirty32 {
            let slice = self.slice32.as_mut().unwrap();
            Self::flush_slice(&self.path, &mut self.file, slice, self.format)?;
        }
        if dirty64 {
            let slice = self.slice64.as_mut().unwrap();
            Self::flush_slice(&self.path, &mut self.file, slice, self.format)?;
        }
        Ok(())
    }

    fn flush_slice(
        path: &Path,
        file: &mut File,
        slice: &mut dyn MachFile,
        format: FileFormat,
    ) -> Result<()> {
        let content_offset = slice.content_offset();
        let original_size = slice.content_size();

        let mut serialized = Vec::new();
        slice.serialize(&mut serialized)?;

        if format == FileFormat::Fat && serialized.len() as u64 != original_size {
            // The arch table still records the old size; growing the
            // container and rewriting that table is an open question.
            warn!(
                "{}: fat arch size entry is stale after resizing the {} slice \
                 ({original_size} -> {} bytes)",
                path.display(),
                slice.arch_name(),
                serialized.len()
            );
        }

        debug!(
            "writing {} serialized bytes at offset {content_offset}",
            serialized.len()
        );
        file.seek(SeekFrom::Start(content_offset))
            .map_err(|e| Error::WriteFailed(e.to_string()))?;
        file.write_all(&serialized)
            .map_err(|e| Error::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

/// Reads the magic number at `offset` and classifies the content there.
fn peek_magic(file: &mut File, offset: u64) -> Result<(FileFormat, bool)> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::ReadFailed(e.to_string()))?;
    let mut magic_bytes = [0u8; 4];
    file.read_exact(&mut magic_bytes)
        .map_err(|_| Error::ReadFailed("failed to read magic number".into()))?;
    let magic = u32::from_ne_bytes(magic_bytes);

    let classified = match magic {
        MH_MAGIC => (FileFormat::MachO32, false),
        MH_CIGAM => (FileFormat::MachO32, true),
        MH_MAGIC_64 => (FileFormat::MachO64, false),
        MH_CIGAM_64 => (FileFormat::MachO64, true),
        FAT_MAGIC => (FileFormat::Fat, false),
        FAT_CIGAM => (FileFormat::Fat, true),
        _ => (FileFormat::Invalid, false),
    };
    Ok(classified)
}
