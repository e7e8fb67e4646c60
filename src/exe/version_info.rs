use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LE, ReadBytesExt};
use derive_more::Display;

/// Signature of a `VS_FIXEDFILEINFO` block.
const FIXED_FILE_INFO_MAGIC: u32 = 0xFEEF_04BD;

/// Packed four-part version number extracted from a `VS_FIXEDFILEINFO`
/// block.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord)]
#[display("{}.{}.{}.{}", self.major(), self.minor(), self.build(), self.revision())]
pub struct FileVersion {
    ms: u32,
    ls: u32,
}

impl FileVersion {
    pub const fn major(self) -> u16 {
        (self.ms >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        self.ms as u16
    }

    pub const fn build(self) -> u16 {
        (self.ls >> 16) as u16
    }

    pub const fn revision(self) -> u16 {
        self.ls as u16
    }

    /// The version as stored in the resource: most significant half in
    /// the upper 32 bits.
    pub const fn as_u64(self) -> u64 {
        (self.ms as u64) << 32 | self.ls as u64
    }
}

/// Reads the `VS_FIXEDFILEINFO` version out of a `VS_VERSIONINFO`
/// resource at `resource_offset`.
///
/// The fixed file info sits behind a variable-length, null-padded key
/// string of `KEY_WIDTH`-byte units (8-bit characters in NE resources,
/// UTF-16 in PE resources), so the block is reached by scanning for the
/// terminator and rounding up to DWORD alignment.
pub(crate) fn read_version_resource<R: Read + Seek, const KEY_WIDTH: usize>(
    input: &mut R,
    resource_offset: u32,
    leading_skip: u32,
) -> io::Result<Option<FileVersion>> {
    let mut offset = leading_skip;
    input.seek(SeekFrom::Start(
        u64::from(resource_offset) + u64::from(offset),
    ))?;

    loop {
        let mut key = [0; KEY_WIDTH];
        input.read_exact(&mut key)?;
        offset += KEY_WIDTH as u32;
        if key == [0; KEY_WIDTH] {
            break;
        }
    }

    let offset = (offset + 3) & !3;
    input.seek(SeekFrom::Start(
        u64::from(resource_offset) + u64::from(offset),
    ))?;

    if input.read_u32::<LE>()? != FIXED_FILE_INFO_MAGIC {
        return Ok(None);
    }
    input.seek(SeekFrom::Current(4))?; // structure version

    let ms = input.read_u32::<LE>()?;
    let ls = input.read_u32::<LE>()?;
    Ok(Some(FileVersion { ms, ls }))
}
