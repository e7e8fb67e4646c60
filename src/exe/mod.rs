mod le;
mod ne;
pub(crate) mod pe;
mod version_info;

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LE, ReadBytesExt};
use tracing::trace;

pub use version_info::FileVersion;

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const PE_MAGIC: u16 = 0x4550; // "PE", followed by two zero bytes
const NE_MAGIC: u16 = 0x454E;
const LE_MAGIC: u16 = 0x454C;

/// File offset of the new-format header offset field in the DOS header.
const NEW_HEADER_FIELD: u64 = 0x3C;

/// Resource name of `VS_VERSION_INFO`.
const VERSION_INFO_NAME: u32 = 1;
/// Resource type `RT_VERSION`.
const VERSION_INFO_TYPE: u32 = 16;

/// Resource type `RT_RCDATA`.
pub const RCDATA_TYPE: u32 = 10;

/// Executable container format, derived purely from magic numbers at
/// fixed file positions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerType {
    /// No DOS magic at the start of the file.
    #[default]
    Unrecognized,
    /// DOS magic present, but no usable new-format header behind it.
    DosStub,
    Ne,
    Le,
    Pe,
}

/// Where a resource's data lives in the file.
///
/// A `size` of zero at a nonzero offset is a present-but-empty resource;
/// absence is always `None` at the lookup boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLocation {
    pub file_offset: u32,
    pub size: u32,
}

struct NewHeader {
    container: ContainerType,
    offset: u32,
}

fn classify<R: Read + Seek>(input: &mut R) -> NewHeader {
    let dos_magic = input
        .seek(SeekFrom::Start(0))
        .and_then(|_| input.read_u16::<LE>());
    if !dos_magic.is_ok_and(|magic| magic == DOS_MAGIC) {
        return NewHeader {
            container: ContainerType::Unrecognized,
            offset: 0,
        };
    }

    // Anything failing past this point still leaves a DOS executable.
    read_new_header(input).unwrap_or(NewHeader {
        container: ContainerType::DosStub,
        offset: 0,
    })
}

fn read_new_header<R: Read + Seek>(input: &mut R) -> io::Result<NewHeader> {
    input.seek(SeekFrom::Start(NEW_HEADER_FIELD))?;
    let offset = u32::from(input.read_u16::<LE>()?);

    input.seek(SeekFrom::Start(u64::from(offset)))?;
    let container = match input.read_u16::<LE>()? {
        PE_MAGIC => {
            if input.read_u16::<LE>()? == 0 {
                ContainerType::Pe
            } else {
                ContainerType::DosStub
            }
        }
        NE_MAGIC => ContainerType::Ne,
        LE_MAGIC => ContainerType::Le,
        _ => ContainerType::DosStub,
    };
    Ok(NewHeader { container, offset })
}

/// Classifies the executable container format of `input`.
///
/// Truncated or malformed files classify as far as their headers allow;
/// I/O failures never escape this boundary.
pub fn detect_container_type<R: Read + Seek>(input: &mut R) -> ContainerType {
    classify(input).container
}

/// Locates a resource by numeric name and type id.
///
/// PE files are searched through the full (type, name, language)
/// directory tree, with `None` as the language taking the first entry.
/// NE files carry no language level and ignore it. Other containers
/// have no resources to find.
pub fn find_resource<R: Read + Seek>(
    input: &mut R,
    name: u32,
    resource_type: u32,
    language: Option<u32>,
) -> Option<ResourceLocation> {
    let header = classify(input);
    trace!(container = ?header.container, name, resource_type, "resource lookup");
    match header.container {
        ContainerType::Ne => {
            let name = u16::try_from(name).ok()?;
            let resource_type = u16::try_from(resource_type).ok()?;
            ne::find_resource(input, header.offset, name, resource_type)
        }
        ContainerType::Pe => pe::find_resource(input, header.offset, name, resource_type, language),
        _ => None,
    }
}

/// Extracts the `VS_FIXEDFILEINFO` file version of an NE or PE
/// executable, or `None` when the file carries no usable version
/// resource.
pub fn file_version<R: Read + Seek>(input: &mut R) -> Option<FileVersion> {
    let header = classify(input);
    match header.container {
        ContainerType::Ne => {
            let resource = ne::find_resource(
                input,
                header.offset,
                VERSION_INFO_NAME as u16,
                VERSION_INFO_TYPE as u16,
            )?;
            version_info::read_version_resource::<_, 1>(input, resource.file_offset, 4)
                .ok()
                .flatten()
        }
        ContainerType::Pe => {
            let resource = pe::find_resource(
                input,
                header.offset,
                VERSION_INFO_NAME,
                VERSION_INFO_TYPE,
                None,
            )?;
            version_info::read_version_resource::<_, 2>(input, resource.file_offset, 6)
                .ok()
                .flatten()
        }
        _ => None,
    }
}

/// Checks whether an LE (VXD) executable carries version info. The
/// version number itself is not extractable from this container kind.
pub fn has_le_version_info<R: Read + Seek>(input: &mut R) -> bool {
    let header = classify(input);
    header.container == ContainerType::Le && le::has_version_info(input, header.offset)
}
