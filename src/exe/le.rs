use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LE, ReadBytesExt};

/// Offset of the resource table offset/size pair within the LE header.
const RESOURCE_TABLE_FIELD: u64 = 0x50;

/// Marker byte introducing a numeric type or name id in a VXD resource
/// table entry.
const INTEGER_ID_MARKER: u8 = 0xFF;

/// Resource type `RT_VERSION`.
const VERSION_TYPE: u16 = 16;

const VERSION_NODE_HEADER_SIZE: u32 = 20;
const FIXED_FILE_INFO_SIZE: u32 = 52;

/// Checks whether an LE (VXD) file carries a structurally plausible
/// version resource.
///
/// The full version number is not extracted; the single fixed table
/// entry is only validated for consistency, which is all the file
/// version lookup needs to know about this container kind.
pub(crate) fn has_version_info<R: Read + Seek>(input: &mut R, header_offset: u32) -> bool {
    probe_version_resource(input, header_offset).unwrap_or(false)
}

fn probe_version_resource<R: Read + Seek>(input: &mut R, header_offset: u32) -> io::Result<bool> {
    input.seek(SeekFrom::Start(
        u64::from(header_offset) + RESOURCE_TABLE_FIELD,
    ))?;
    let table_offset = input.read_u32::<LE>()?;
    let table_size = input.read_u32::<LE>()?;
    if table_size <= 12 {
        return Ok(false);
    }

    input.seek(SeekFrom::Start(
        u64::from(header_offset) + u64::from(table_offset),
    ))?;
    let type_marker = input.read_u8()?;
    let type_id = input.read_u16::<LE>()?;
    let name_marker = input.read_u8()?;
    if type_marker != INTEGER_ID_MARKER
        || type_id != VERSION_TYPE
        || name_marker != INTEGER_ID_MARKER
    {
        return Ok(false);
    }
    input.seek(SeekFrom::Current(4))?; // name ordinal, flags

    let resource_size = input.read_u32::<LE>()?;
    if resource_size <= VERSION_NODE_HEADER_SIZE + FIXED_FILE_INFO_SIZE {
        return Ok(false);
    }

    let node_size = input.read_u16::<LE>()?;
    let data_size = input.read_u16::<LE>()?;
    Ok(u32::from(node_size) >= VERSION_NODE_HEADER_SIZE + FIXED_FILE_INFO_SIZE
        && u32::from(data_size) >= FIXED_FILE_INFO_SIZE)
}
