use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LE, ReadBytesExt};

use super::ResourceLocation;

/// Offset of the resource table field within the NE header.
const RESOURCE_TABLE_FIELD: u64 = 0x24;

/// Resource ids in the NE table carry this tag when they are numeric.
const INTEGER_ID_FLAG: u16 = 0x8000;

/// Looks up one resource in the NE resource table.
///
/// Entry offsets and sizes are stored shifted down by the table's
/// alignment shift; the returned location has them shifted back up into
/// file-relative byte values.
pub(crate) fn find_resource<R: Read + Seek>(
    input: &mut R,
    header_offset: u32,
    name: u16,
    resource_type: u16,
) -> Option<ResourceLocation> {
    walk_resource_table(input, header_offset, name, resource_type)
        .ok()
        .flatten()
}

fn walk_resource_table<R: Read + Seek>(
    input: &mut R,
    header_offset: u32,
    name: u16,
    resource_type: u16,
) -> io::Result<Option<ResourceLocation>> {
    input.seek(SeekFrom::Start(
        u64::from(header_offset) + RESOURCE_TABLE_FIELD,
    ))?;
    let table_offset = input.read_u16::<LE>()?;
    let table_end = input.read_u16::<LE>()?;
    if table_offset == table_end {
        return Ok(None);
    }

    input.seek(SeekFrom::Start(
        u64::from(header_offset) + u64::from(table_offset),
    ))?;
    let shift = input.read_u16::<LE>()?;
    if shift >= 32 {
        return Ok(None);
    }

    loop {
        let type_id = input.read_u16::<LE>()?;
        if type_id == 0 {
            return Ok(None);
        }
        let count = input.read_u16::<LE>()?;
        input.seek(SeekFrom::Current(4))?; // reserved

        if type_id != (resource_type | INTEGER_ID_FLAG) {
            input.seek(SeekFrom::Current(i64::from(count) * 12))?;
            continue;
        }

        for _ in 0..count {
            let offset = input.read_u16::<LE>()?;
            let size = input.read_u16::<LE>()?;
            input.seek(SeekFrom::Current(2))?; // flags
            let id = input.read_u16::<LE>()?;
            input.seek(SeekFrom::Current(4))?; // handle, usage

            if id == (name | INTEGER_ID_FLAG) {
                return Ok(Some(ResourceLocation {
                    file_offset: u32::from(offset) << shift,
                    size: u32::from(size) << shift,
                }));
            }
        }
        return Ok(None);
    }
}
