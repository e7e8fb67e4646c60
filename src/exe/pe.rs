use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LE, ReadBytesExt};

use super::ResourceLocation;

const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;

/// High bit of a resource directory entry value, set when the entry
/// points at a subdirectory rather than a leaf data entry.
const SUBDIRECTORY_FLAG: u32 = 0x8000_0000;

struct CoffHeader {
    section_count: u16,
    section_table_offset: u32,
    resource_table_address: u32,
}

impl CoffHeader {
    /// Reads the COFF header and enough of the optional header to find
    /// the resource directory's virtual address and the section table.
    fn read<R: Read + Seek>(input: &mut R, header_offset: u32) -> io::Result<Option<Self>> {
        // The COFF header follows the 4-byte "PE\0\0" signature.
        let coff_offset = header_offset + 4;

        input.seek(SeekFrom::Start(u64::from(coff_offset) + 2))?; // machine
        let section_count = input.read_u16::<LE>()?;
        input.seek(SeekFrom::Current(12))?; // timestamp, symbol table offset and count
        let optional_size = input.read_u16::<LE>()?;

        let optional_offset = coff_offset + 20;
        let section_table_offset = optional_offset + u32::from(optional_size);

        input.seek(SeekFrom::Start(u64::from(optional_offset)))?;
        let directories_skip = match input.read_u16::<LE>()? {
            PE32_MAGIC => 90,
            PE32_PLUS_MAGIC => 106,
            _ => return Ok(None),
        };
        input.seek(SeekFrom::Current(directories_skip))?;

        // The resource table is the third data directory entry.
        let directory_count = input.read_u32::<LE>()?;
        if directory_count < 3 {
            return Ok(None);
        }
        input.seek(SeekFrom::Current(16))?; // export and import tables
        let resource_table_address = input.read_u32::<LE>()?;
        let resource_table_size = input.read_u32::<LE>()?;
        if resource_table_address == 0 || resource_table_size == 0 {
            return Ok(None);
        }

        Ok(Some(Self {
            section_count,
            section_table_offset,
            resource_table_address,
        }))
    }
}

struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_address: u32,
}

struct SectionTable(Vec<Section>);

impl SectionTable {
    fn read<R: Read + Seek>(input: &mut R, coff: &CoffHeader) -> io::Result<Self> {
        input.seek(SeekFrom::Start(u64::from(coff.section_table_offset)))?;
        let mut sections = Vec::with_capacity(usize::from(coff.section_count));
        for _ in 0..coff.section_count {
            input.seek(SeekFrom::Current(8))?; // name
            let virtual_size = input.read_u32::<LE>()?;
            let virtual_address = input.read_u32::<LE>()?;
            input.seek(SeekFrom::Current(4))?; // raw size
            let raw_address = input.read_u32::<LE>()?;
            // Relocation and line number pointers and counts, characteristics
            input.seek(SeekFrom::Current(16))?;
            sections.push(Section {
                virtual_address,
                virtual_size,
                raw_address,
            });
        }
        Ok(Self(sections))
    }

    /// Translates a virtual address into a file offset through the first
    /// section whose virtual range contains it.
    fn to_file_offset(&self, address: u32) -> Option<u32> {
        self.0
            .iter()
            .find(|section| {
                address >= section.virtual_address
                    && address - section.virtual_address < section.virtual_size
            })
            // A forged raw address can push the sum past u32::MAX.
            .and_then(|section| {
                (address - section.virtual_address).checked_add(section.raw_address)
            })
    }
}

/// A resource directory entry value, decoded at the point of read. Both
/// variants hold file offsets, already rebased onto the directory root.
enum TableEntry {
    Directory(u32),
    Leaf(u32),
}

impl TableEntry {
    fn decode(value: u32, root_offset: u32) -> Option<Self> {
        if value & SUBDIRECTORY_FLAG == 0 {
            root_offset.checked_add(value).map(Self::Leaf)
        } else {
            root_offset
                .checked_add(value & !SUBDIRECTORY_FLAG)
                .map(Self::Directory)
        }
    }
}

/// Scans one resource directory for an id-keyed entry and returns its
/// raw 32-bit value. `None` as the id takes whatever entry comes first,
/// which is how default-language lookups behave.
fn find_entry<R: Read + Seek>(
    input: &mut R,
    directory_offset: u32,
    id: Option<u32>,
) -> io::Result<Option<u32>> {
    input.seek(SeekFrom::Start(u64::from(directory_offset) + 12))?;
    let named_count = input.read_u16::<LE>()?;
    let id_count = input.read_u16::<LE>()?;

    let Some(id) = id else {
        input.seek(SeekFrom::Current(4))?;
        return input.read_u32::<LE>().map(Some);
    };

    // String-named entries sort first and are never matched here.
    input.seek(SeekFrom::Current(i64::from(named_count) * 8))?;
    for _ in 0..id_count {
        let entry_id = input.read_u32::<LE>()?;
        let value = input.read_u32::<LE>()?;
        if entry_id == id {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Walks the three-level (type, name, language) resource directory tree
/// of a PE file.
pub(crate) fn find_resource<R: Read + Seek>(
    input: &mut R,
    header_offset: u32,
    name: u32,
    resource_type: u32,
    language: Option<u32>,
) -> Option<ResourceLocation> {
    walk_resource_tree(input, header_offset, name, resource_type, language)
        .ok()
        .flatten()
}

fn walk_resource_tree<R: Read + Seek>(
    input: &mut R,
    header_offset: u32,
    name: u32,
    resource_type: u32,
    language: Option<u32>,
) -> io::Result<Option<ResourceLocation>> {
    let Some(coff) = CoffHeader::read(input, header_offset)? else {
        return Ok(None);
    };
    let sections = SectionTable::read(input, &coff)?;
    let Some(root_offset) = sections.to_file_offset(coff.resource_table_address) else {
        return Ok(None);
    };

    let Some(value) = find_entry(input, root_offset, Some(resource_type))? else {
        return Ok(None);
    };
    let Some(TableEntry::Directory(name_directory)) = TableEntry::decode(value, root_offset)
    else {
        return Ok(None);
    };

    let Some(value) = find_entry(input, name_directory, Some(name))? else {
        return Ok(None);
    };
    let Some(TableEntry::Directory(language_directory)) = TableEntry::decode(value, root_offset)
    else {
        return Ok(None);
    };

    let Some(value) = find_entry(input, language_directory, language)? else {
        return Ok(None);
    };
    // Nesting below the language level is not a layout this walk accepts.
    let Some(TableEntry::Leaf(leaf_offset)) = TableEntry::decode(value, root_offset) else {
        return Ok(None);
    };

    input.seek(SeekFrom::Start(u64::from(leaf_offset)))?;
    let data_address = input.read_u32::<LE>()?;
    let size = input.read_u32::<LE>()?;
    let Some(file_offset) = sections.to_file_offset(data_address) else {
        return Ok(None);
    };
    Ok(Some(ResourceLocation { file_offset, size }))
}
