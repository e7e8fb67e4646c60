use std::{
    cmp::Ordering,
    io::{self, Read, Seek, SeekFrom},
};

use byteorder::{LE, ReadBytesExt};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    exe::{self, RCDATA_TYPE},
    read::crc32::Crc32Reader,
    version::InnoVersion,
};

/// File offset of the legacy setup loader header.
pub const SETUP_LOADER_OFFSET: u64 = 0x30;

/// Resource id under which Inno Setup 5.1.5 and later store the offset
/// table.
pub const SETUP_LOADER_RESOURCE: u32 = 11111;

const SETUP_LOADER_MAGIC: u32 = u32::from_le_bytes(*b"Inno");

const SIGNATURE_LEN: usize = 12;

#[derive(Clone, Copy, Debug)]
struct SetupLoaderVersion {
    signature: [u8; SIGNATURE_LEN],
    version: InnoVersion,
}

impl PartialEq<InnoVersion> for SetupLoaderVersion {
    fn eq(&self, other: &InnoVersion) -> bool {
        self.version.eq(other)
    }
}

impl PartialOrd<InnoVersion> for SetupLoaderVersion {
    fn partial_cmp(&self, other: &InnoVersion) -> Option<Ordering> {
        self.version.partial_cmp(other)
    }
}

const KNOWN_SETUP_LOADER_VERSIONS: [SetupLoaderVersion; 7] = [
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', b'0', b'2', 0x87, b'e', b'V', b'x',
        ],
        version: InnoVersion(1, 2, 10),
    },
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', b'0', b'4', 0x87, b'e', b'V', b'x',
        ],
        version: InnoVersion(4, 0, 0),
    },
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', b'0', b'5', 0x87, b'e', b'V', b'x',
        ],
        version: InnoVersion(4, 0, 3),
    },
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', b'0', b'6', 0x87, b'e', b'V', b'x',
        ],
        version: InnoVersion(4, 0, 10),
    },
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', b'0', b'7', 0x87, b'e', b'V', b'x',
        ],
        version: InnoVersion(4, 1, 6),
    },
    SetupLoaderVersion {
        signature: [
            b'r', b'D', b'l', b'P', b't', b'S', 0xCD, 0xE6, 0xD7, b'{', 0x0B, b'*',
        ],
        version: InnoVersion(5, 1, 5),
    },
    SetupLoaderVersion {
        signature: [
            b'n', b'S', b'5', b'W', b'7', b'd', b'T', 0x83, 0xAA, 0x1B, 0x0F, b'j',
        ],
        version: InnoVersion(5, 1, 5),
    },
];

/// Checksum of the embedded setup executable, tagged with the algorithm
/// the writing Inno Setup release used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Checksum {
    Adler32(u32),
    Crc32(u32),
}

impl Checksum {
    pub const fn value(self) -> u32 {
        match self {
            Self::Adler32(value) | Self::Crc32(value) => value,
        }
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::Adler32(0)
    }
}

/// Non-fatal findings made while decoding an offset table. The decoded
/// offsets remain usable; callers decide whether to surface these.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Anomaly {
    #[error("unknown setup loader signature: {0:02X?}")]
    UnknownSignature([u8; SIGNATURE_LEN]),
    #[error("unexpected setup loader revision {0}")]
    UnexpectedRevision(u32),
    #[error("setup loader checksum mismatch: expected {expected:#010X} but calculated {actual:#010X}")]
    ChecksumMismatch { actual: u32, expected: u32 },
}

/// Decoded setup loader offset table.
///
/// The all-zero record with `found_magic == false` is the valid "no
/// bootstrap" outcome: the input is an external slice file whose setup
/// headers start at byte 0.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SetupLoader {
    pub found_magic: bool,
    pub loader_version: Option<InnoVersion>,
    pub revision: u32,
    pub exe_offset: u32,
    pub exe_compressed_size: u32,
    pub exe_uncompressed_size: u32,
    pub exe_checksum: Checksum,
    pub message_offset: u32,
    pub header_offset: u32,
    pub data_offset: u32,
    pub anomalies: Vec<Anomaly>,
}

impl SetupLoader {
    /// Locates and decodes the setup loader offset table.
    ///
    /// Inno Setup versions before 5.1.5 keep a pointer to the table
    /// behind a magic at a constant file offset; from 5.1.5 the table is
    /// stored as a PE resource. The strategies are tried in that order
    /// and the first hit wins. A file matching neither yields the
    /// default record.
    ///
    /// An error is only returned when the input ends while a located
    /// table is being decoded; every probing failure is soft.
    pub fn load<R: Read + Seek>(input: &mut R) -> io::Result<Self> {
        if let Some(loader) = Self::load_from_fixed_offset(input)? {
            return Ok(loader);
        }
        if let Some(loader) = Self::load_from_resource(input)? {
            return Ok(loader);
        }
        trace!("no setup loader found, treating input as external setup data");
        Ok(Self::default())
    }

    fn load_from_fixed_offset<R: Read + Seek>(input: &mut R) -> io::Result<Option<Self>> {
        let magic = input
            .seek(SeekFrom::Start(SETUP_LOADER_OFFSET))
            .and_then(|_| input.read_u32::<LE>());
        if !magic.is_ok_and(|magic| magic == SETUP_LOADER_MAGIC) {
            return Ok(None);
        }

        // The table pointer is stored together with its bitwise
        // complement as a self-check independent of the table checksum.
        let Ok(table_offset) = input.read_u32::<LE>() else {
            return Ok(None);
        };
        let Ok(not_table_offset) = input.read_u32::<LE>() else {
            return Ok(None);
        };
        if table_offset != !not_table_offset {
            warn!(table_offset, "setup loader pointer fails its complement check");
            return Ok(None);
        }

        trace!(table_offset, "setup loader table located through the legacy header");
        Self::decode_offset_table(input, table_offset).map(Some)
    }

    fn load_from_resource<R: Read + Seek>(input: &mut R) -> io::Result<Option<Self>> {
        let Some(resource) = exe::find_resource(input, SETUP_LOADER_RESOURCE, RCDATA_TYPE, None)
        else {
            return Ok(None);
        };

        trace!(
            offset = resource.file_offset,
            size = resource.size,
            "setup loader table located as a PE resource"
        );
        Self::decode_offset_table(input, resource.file_offset).map(Some)
    }

    fn decode_offset_table<R: Read + Seek>(input: &mut R, table_offset: u32) -> io::Result<Self> {
        input.seek(SeekFrom::Start(u64::from(table_offset)))?;

        let mut anomalies = Vec::new();
        let mut checksum = Crc32Reader::new(input);

        let mut signature = [0; SIGNATURE_LEN];
        checksum.read_exact(&mut signature)?;

        let loader_version = KNOWN_SETUP_LOADER_VERSIONS
            .into_iter()
            .find(|loader_version| loader_version.signature == signature)
            .unwrap_or_else(|| {
                // Unknown signatures decode with the newest known layout.
                anomalies.push(Anomaly::UnknownSignature(signature));
                SetupLoaderVersion {
                    signature,
                    version: InnoVersion::MAX,
                }
            });
        debug!(version = %loader_version.version, "decoding setup loader offset table");

        let mut revision = 0;
        if loader_version >= InnoVersion(5, 1, 5) {
            revision = checksum.read_u32::<LE>()?;
            if revision != 1 {
                anomalies.push(Anomaly::UnexpectedRevision(revision));
            }
        }

        checksum.read_u32::<LE>()?; // reserved
        let exe_offset = checksum.read_u32::<LE>()?;

        let exe_compressed_size = if loader_version >= InnoVersion(4, 1, 6) {
            0
        } else {
            checksum.read_u32::<LE>()?
        };

        let exe_uncompressed_size = checksum.read_u32::<LE>()?;

        let exe_checksum = if loader_version >= InnoVersion(4, 0, 3) {
            Checksum::Crc32(checksum.read_u32::<LE>()?)
        } else {
            Checksum::Adler32(checksum.read_u32::<LE>()?)
        };

        // Not covered by the table checksum in the layouts that have one.
        let message_offset = if loader_version >= InnoVersion(4, 0, 0) {
            0
        } else {
            checksum.get_mut().read_u32::<LE>()?
        };

        let header_offset = checksum.read_u32::<LE>()?;
        let data_offset = checksum.read_u32::<LE>()?;

        if loader_version >= InnoVersion(4, 0, 10) {
            let expected = checksum.get_mut().read_u32::<LE>()?;
            let actual = checksum.finalize();
            if actual != expected {
                anomalies.push(Anomaly::ChecksumMismatch { actual, expected });
            }
        }

        for anomaly in &anomalies {
            warn!("{anomaly}");
        }

        Ok(Self {
            found_magic: true,
            loader_version: Some(loader_version.version),
            revision,
            exe_offset,
            exe_compressed_size,
            exe_uncompressed_size,
            exe_checksum,
            message_offset,
            header_offset,
            data_offset,
            anomalies,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crc32fast::Hasher;

    use super::{Anomaly, Checksum, SETUP_LOADER_OFFSET, SetupLoader};
    use crate::{
        exe::pe::tests::{pe_stub, put_leaf},
        version::InnoVersion,
    };

    const SIGNATURE_1_2_10: [u8; 12] = [
        b'r', b'D', b'l', b'P', b't', b'S', b'0', b'2', 0x87, b'e', b'V', b'x',
    ];
    const SIGNATURE_5_1_5: [u8; 12] = [
        b'r', b'D', b'l', b'P', b't', b'S', 0xCD, 0xE6, 0xD7, b'{', 0x0B, b'*',
    ];

    /// Legacy layout: every field stored, Adler32 checksum, no trailing
    /// table checksum.
    fn legacy_table() -> Vec<u8> {
        let mut table = SIGNATURE_1_2_10.to_vec();
        for field in [
            0x0000_0000, // reserved
            0x0000_0030, // exe offset
            0x0001_2345, // exe compressed size
            0x0004_5678, // exe uncompressed size
            0xCAFE_BABE, // Adler32 of the exe
            0x0002_0000, // message offset
            0x0003_0000, // header offset
            0x0004_0000, // data offset
        ] {
            table.extend_from_slice(&u32::to_le_bytes(field));
        }
        table
    }

    /// Current layout: revision field, compressed size and message
    /// offset omitted, CRC32 checksums. The trailing table checksum
    /// covers everything but itself.
    fn current_table(signature: [u8; 12]) -> Vec<u8> {
        let mut table = signature.to_vec();
        for field in [
            1,           // revision
            0x0000_0000, // reserved
            0x0000_0030, // exe offset
            0x0004_5678, // exe uncompressed size
            0xCAFE_BABE, // CRC32 of the exe
            0x0003_0000, // header offset
            0x0004_0000, // data offset
        ] {
            table.extend_from_slice(&u32::to_le_bytes(field));
        }
        let mut hasher = Hasher::new();
        hasher.update(&table);
        table.extend_from_slice(&hasher.finalize().to_le_bytes());
        table
    }

    /// Places `table` at 0x60 in an otherwise empty file, referenced
    /// through the legacy fixed-offset header.
    fn fixed_offset_file(table: &[u8]) -> Vec<u8> {
        const TABLE_OFFSET: u32 = 0x60;

        let mut buf = vec![0; SETUP_LOADER_OFFSET as usize];
        buf.extend_from_slice(b"Inno");
        buf.extend_from_slice(&TABLE_OFFSET.to_le_bytes());
        buf.extend_from_slice(&(!TABLE_OFFSET).to_le_bytes());
        buf.resize(TABLE_OFFSET as usize, 0);
        buf.extend_from_slice(table);
        buf
    }

    #[test]
    fn legacy_layout_through_fixed_offset() {
        let buf = fixed_offset_file(&legacy_table());
        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();

        assert!(loader.found_magic);
        assert_eq!(loader.loader_version, Some(InnoVersion(1, 2, 10)));
        assert_eq!(loader.revision, 0);
        assert_eq!(loader.exe_offset, 0x30);
        assert_eq!(loader.exe_compressed_size, 0x0001_2345);
        assert_eq!(loader.exe_uncompressed_size, 0x0004_5678);
        assert_eq!(loader.exe_checksum, Checksum::Adler32(0xCAFE_BABE));
        assert_eq!(loader.message_offset, 0x0002_0000);
        assert_eq!(loader.header_offset, 0x0003_0000);
        assert_eq!(loader.data_offset, 0x0004_0000);
        assert!(loader.anomalies.is_empty());
    }

    #[test]
    fn current_layout_with_valid_checksum() {
        let buf = fixed_offset_file(&current_table(SIGNATURE_5_1_5));
        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();

        assert!(loader.found_magic);
        assert_eq!(loader.loader_version, Some(InnoVersion(5, 1, 5)));
        assert_eq!(loader.revision, 1);
        assert_eq!(loader.exe_offset, 0x30);
        assert_eq!(loader.exe_compressed_size, 0);
        assert_eq!(loader.exe_uncompressed_size, 0x0004_5678);
        assert_eq!(loader.exe_checksum, Checksum::Crc32(0xCAFE_BABE));
        assert_eq!(loader.message_offset, 0);
        assert_eq!(loader.header_offset, 0x0003_0000);
        assert_eq!(loader.data_offset, 0x0004_0000);
        assert!(loader.anomalies.is_empty());
    }

    #[test]
    fn corrupted_field_surfaces_checksum_mismatch() {
        let mut table = current_table(SIGNATURE_5_1_5);
        // Flip the header offset without touching the trailing checksum.
        let header_offset_at = table.len() - 12;
        table[header_offset_at] ^= 0xFF;

        let buf = fixed_offset_file(&table);
        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();

        assert!(loader.found_magic);
        assert_eq!(loader.header_offset, 0x0003_00FF);
        assert_eq!(loader.anomalies.len(), 1);
        assert!(matches!(
            loader.anomalies[0],
            Anomaly::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn unexpected_revision_is_flagged() {
        let mut table = current_table(SIGNATURE_5_1_5);
        table[12] = 2;
        let mut hasher = Hasher::new();
        hasher.update(&table[..table.len() - 4]);
        let checksum_at = table.len() - 4;
        table[checksum_at..].copy_from_slice(&hasher.finalize().to_le_bytes());

        let buf = fixed_offset_file(&table);
        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();

        assert_eq!(loader.revision, 2);
        assert_eq!(loader.anomalies, vec![Anomaly::UnexpectedRevision(2)]);
    }

    #[test]
    fn unknown_signature_decodes_with_newest_layout() {
        let buf = fixed_offset_file(&current_table(*b"rDlPtSxxxxxx"));
        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();

        assert!(loader.found_magic);
        assert_eq!(loader.loader_version, Some(InnoVersion::MAX));
        assert_eq!(loader.exe_compressed_size, 0);
        assert_eq!(loader.exe_checksum, Checksum::Crc32(0xCAFE_BABE));
        assert!(
            loader
                .anomalies
                .contains(&Anomaly::UnknownSignature(*b"rDlPtSxxxxxx"))
        );
    }

    #[test]
    fn resource_strategy() {
        // A PE image whose RCDATA resource 11111 holds the table.
        let table = current_table(SIGNATURE_5_1_5);
        let mut buf = pe_stub(3, 0x90);
        // Resource data at virtual address 0x1100, file offset 0x300.
        put_leaf(&mut buf, 0x1000 + 0x100, table.len() as u32);
        buf.resize(0x200 + 0x100, 0);
        buf.extend_from_slice(&table);

        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();
        assert!(loader.found_magic);
        assert_eq!(loader.loader_version, Some(InnoVersion(5, 1, 5)));
        assert_eq!(loader.header_offset, 0x0003_0000);
        assert!(loader.anomalies.is_empty());
    }

    #[test]
    fn failed_pointer_self_check_falls_through() {
        let mut buf = fixed_offset_file(&legacy_table());
        // Corrupt the complement; with no PE resource to fall back on,
        // the result is the external-slice record.
        buf[SETUP_LOADER_OFFSET as usize + 8] ^= 0xFF;

        let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loader, SetupLoader::default());
        assert!(!loader.found_magic);
    }

    #[test]
    fn arbitrary_input_yields_the_default_record() {
        for buf in [Vec::new(), b"just some text, nothing else".to_vec()] {
            let loader = SetupLoader::load(&mut Cursor::new(buf)).unwrap();
            assert_eq!(loader, SetupLoader::default());
        }
    }

    #[test]
    fn truncated_table_is_a_hard_failure() {
        let table = legacy_table();
        let buf = fixed_offset_file(&table[..16]);
        assert!(SetupLoader::load(&mut Cursor::new(buf)).is_err());
    }

    #[test]
    fn load_is_idempotent() {
        let buf = fixed_offset_file(&current_table(SIGNATURE_5_1_5));
        let mut input = Cursor::new(buf);
        let first = SetupLoader::load(&mut input).unwrap();
        let second = SetupLoader::load(&mut input).unwrap();
        assert_eq!(first, second);
    }
}
