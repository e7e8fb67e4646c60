pub(crate) mod crc32;
