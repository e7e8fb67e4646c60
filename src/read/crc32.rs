use std::{io, io::Read};

use crc32fast::Hasher;

/// Reader adaptor that folds everything read through it into a running
/// CRC32, used to verify setup loader offset tables.
pub struct Crc32Reader<R: Read> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> Crc32Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// Borrows the wrapped reader directly. Bytes read through it skip
    /// the hasher, for fields the table checksum does not cover.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the reader, yielding the CRC32 of every byte read
    /// through the hashing path.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let bytes_read = self.inner.read(buf)?;
        self.hasher.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}
