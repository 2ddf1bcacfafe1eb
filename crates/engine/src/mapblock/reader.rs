//! Bounds-checked big-endian cursor over a block blob.

use flate2::{Decompress, FlushDecompress, Status};

use super::DecodeError;

/// Growth step for inflate output. Node grids inflate to exactly 16 KiB.
const INFLATE_CHUNK: usize = 16 * 1024;

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes consumed so far.
    #[cfg(test)]
    pub(crate) fn position(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.data.len() - self.offset;
        if len > available {
            return Err(DecodeError::TruncatedInput {
                offset: self.offset,
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    /// `u16` length followed by that many bytes.
    pub(crate) fn read_blob(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u16()? as usize;
        self.read_bytes(len)
    }

    /// `u16` length followed by that many bytes of text. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub(crate) fn read_string(&mut self) -> Result<String, DecodeError> {
        Ok(String::from_utf8_lossy(self.read_blob()?).into_owned())
    }

    /// Inflate one zlib stream starting at the cursor.
    ///
    /// The stream carries no length prefix: the cursor advances by exactly
    /// the number of compressed bytes the inflater consumed up to the end of
    /// the zlib frame, leaving any following stream untouched.
    pub(crate) fn read_zlib(&mut self) -> Result<Vec<u8>, DecodeError> {
        let input = self.remaining();
        let mut inflater = Decompress::new(true);
        let mut out = Vec::with_capacity(INFLATE_CHUNK);

        loop {
            if out.len() == out.capacity() {
                out.reserve(INFLATE_CHUNK);
            }
            let consumed = inflater.total_in() as usize;
            let produced = inflater.total_out();
            let status = inflater
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
                .map_err(|e| DecodeError::CorruptCompressedStream(e.to_string()))?;

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    let stalled =
                        inflater.total_in() as usize == consumed && inflater.total_out() == produced;
                    if !stalled {
                        continue;
                    }
                    if consumed == input.len() {
                        return Err(DecodeError::TruncatedInput {
                            offset: self.offset + consumed,
                            needed: 1,
                            available: 0,
                        });
                    }
                    if out.len() < out.capacity() {
                        return Err(DecodeError::CorruptCompressedStream(
                            "inflater made no progress".into(),
                        ));
                    }
                }
            }
        }

        self.offset += inflater.total_in() as usize;
        Ok(out)
    }
}
