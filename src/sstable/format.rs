//! On-disk layout primitives: block handles, the block trailer, and the
//! file footer.

use crc32fast::Hasher;

use crate::codec::{get_fixed64, get_varint64, put_fixed64, put_varint64, CodecError};
use crate::error::{Error, Result};

/// Magic number verifying the footer belongs to this format.
pub const TABLE_MAGIC: u64 = 0xdb4775248b80fb57;

/// Trailer appended to every block on disk: a compression byte (always
/// `0` in this crate) and the CRC32 of the block bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Exactly 48 bytes at the file tail.
pub const FOOTER_SIZE: usize = 48;

/// `offset, size` of a block; `size` excludes the 5-byte trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    /// Byte offset from the start of the file.
    pub offset: u64,
    /// Size of the block, not counting its trailer.
    pub size: u64,
}

impl BlockHandle {
    /// Creates a handle.
    pub fn new(offset: u64, size: u64) -> Self {
        BlockHandle { offset, size }
    }

    /// Appends `varint64(offset) ‖ varint64(size)`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        put_varint64(buf, self.offset);
        put_varint64(buf, self.size);
    }

    /// Decodes `(handle, bytes_consumed)` from the start of `buf`.
    pub fn decode_from(buf: &[u8]) -> std::result::Result<(BlockHandle, usize), CodecError> {
        let (offset, n1) = get_varint64(buf)?;
        let (size, n2) = get_varint64(&buf[n1..])?;
        Ok((BlockHandle { offset, size }, n1 + n2))
    }
}

/// Computes the trailer for `block` bytes: `compression_type:u8=0, crc32`.
pub fn block_trailer(block: &[u8]) -> [u8; BLOCK_TRAILER_SIZE] {
    let mut hasher = Hasher::new();
    hasher.update(&[0u8]);
    hasher.update(block);
    let crc = hasher.finalize();
    let mut out = [0u8; BLOCK_TRAILER_SIZE];
    out[0] = 0;
    out[1..5].copy_from_slice(&crc.to_le_bytes());
    out
}

/// Verifies a block's trailer against its bytes.
pub fn verify_block_trailer(block: &[u8], trailer: &[u8]) -> Result<()> {
    if trailer.len() != BLOCK_TRAILER_SIZE {
        return Err(Error::corruption("short block trailer"));
    }
    let expected = block_trailer(block);
    if trailer != expected {
        return Err(Error::corruption("block checksum mismatch"));
    }
    Ok(())
}

/// `meta_index_handle, index_handle`, zero-padded to 40 bytes, then the
/// magic number: exactly 48 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Footer {
    /// Handle to the (currently unused) metaindex block.
    pub meta_index_handle: BlockHandle,
    /// Handle to the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Serializes the footer to exactly [`FOOTER_SIZE`] bytes.
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.meta_index_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(FOOTER_SIZE - 8, 0);
        put_fixed64(&mut buf, TABLE_MAGIC);
        let mut out = [0u8; FOOTER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decodes and validates a footer from the last [`FOOTER_SIZE`] bytes
    /// of a file. Fails with `Corruption` if the magic number mismatches.
    pub fn decode(buf: &[u8]) -> Result<Footer> {
        if buf.len() != FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "footer must be {FOOTER_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let magic = get_fixed64(&buf[FOOTER_SIZE - 8..])?;
        if magic != TABLE_MAGIC {
            return Err(Error::corruption(format!(
                "bad table magic number: {magic:#x}"
            )));
        }
        let (meta_index_handle, n1) = BlockHandle::decode_from(buf)?;
        let (index_handle, _n2) = BlockHandle::decode_from(&buf[n1..])?;
        Ok(Footer {
            meta_index_handle,
            index_handle,
        })
    }
}
