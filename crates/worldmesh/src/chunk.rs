// Chunked-container primitives
// Tiles, map indexes and their sub-sections share one outer layout: a
// 4-byte tag stored reversed on disk, a little-endian u32 payload size,
// then the payload.

use worldmesh_shared::util::ByteReader;

use crate::error::{DecodeError, Result};

/// Undo the on-disk byte order of a chunk tag
pub fn flip_fourcc(mut fcc: [u8; 4]) -> [u8; 4] {
    fcc.swap(0, 3);
    fcc.swap(1, 2);
    fcc
}

pub fn tag_name(tag: [u8; 4]) -> String {
    String::from_utf8_lossy(&tag).to_string()
}

/// A decoded chunk. `data` borrows the payload; `next` is the buffer
/// offset just past it.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub data: &'a [u8],
    pub next: usize,
}

/// Read the chunk starting at `offset`.
pub fn chunk_at(buf: &[u8], offset: usize) -> Result<Chunk<'_>> {
    let mut r = ByteReader::new(buf);
    r.seek(offset).map_err(|_| header_oob(offset))?;
    let mut fcc = [0u8; 4];
    r.read_exact(&mut fcc).map_err(|_| header_oob(offset))?;
    let tag = flip_fourcc(fcc);
    let size = r.read_u32().map_err(|_| header_oob(offset))? as usize;
    let data = r.read_bytes(size).map_err(|_| {
        DecodeError::malformed(format!(
            "chunk {} at {:#x} runs past the buffer end",
            tag_name(tag),
            offset
        ))
    })?;
    Ok(Chunk {
        tag,
        data,
        next: offset + 8 + size,
    })
}

/// Read the chunk at `offset` and require its tag.
pub fn expect_at<'a>(buf: &'a [u8], offset: usize, tag: [u8; 4]) -> Result<Chunk<'a>> {
    let chunk = chunk_at(buf, offset)?;
    if chunk.tag != tag {
        return Err(DecodeError::UnexpectedChunk {
            expected: tag_name(tag),
            found: tag_name(chunk.tag),
            offset,
        });
    }
    Ok(chunk)
}

fn header_oob(offset: usize) -> DecodeError {
    DecodeError::malformed(format!("no room for a chunk header at {offset:#x}"))
}

/// Walks a buffer as a sequence of chunks. Stops after the first error.
pub struct ChunkIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ChunkIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ChunkIter { buf, pos: 0 }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let item = chunk_at(self.buf, self.pos);
        match &item {
            Ok(chunk) => self.pos = chunk.next,
            Err(_) => self.pos = self.buf.len(),
        }
        Some(item)
    }
}
