// Map index (WDT) - says which tiles of the 64x64 grid exist

use worldmesh_shared::util::ByteReader;

use crate::chunk::{expect_at, ChunkIter};
use crate::error::{DecodeError, Result};

pub const MAP_TILES: usize = 64;

const WDT_VERSION: u32 = 18;
const FLAG_HAS_ADT: u32 = 0x1;

const MVER: [u8; 4] = *b"MVER";
const MPHD: [u8; 4] = *b"MPHD";
const MAIN: [u8; 4] = *b"MAIN";

#[derive(Debug)]
pub struct Wdt {
    pub version: u32,
    pub flags: u32,
    tiles: Vec<u32>,
}

impl Wdt {
    pub fn decode(data: &[u8]) -> Result<Wdt> {
        let mver = expect_at(data, 0, MVER)?;
        let version = ByteReader::new(mver.data).read_u32()?;
        if version != WDT_VERSION {
            return Err(DecodeError::malformed(format!(
                "unsupported WDT version {version}"
            )));
        }

        let mut flags = 0;
        let mut tiles = Vec::new();
        for chunk in ChunkIter::new(&data[mver.next..]) {
            let chunk = chunk?;
            match chunk.tag {
                MPHD => flags = ByteReader::new(chunk.data).read_u32()?,
                MAIN => tiles = read_main(chunk.data)?,
                _ => {}
            }
        }
        if tiles.is_empty() {
            return Err(DecodeError::malformed("WDT has no MAIN chunk"));
        }

        Ok(Wdt { version, flags, tiles })
    }

    /// Whether the tile at grid position (x, y) exists.
    pub fn has_adt(&self, x: usize, y: usize) -> bool {
        if x >= MAP_TILES || y >= MAP_TILES {
            return false;
        }
        self.tiles[y * MAP_TILES + x] & FLAG_HAS_ADT != 0
    }

    /// Grid positions of every tile present.
    pub fn existing_tiles(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..MAP_TILES).flat_map(move |x| {
            (0..MAP_TILES).filter_map(move |y| self.has_adt(x, y).then_some((x, y)))
        })
    }
}

fn read_main(data: &[u8]) -> Result<Vec<u32>> {
    let expected = MAP_TILES * MAP_TILES * 8;
    if data.len() < expected {
        return Err(DecodeError::malformed(format!(
            "MAIN chunk holds {} bytes, expected {expected}",
            data.len()
        )));
    }
    let mut r = ByteReader::new(data);
    let mut tiles = Vec::with_capacity(MAP_TILES * MAP_TILES);
    for _ in 0..MAP_TILES * MAP_TILES {
        tiles.push(r.read_u32()?);
        // the second field is an in-memory pointer slot, junk on disk
        r.skip(4)?;
    }
    Ok(tiles)
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::MAP_TILES;
    use crate::chunk::testutil::push_chunk;

    /// Map index listing the given (x, y) tiles as present.
    pub fn wdt_bytes(tiles: &[(usize, usize)]) -> Vec<u8> {
        let mut main = vec![0u8; MAP_TILES * MAP_TILES * 8];
        for &(x, y) in tiles {
            let at = (y * MAP_TILES + x) * 8;
            main[at..at + 4].copy_from_slice(&1u32.to_le_bytes());
        }
        let mut out = Vec::new();
        push_chunk(&mut out, b"MVER", &18u32.to_le_bytes());
        push_chunk(&mut out, b"MPHD", &[0u8; 32]);
        push_chunk(&mut out, b"MAIN", &main);
        out
    }
}
