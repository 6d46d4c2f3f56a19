// Terrain tile (ADT) decoding - heightfield assembly, water carving and
// doodad placement

use once_cell::sync::Lazy;
use tracing::{debug, warn};
use worldmesh_shared::util::ByteReader;

use crate::chunk::expect_at;
use crate::error::{DecodeError, Result};
use crate::math::{placement_rotation, Vec3};
use crate::mesh::{Mesh, DRY_LAND_COLOR, REMOVED};
use crate::session::Session;
use crate::source::ArchiveSource;

/// Sub-chunks per tile side.
pub const CHUNKS_PER_TILE: usize = 16;
const CHUNK_COUNT: usize = CHUNKS_PER_TILE * CHUNKS_PER_TILE;

/// Height samples per sub-chunk: a 9x9 outer grid interleaved with an
/// 8x8 grid of cell centers.
pub const SAMPLES_PER_CHUNK: usize = 145;

/// Ground cells per sub-chunk side. Each cell is a fan of 4 triangles
/// around its center sample, 12 indices.
const CELLS_PER_CHUNK: usize = 8;
const CELL_COUNT: usize = CELLS_PER_CHUNK * CELLS_PER_CHUNK;
const INDICES_PER_CELL: usize = 12;
const INDICES_PER_CHUNK: usize = CELL_COUNT * INDICES_PER_CELL;

pub const TILE_SIZE: f32 = 533.33333;
const UNIT_SIZE: f32 = TILE_SIZE / 128.0;
/// World offset of the map corner; tile (32, 32) sits at the origin.
const ZERO_POINT: f32 = 32.0 * TILE_SIZE;

/// Ocean surface height in world coordinates.
const SEA_LEVEL: f32 = 0.0;

const ADT_VERSION: u32 = 18;
/// The MHDR chunk always follows the 12-byte MVER chunk.
const MHDR_OFFSET: usize = 0xC;
/// Section offsets in the header count from the MHDR payload.
const MHDR_BASE: usize = MHDR_OFFSET + 8;

const MCNK_HEADER_SIZE: usize = 128;
const MCIN_RECORD_SIZE: usize = 16;
const MDDF_RECORD_SIZE: usize = 36;
const MODF_RECORD_SIZE: usize = 64;
const WATER_INSTANCE_SIZE: usize = 24;
const NORMAL_BYTES: usize = SAMPLES_PER_CHUNK * 3;

const MVER: [u8; 4] = *b"MVER";
const MHDR: [u8; 4] = *b"MHDR";
const MCIN: [u8; 4] = *b"MCIN";
const MMDX: [u8; 4] = *b"MMDX";
const MMID: [u8; 4] = *b"MMID";
const MWMO: [u8; 4] = *b"MWMO";
const MWID: [u8; 4] = *b"MWID";
const MDDF: [u8; 4] = *b"MDDF";
const MODF: [u8; 4] = *b"MODF";
const MH2O: [u8; 4] = *b"MH2O";
const MCNK: [u8; 4] = *b"MCNK";
const MCVT: [u8; 4] = *b"MCVT";
const MCNR: [u8; 4] = *b"MCNR";
const MCRF: [u8; 4] = *b"MCRF";

/// Which geometry placed models contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshDetail {
    /// Collision proxy, a handful of triangles per model.
    Bounding,
    /// Full render geometry where a skin is available.
    Detailed,
}

#[derive(Debug, Clone)]
pub struct TileOptions {
    /// Carve water-covered and below-sea cells out of the terrain.
    pub carve_water: bool,
    pub detail: MeshDetail,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            carve_water: true,
            detail: MeshDetail::Bounding,
        }
    }
}

/// Placement record for one doodad. `scale` is decoded from the file but
/// placement applies the models at unit scale, like the original data
/// pipeline this feeds.
#[derive(Debug, Clone)]
pub struct DoodadDef {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: Vec3,
    /// Degrees per axis.
    pub rotation: Vec3,
    pub scale: f32,
    pub flags: u16,
}

/// Placement record for one map object (WMO). Decoded for completeness;
/// object geometry is not resolved here.
#[derive(Debug, Clone)]
pub struct WmoDef {
    pub name_id: u32,
    pub unique_id: u32,
    pub position: Vec3,
    pub rotation: Vec3,
    pub lower: Vec3,
    pub upper: Vec3,
    pub flags: u16,
    pub doodad_set: u16,
    pub name_set: u16,
}

/// One decoded terrain tile.
pub struct Adt {
    pub doodad_names: Vec<String>,
    pub wmo_names: Vec<String>,
    pub doodad_defs: Vec<DoodadDef>,
    pub wmo_defs: Vec<WmoDef>,
    water: Option<Water>,
    chunks: Vec<Mcnk>,
    /// Tile terrain with water-covered ground carved away.
    pub terrain: Mesh,
    /// One mesh per placed doodad, in placement order.
    pub doodads: Vec<Mesh>,
}

impl Adt {
    /// Decode a tile and derive its terrain and doodad meshes. Malformed
    /// container data fails the whole tile; a missing model file only
    /// skips its placement.
    pub fn decode(
        data: &[u8],
        source: &mut dyn ArchiveSource,
        session: &Session,
        options: &TileOptions,
    ) -> Result<Adt> {
        let mver = expect_at(data, 0, MVER)?;
        let version = ByteReader::new(mver.data).read_u32()?;
        if version != ADT_VERSION {
            return Err(DecodeError::malformed(format!(
                "unsupported ADT version {version}"
            )));
        }

        let mhdr = expect_at(data, MHDR_OFFSET, MHDR)?;
        let header = TileHeader::read(mhdr.data)?;

        let mcin_at = section_at(header.mcin)
            .ok_or_else(|| DecodeError::malformed("tile has no MCIN section"))?;
        let chunk_offsets = read_chunk_offsets(expect_at(data, mcin_at, MCIN)?.data)?;

        let doodad_names = match (section_at(header.mmdx), section_at(header.mmid)) {
            (Some(blob_at), Some(offs_at)) => read_name_table(
                expect_at(data, blob_at, MMDX)?.data,
                expect_at(data, offs_at, MMID)?.data,
            )?,
            _ => Vec::new(),
        };
        let wmo_names = match (section_at(header.mwmo), section_at(header.mwid)) {
            (Some(blob_at), Some(offs_at)) => read_name_table(
                expect_at(data, blob_at, MWMO)?.data,
                expect_at(data, offs_at, MWID)?.data,
            )?,
            _ => Vec::new(),
        };

        let doodad_defs = match section_at(header.mddf) {
            Some(at) => read_doodad_defs(expect_at(data, at, MDDF)?.data)?,
            None => Vec::new(),
        };
        let wmo_defs = match section_at(header.modf) {
            Some(at) => read_wmo_defs(expect_at(data, at, MODF)?.data)?,
            None => Vec::new(),
        };

        let water = match section_at(header.mh2o) {
            Some(at) => Some(Water::decode(expect_at(data, at, MH2O)?.data)?),
            None => None,
        };

        let mut chunks = Vec::with_capacity(CHUNK_COUNT);
        for off in chunk_offsets {
            chunks.push(Mcnk::decode(data, off as usize)?);
        }

        let mut adt = Adt {
            doodad_names,
            wmo_names,
            doodad_defs,
            wmo_defs,
            water,
            chunks,
            terrain: Mesh::new(),
            doodads: Vec::new(),
        };
        adt.build_terrain(options.carve_water);
        adt.place_doodads(source, session, options.detail)?;
        Ok(adt)
    }

    pub fn chunks(&self) -> &[Mcnk] {
        &self.chunks
    }

    pub fn has_water(&self) -> bool {
        self.water.is_some()
    }

    /// Stitch the 256 sub-chunk heightfields into one mesh, then carve.
    /// Water sits above the ground it covers, so a covered cell can
    /// simply be dropped; the below-sea pass catches the ocean floor,
    /// which has no water layers of its own.
    fn build_terrain(&mut self, carve: bool) {
        let terrain = &mut self.terrain;
        terrain.vtx.reserve(CHUNK_COUNT * SAMPLES_PER_CHUNK);
        terrain.norm.reserve(CHUNK_COUNT * SAMPLES_PER_CHUNK);
        terrain.idx.reserve(CHUNK_COUNT * INDICES_PER_CHUNK);

        for mcnk in &self.chunks {
            let base = terrain.vtx.len() as u32;
            terrain.insert_indices(CHUNK_INDICES.as_slice(), base);
            terrain.vtx.extend(mcnk.vertices());
            terrain.norm.extend(mcnk.normals());
        }

        let water = match (&self.water, carve) {
            (Some(water), true) => water,
            // nothing to carve, the raw grid is the result
            _ => {
                self.terrain.fill_colors(DRY_LAND_COLOR);
                return;
            }
        };

        for chunk_idx in 0..CHUNK_COUNT {
            for mask in water.layer_masks(chunk_idx) {
                for cell in 0..CELL_COUNT {
                    if mask & (1u64 << cell) == 0 {
                        continue;
                    }
                    let slot = (chunk_idx * CELL_COUNT + cell) * INDICES_PER_CELL;
                    for s in &mut self.terrain.idx[slot..slot + INDICES_PER_CELL] {
                        *s = REMOVED;
                    }
                }
            }
        }

        self.terrain.mark_below(SEA_LEVEL);
        self.terrain.compact();
        self.terrain.fill_colors(DRY_LAND_COLOR);
    }

    /// Walk every sub-chunk's doodad references and place each unique id
    /// once. The id is claimed before the model is resolved, so a
    /// reference whose model is missing still blocks later duplicates.
    fn place_doodads(
        &mut self,
        source: &mut dyn ArchiveSource,
        session: &Session,
        detail: MeshDetail,
    ) -> Result<()> {
        for mcnk in &self.chunks {
            for &doodad_ref in &mcnk.doodad_refs {
                let def = self.doodad_defs.get(doodad_ref as usize).ok_or_else(|| {
                    DecodeError::malformed(format!(
                        "doodad reference {doodad_ref} outside the placement table"
                    ))
                })?;
                if session.check_uid(def.unique_id) {
                    continue;
                }

                let name = self.doodad_names.get(def.name_id as usize).ok_or_else(|| {
                    DecodeError::malformed(format!(
                        "doodad name id {} outside the name table",
                        def.name_id
                    ))
                })?;

                let model = match session.model(source, name, detail == MeshDetail::Detailed) {
                    Ok(model) => model,
                    Err(DecodeError::NotFound(name)) => {
                        debug!("missing model file {}, placement skipped", name);
                        continue;
                    }
                    Err(err) => {
                        warn!("Could not decode model {}: {}", name, err);
                        continue;
                    }
                };

                let mesh = match detail {
                    MeshDetail::Detailed => match model.detailed_mesh() {
                        Some(mesh) => mesh,
                        None => {
                            debug!("model {} has no skin, using its bounding volume", name);
                            model.bounding_mesh()
                        }
                    },
                    MeshDetail::Bounding => model.bounding_mesh(),
                };

                let rot = placement_rotation(def.rotation);
                self.doodads.push(mesh.transformed(rot, def.position));
            }
        }
        Ok(())
    }
}

/// Cell triangulation shared by every sub-chunk: per cell a fan of four
/// triangles around the center sample, cells in mask bit order.
static CHUNK_INDICES: Lazy<Vec<u32>> = Lazy::new(|| {
    let mut idx = Vec::with_capacity(INDICES_PER_CHUNK);
    for r in 0..CELLS_PER_CHUNK as u32 {
        for c in 0..CELLS_PER_CHUNK as u32 {
            let tl = r * 17 + c;
            let tr = tl + 1;
            let center = r * 17 + 9 + c;
            let bl = (r + 1) * 17 + c;
            let br = bl + 1;
            idx.extend_from_slice(&[
                center, tl, tr,
                center, tr, br,
                center, br, bl,
                center, bl, tl,
            ]);
        }
    }
    idx
});

struct TileHeader {
    mcin: u32,
    mmdx: u32,
    mmid: u32,
    mwmo: u32,
    mwid: u32,
    mddf: u32,
    modf: u32,
    mh2o: u32,
}

impl TileHeader {
    fn read(data: &[u8]) -> Result<TileHeader> {
        let mut r = ByteReader::new(data);
        let _flags = r.read_u32()?;
        let mcin = r.read_u32()?;
        let _mtex = r.read_u32()?;
        let mmdx = r.read_u32()?;
        let mmid = r.read_u32()?;
        let mwmo = r.read_u32()?;
        let mwid = r.read_u32()?;
        let mddf = r.read_u32()?;
        let modf = r.read_u32()?;
        let _mfbo = r.read_u32()?;
        let mh2o = r.read_u32()?;
        Ok(TileHeader {
            mcin,
            mmdx,
            mmid,
            mwmo,
            mwid,
            mddf,
            modf,
            mh2o,
        })
    }
}

/// Zero means the section is absent.
fn section_at(off: u32) -> Option<usize> {
    (off != 0).then(|| MHDR_BASE + off as usize)
}

fn read_chunk_offsets(data: &[u8]) -> Result<Vec<u32>> {
    if data.len() < CHUNK_COUNT * MCIN_RECORD_SIZE {
        return Err(DecodeError::malformed(format!(
            "MCIN chunk holds {} bytes, expected {}",
            data.len(),
            CHUNK_COUNT * MCIN_RECORD_SIZE
        )));
    }
    let mut r = ByteReader::new(data);
    let mut offsets = Vec::with_capacity(CHUNK_COUNT);
    for _ in 0..CHUNK_COUNT {
        offsets.push(r.read_u32()?);
        // size, flags and an in-memory pointer slot
        r.skip(12)?;
    }
    Ok(offsets)
}

/// Resolve an offset table against a blob of NUL-terminated names.
fn read_name_table(blob: &[u8], offsets: &[u8]) -> Result<Vec<String>> {
    let count = offsets.len() / 4;
    let mut r = ByteReader::new(offsets);
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let off = r.read_u32()? as usize;
        names.push(read_cstring(blob, off)?);
    }
    Ok(names)
}

fn read_cstring(blob: &[u8], offset: usize) -> Result<String> {
    let tail = blob.get(offset..).ok_or_else(|| {
        DecodeError::malformed(format!("name offset {offset:#x} outside the name blob"))
    })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).to_string())
}

fn read_doodad_defs(data: &[u8]) -> Result<Vec<DoodadDef>> {
    let count = data.len() / MDDF_RECORD_SIZE;
    let mut r = ByteReader::new(data);
    let mut defs = Vec::with_capacity(count);
    for _ in 0..count {
        let name_id = r.read_u32()?;
        let unique_id = r.read_u32()?;
        let position = Vec3::read(&mut r)?;
        let rotation = Vec3::read(&mut r)?;
        // fixed point, 1024 is unit scale
        let scale = r.read_u16()? as f32 / 1024.0;
        let flags = r.read_u16()?;
        defs.push(DoodadDef {
            name_id,
            unique_id,
            position,
            rotation,
            scale,
            flags,
        });
    }
    Ok(defs)
}

fn read_wmo_defs(data: &[u8]) -> Result<Vec<WmoDef>> {
    let count = data.len() / MODF_RECORD_SIZE;
    let mut r = ByteReader::new(data);
    let mut defs = Vec::with_capacity(count);
    for _ in 0..count {
        let name_id = r.read_u32()?;
        let unique_id = r.read_u32()?;
        let position = Vec3::read(&mut r)?;
        let rotation = Vec3::read(&mut r)?;
        let lower = Vec3::read(&mut r)?;
        let upper = Vec3::read(&mut r)?;
        let flags = r.read_u16()?;
        let doodad_set = r.read_u16()?;
        let name_set = r.read_u16()?;
        let _pad = r.read_u16()?;
        defs.push(WmoDef {
            name_id,
            unique_id,
            position,
            rotation,
            lower,
            upper,
            flags,
            doodad_set,
            name_set,
        });
    }
    Ok(defs)
}

/// Per-chunk water coverage, one 64-bit cell mask per layer.
pub struct Water {
    chunks: Vec<WaterChunk>,
}

struct WaterChunk {
    masks: Vec<u64>,
}

impl Water {
    /// The payload opens with 256 chunk headers; each points at its
    /// layer instances, and each instance carries a cell rectangle plus
    /// an optional exists-bitmap. Everything is folded down to one mask
    /// per layer here.
    fn decode(data: &[u8]) -> Result<Water> {
        let mut chunks = Vec::with_capacity(CHUNK_COUNT);
        let mut r = ByteReader::new(data);
        for _ in 0..CHUNK_COUNT {
            let ofs_instances = r.read_u32()? as usize;
            let layer_count = r.read_u32()? as usize;
            let _ofs_attributes = r.read_u32()?;

            if layer_count > data.len() / WATER_INSTANCE_SIZE {
                return Err(DecodeError::malformed(format!(
                    "MH2O chunk claims {layer_count} layers, holds {} bytes",
                    data.len()
                )));
            }

            let mut masks = Vec::with_capacity(layer_count);
            for layer in 0..layer_count {
                let at = ofs_instances + layer * WATER_INSTANCE_SIZE;
                masks.push(read_instance_mask(data, at)?);
            }
            chunks.push(WaterChunk { masks });
        }
        Ok(Water { chunks })
    }

    fn layer_masks(&self, chunk: usize) -> &[u64] {
        self.chunks.get(chunk).map_or(&[][..], |c| &c.masks[..])
    }
}

/// Fold one layer instance down to a cell mask. The instance covers an
/// offset rectangle of up to 8x8 cells; a zero bitmap offset means the
/// whole rectangle is wet.
fn read_instance_mask(data: &[u8], at: usize) -> Result<u64> {
    let mut r = ByteReader::new(data);
    r.seek(at)?;
    // liquid id and vertex format
    r.skip(4)?;
    let _min = r.read_f32()?;
    let _max = r.read_f32()?;
    let x_off = r.read_u8()? as usize;
    let y_off = r.read_u8()? as usize;
    let w = r.read_u8()? as usize;
    let h = r.read_u8()? as usize;
    let ofs_exists = r.read_u32()? as usize;
    let _ofs_vertex = r.read_u32()?;

    let exists = if ofs_exists == 0 {
        None
    } else {
        let mut bits = vec![0u8; (w * h).div_ceil(8)];
        r.seek(ofs_exists)?;
        r.read_exact(&mut bits)?;
        Some(bits)
    };

    let mut mask = 0u64;
    for j in 0..h {
        for i in 0..w {
            let covered = match &exists {
                None => true,
                Some(bits) => {
                    let bit = j * w + i;
                    bits[bit / 8] & (1 << (bit % 8)) != 0
                }
            };
            if !covered {
                continue;
            }
            let cy = j + y_off;
            let cx = i + x_off;
            if cy >= CELLS_PER_CHUNK || cx >= CELLS_PER_CHUNK {
                continue;
            }
            mask |= 1u64 << (cy * CELLS_PER_CHUNK + cx);
        }
    }
    Ok(mask)
}

/// One decoded sub-chunk.
pub struct Mcnk {
    pub flags: u32,
    pub area_id: u32,
    pub holes: u32,
    /// Map position of the chunk corner: x grows north, y west, z up.
    pub position: Vec3,
    heights: Vec<f32>,
    normal_bytes: Vec<u8>,
    pub doodad_refs: Vec<u32>,
}

impl Mcnk {
    /// `offset` addresses the chunk tag inside the tile buffer; the
    /// header's sub-section offsets count from that same spot.
    fn decode(data: &[u8], offset: usize) -> Result<Mcnk> {
        let chunk = expect_at(data, offset, MCNK)?;
        if chunk.data.len() < MCNK_HEADER_SIZE {
            return Err(DecodeError::malformed(format!(
                "MCNK header at {offset:#x} holds {} bytes, expected {MCNK_HEADER_SIZE}",
                chunk.data.len()
            )));
        }

        let mut r = ByteReader::new(chunk.data);
        let flags = r.read_u32()?;
        // grid coordinates and layer count
        r.skip(12)?;
        let n_doodad_refs = r.read_u32()? as usize;
        let ofs_height = r.read_u32()? as usize;
        let ofs_normal = r.read_u32()? as usize;
        // texture layers
        r.skip(4)?;
        let ofs_refs = r.read_u32()? as usize;
        // alpha and shadow blocks
        r.skip(16)?;
        let area_id = r.read_u32()?;
        let _n_map_obj_refs = r.read_u32()?;
        let holes = r.read_u32()?;
        r.seek(0x68)?;
        let position = Vec3::read(&mut r)?;

        let heights = read_heights(expect_at(data, offset + ofs_height, MCVT)?.data)?;

        let mcnr = expect_at(data, offset + ofs_normal, MCNR)?;
        let normal_bytes = mcnr
            .data
            .get(..NORMAL_BYTES)
            .ok_or_else(|| {
                DecodeError::malformed(format!(
                    "MCNR chunk holds {} bytes, expected {NORMAL_BYTES}",
                    mcnr.data.len()
                ))
            })?
            .to_vec();

        let mcrf = expect_at(data, offset + ofs_refs, MCRF)?;
        if mcrf.data.len() < n_doodad_refs * 4 {
            return Err(DecodeError::malformed(format!(
                "MCRF chunk holds {} bytes, {n_doodad_refs} doodad references promised",
                mcrf.data.len()
            )));
        }
        let mut refs = ByteReader::new(mcrf.data);
        let mut doodad_refs = Vec::with_capacity(n_doodad_refs);
        for _ in 0..n_doodad_refs {
            doodad_refs.push(refs.read_u32()?);
        }

        Ok(Mcnk {
            flags,
            area_id,
            holes,
            position,
            heights,
            normal_bytes,
            doodad_refs,
        })
    }

    /// World positions of the 145 samples. Sample rows alternate between
    /// 9 edge samples and 8 cell centers pushed half a unit inward on
    /// both axes.
    pub fn vertices(&self) -> Vec<Vec3> {
        let mut out = Vec::with_capacity(SAMPLES_PER_CHUNK);
        for (i, &height) in self.heights.iter().enumerate() {
            let pair = i / 17;
            let rem = i % 17;
            let (col, inner) = if rem < 9 { (rem, false) } else { (rem - 9, true) };
            let mut south = pair as f32 * UNIT_SIZE;
            let mut east = col as f32 * UNIT_SIZE;
            if inner {
                south += 0.5 * UNIT_SIZE;
                east += 0.5 * UNIT_SIZE;
            }
            out.push(Vec3::new(
                ZERO_POINT - self.position.y + east,
                self.position.z + height,
                ZERO_POINT - self.position.x + south,
            ));
        }
        out
    }

    /// Unit normals for the 145 samples, swizzled into the output frame.
    pub fn normals(&self) -> Vec<Vec3> {
        let mut out = Vec::with_capacity(SAMPLES_PER_CHUNK);
        for n in self.normal_bytes.chunks_exact(3) {
            let n0 = n[0] as i8 as f32;
            let n1 = n[1] as i8 as f32;
            let n2 = n[2] as i8 as f32;
            out.push(Vec3::new(-n1 / 127.0, n2 / 127.0, -n0 / 127.0));
        }
        out
    }
}

fn read_heights(data: &[u8]) -> Result<Vec<f32>> {
    if data.len() < SAMPLES_PER_CHUNK * 4 {
        return Err(DecodeError::malformed(format!(
            "MCVT chunk holds {} bytes, expected {}",
            data.len(),
            SAMPLES_PER_CHUNK * 4
        )));
    }
    let mut r = ByteReader::new(data);
    let mut heights = Vec::with_capacity(SAMPLES_PER_CHUNK);
    for _ in 0..SAMPLES_PER_CHUNK {
        heights.push(r.read_f32()?);
    }
    Ok(heights)
}
