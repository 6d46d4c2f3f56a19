// Model (M2) and skin decoding - just enough geometry for placement

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use worldmesh_shared::util::ByteReader;

use crate::error::{DecodeError, Result};
use crate::math::{fix_coord_system, Vec3};
use crate::mesh::{Mesh, WHITE};

const M2_MAGIC: &[u8; 4] = b"MD20";
const SKIN_MAGIC: &[u8; 4] = b"SKIN";

// Count/offset pairs between the version and the floats block. The render
// geometry fields sit at fixed slots in that run.
const HEADER_FIELDS: usize = 43;
const HEADER_FIELD_VERTICES: usize = 15;
const HEADER_FIELD_VERTICES_OFS: usize = 16;
const HEADER_FIELD_VIEWS: usize = 17;
const HEADER_FLOATS: usize = 14;

/// Render vertices carry bone weights and texture coordinates we skip over.
const VERTEX_STRIDE: usize = 48;

#[derive(Debug, Clone, Copy)]
pub struct ModelVertex {
    pub pos: Vec3,
    pub norm: Vec3,
}

/// One decoded model file. The collision proxy (bounding volume) always
/// loads; the render geometry becomes usable once a skin is attached.
#[derive(Debug)]
pub struct Model {
    vertices: Vec<ModelVertex>,
    bound_vtx: Vec<Vec3>,
    bound_norm: Vec<Vec3>,
    bound_idx: Vec<u32>,
    views: u32,
    skin: Option<Skin>,
}

impl Model {
    pub fn decode(data: &[u8]) -> Result<Model> {
        let mut r = ByteReader::new(data);
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != M2_MAGIC {
            return Err(DecodeError::malformed("not a model file (bad magic)"));
        }
        let _version = r.read_u32()?;

        let mut fields = [0u32; HEADER_FIELDS];
        for field in &mut fields {
            *field = r.read_u32()?;
        }
        r.skip(HEADER_FLOATS * 4)?;

        let n_bound_idx = r.read_u32()? as usize;
        let ofs_bound_idx = r.read_u32()? as usize;
        let n_bound_vtx = r.read_u32()? as usize;
        let ofs_bound_vtx = r.read_u32()? as usize;
        let n_bound_norm = r.read_u32()? as usize;
        let ofs_bound_norm = r.read_u32()? as usize;

        let n_vertices = fields[HEADER_FIELD_VERTICES] as usize;
        let ofs_vertices = fields[HEADER_FIELD_VERTICES_OFS] as usize;
        let views = fields[HEADER_FIELD_VIEWS];

        let vertices = read_vertex_block(
            slice_at(data, ofs_vertices, n_vertices * VERTEX_STRIDE, "vertex")?,
            n_vertices,
        )?;

        let bound_vtx = read_points(
            slice_at(data, ofs_bound_vtx, n_bound_vtx * 12, "bounding vertex")?,
            n_bound_vtx,
        )?;
        // Some files ship without bounding normals, or with a count that does
        // not line up. Substitute straight-up normals in that case.
        let bound_norm = if n_bound_norm == n_bound_vtx && n_bound_norm > 0 {
            read_points(
                slice_at(data, ofs_bound_norm, n_bound_norm * 12, "bounding normal")?,
                n_bound_norm,
            )?
        } else {
            vec![Vec3::new(0.0, 1.0, 0.0); n_bound_vtx]
        };

        let bound_idx = read_u16s(
            slice_at(data, ofs_bound_idx, n_bound_idx * 2, "bounding index")?,
            n_bound_idx,
        )?
        .into_iter()
        .map(u32::from)
        .collect();

        Ok(Model {
            vertices,
            bound_vtx,
            bound_norm,
            bound_idx,
            views,
            skin: None,
        })
    }

    pub fn views(&self) -> u32 {
        self.views
    }

    pub fn has_skin(&self) -> bool {
        self.skin.is_some()
    }

    /// Accept `skin` only if every index it carries resolves: lookup entries
    /// must hit a render vertex and triangle entries must hit the lookup
    /// table. Returns whether the skin was attached.
    pub fn attach_skin(&mut self, skin: Skin) -> bool {
        let n_vertices = self.vertices.len();
        if !skin.lookup.iter().all(|&l| (l as usize) < n_vertices) {
            return false;
        }
        if !skin.triangles.iter().all(|&t| (t as usize) < skin.lookup.len()) {
            return false;
        }
        self.skin = Some(skin);
        true
    }

    /// Collision proxy as a renderable mesh.
    pub fn bounding_mesh(&self) -> Mesh {
        let mut mesh = Mesh {
            vtx: self.bound_vtx.clone(),
            norm: self.bound_norm.clone(),
            idx: self.bound_idx.clone(),
            col: Vec::new(),
        };
        mesh.fill_colors(WHITE);
        mesh
    }

    /// Full render geometry, available once a skin is attached. The skin's
    /// triangles index its lookup table which in turn indexes the vertices;
    /// both levels were validated when the skin was attached.
    pub fn detailed_mesh(&self) -> Option<Mesh> {
        let skin = self.skin.as_ref()?;
        let mut mesh = Mesh::new();
        mesh.vtx.reserve(self.vertices.len());
        mesh.norm.reserve(self.vertices.len());
        for v in &self.vertices {
            mesh.vtx.push(v.pos);
            mesh.norm.push(v.norm);
        }
        mesh.idx = skin
            .triangles
            .iter()
            .map(|&t| u32::from(skin.lookup[t as usize]))
            .collect();
        mesh.fill_colors(WHITE);
        Some(mesh)
    }
}

/// Companion file holding the triangle list for a model's render geometry.
#[derive(Debug)]
pub struct Skin {
    lookup: Vec<u16>,
    triangles: Vec<u16>,
}

impl Skin {
    pub fn decode(data: &[u8]) -> Result<Skin> {
        let mut r = ByteReader::new(data);
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != SKIN_MAGIC {
            return Err(DecodeError::malformed("not a skin file (bad magic)"));
        }
        let n_lookup = r.read_u32()? as usize;
        let ofs_lookup = r.read_u32()? as usize;
        let n_triangles = r.read_u32()? as usize;
        let ofs_triangles = r.read_u32()? as usize;

        if n_triangles % 3 != 0 {
            return Err(DecodeError::malformed(format!(
                "skin triangle index count {n_triangles} is not a multiple of 3"
            )));
        }

        let lookup = read_u16s(
            slice_at(data, ofs_lookup, n_lookup * 2, "skin lookup")?,
            n_lookup,
        )?;
        let triangles = read_u16s(
            slice_at(data, ofs_triangles, n_triangles * 2, "skin triangle")?,
            n_triangles,
        )?;

        Ok(Skin { lookup, triangles })
    }
}

fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "{what} block at {offset:#x} ({len} bytes) runs past the file end"
            ))
        })
}

fn read_points(block: &[u8], count: usize) -> Result<Vec<Vec3>> {
    let mut cursor = Cursor::new(block);
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let x = cursor.read_f32::<LittleEndian>()?;
        let y = cursor.read_f32::<LittleEndian>()?;
        let z = cursor.read_f32::<LittleEndian>()?;
        points.push(fix_coord_system(Vec3::new(x, y, z)));
    }
    Ok(points)
}

fn read_u16s(block: &[u8], count: usize) -> Result<Vec<u16>> {
    let mut cursor = Cursor::new(block);
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_u16::<LittleEndian>()?);
    }
    Ok(values)
}

fn read_vertex_block(block: &[u8], count: usize) -> Result<Vec<ModelVertex>> {
    let mut cursor = Cursor::new(block);
    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        let x = cursor.read_f32::<LittleEndian>()?;
        let y = cursor.read_f32::<LittleEndian>()?;
        let z = cursor.read_f32::<LittleEndian>()?;
        // bone weights and indices
        cursor.set_position(cursor.position() + 8);
        let nx = cursor.read_f32::<LittleEndian>()?;
        let ny = cursor.read_f32::<LittleEndian>()?;
        let nz = cursor.read_f32::<LittleEndian>()?;
        // two texture coordinate pairs
        cursor.set_position(cursor.position() + 16);
        vertices.push(ModelVertex {
            pos: fix_coord_system(Vec3::new(x, y, z)),
            norm: fix_coord_system(Vec3::new(nx, ny, nz)),
        });
    }
    Ok(vertices)
}

#[cfg(test)]
pub(crate) mod testdata {
    use super::{HEADER_FIELDS, HEADER_FLOATS, VERTEX_STRIDE};

    const HEADER_SIZE: usize = 8 + HEADER_FIELDS * 4 + HEADER_FLOATS * 4 + 6 * 4;
    const BOUND_BLOCK: usize = 8 + HEADER_FIELDS * 4 + HEADER_FLOATS * 4;

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Model file with the given render vertices (position, normal pairs in
    /// file coordinates), view count and bounding geometry. Bounding
    /// normals are emitted as file-space (0, 0, 1) for every vertex.
    pub fn m2_bytes(
        vertices: &[([f32; 3], [f32; 3])],
        views: u32,
        bound_vtx: &[[f32; 3]],
        bound_idx: &[u16],
    ) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(b"MD20");
        put_u32(&mut out, 4, 264);

        let ofs_vertices = out.len();
        for (pos, norm) in vertices {
            let at = out.len();
            push_f32s(&mut out, pos);
            out.extend_from_slice(&[0u8; 8]);
            push_f32s(&mut out, norm);
            out.extend_from_slice(&[0u8; 16]);
            assert_eq!(out.len() - at, VERTEX_STRIDE);
        }

        let ofs_bound_vtx = out.len();
        for pos in bound_vtx {
            push_f32s(&mut out, pos);
        }
        let ofs_bound_norm = out.len();
        for _ in bound_vtx {
            push_f32s(&mut out, &[0.0, 0.0, 1.0]);
        }
        let ofs_bound_idx = out.len();
        for &i in bound_idx {
            out.extend_from_slice(&i.to_le_bytes());
        }

        put_u32(&mut out, 8 + super::HEADER_FIELD_VERTICES * 4, vertices.len() as u32);
        put_u32(&mut out, 8 + super::HEADER_FIELD_VERTICES_OFS * 4, ofs_vertices as u32);
        put_u32(&mut out, 8 + super::HEADER_FIELD_VIEWS * 4, views);
        put_u32(&mut out, BOUND_BLOCK, bound_idx.len() as u32);
        put_u32(&mut out, BOUND_BLOCK + 4, ofs_bound_idx as u32);
        put_u32(&mut out, BOUND_BLOCK + 8, bound_vtx.len() as u32);
        put_u32(&mut out, BOUND_BLOCK + 12, ofs_bound_vtx as u32);
        put_u32(&mut out, BOUND_BLOCK + 16, bound_vtx.len() as u32);
        put_u32(&mut out, BOUND_BLOCK + 20, ofs_bound_norm as u32);
        out
    }

    pub fn skin_bytes(lookup: &[u16], triangles: &[u16]) -> Vec<u8> {
        let mut out = vec![0u8; 20];
        out[0..4].copy_from_slice(b"SKIN");
        let ofs_lookup = out.len();
        for &l in lookup {
            out.extend_from_slice(&l.to_le_bytes());
        }
        let ofs_triangles = out.len();
        for &t in triangles {
            out.extend_from_slice(&t.to_le_bytes());
        }
        put_u32(&mut out, 4, lookup.len() as u32);
        put_u32(&mut out, 8, ofs_lookup as u32);
        put_u32(&mut out, 12, triangles.len() as u32);
        put_u32(&mut out, 16, ofs_triangles as u32);
        out
    }
}
