// Mesh container shared by the terrain and model decoders

use crate::math::{matrix_apply, Mat3, Vec3};

/// Marker written over indices whose triangles were carved away. It must
/// never survive into a finished mesh.
pub const REMOVED: u32 = u32::MAX;

/// Vertex color painted on terrain that stays above water (packed ABGR).
pub const DRY_LAND_COLOR: u32 = 0xff127e14;

/// Vertex color for placed models (packed ABGR).
pub const WHITE: u32 = 0xffffffff;

/// Indexed triangle geometry with one packed ABGR color per vertex.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vtx: Vec<Vec3>,
    pub norm: Vec<Vec3>,
    pub idx: Vec<u32>,
    pub col: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.idx.len() / 3
    }

    /// Append `local` indices rebased on top of the vertices already here.
    pub fn insert_indices(&mut self, local: &[u32], base: u32) {
        self.idx.reserve(local.len());
        for &i in local {
            self.idx.push(i + base);
        }
    }

    /// One color per vertex, replacing whatever was there.
    pub fn fill_colors(&mut self, color: u32) {
        self.col.clear();
        self.col.resize(self.vtx.len(), color);
    }

    /// Overwrite with `REMOVED` every triangle that has a vertex below
    /// `level` on the y axis. Slots that are already removed stay as they
    /// are and are never dereferenced.
    pub fn mark_below(&mut self, level: f32) {
        let vtx = &self.vtx;
        for tri in self.idx.chunks_exact_mut(3) {
            if tri
                .iter()
                .any(|&i| i != REMOVED && vtx[i as usize].y < level)
            {
                tri.fill(REMOVED);
            }
        }
    }

    /// Drop every index slot holding `REMOVED`, then drop the vertices no
    /// surviving triangle references. Survivors are renumbered in
    /// first-use order. The size of the result comes from counting the
    /// markers, so marking the same triangle twice cannot skew it. Colors
    /// are untouched; terrain is repainted after compaction.
    pub fn compact(&mut self) {
        let dry_size = self.idx.iter().filter(|&&i| i != REMOVED).count();

        let mut idx_map = vec![REMOVED; self.vtx.len()];
        let mut dry_idx = Vec::with_capacity(dry_size);
        let mut dry_vtx = Vec::new();
        let mut dry_norm = Vec::new();

        for &old in &self.idx {
            if old == REMOVED {
                continue;
            }
            let slot = &mut idx_map[old as usize];
            if *slot == REMOVED {
                *slot = dry_vtx.len() as u32;
                dry_vtx.push(self.vtx[old as usize]);
                dry_norm.push(self.norm[old as usize]);
            }
            dry_idx.push(*slot);
        }

        self.vtx = dry_vtx;
        self.norm = dry_norm;
        self.idx = dry_idx;
    }

    /// Copy of the mesh with `rot` applied to vertices and normals and
    /// `translate` added to the vertices afterwards.
    pub fn transformed(&self, rot: Mat3, translate: Vec3) -> Mesh {
        let mut vtx = Vec::with_capacity(self.vtx.len());
        for v in &self.vtx {
            let r = matrix_apply(rot, *v);
            vtx.push(Vec3::new(
                r.x + translate.x,
                r.y + translate.y,
                r.z + translate.z,
            ));
        }
        let norm = self.norm.iter().map(|n| matrix_apply(rot, *n)).collect();
        Mesh {
            vtx,
            norm,
            idx: self.idx.clone(),
            col: self.col.clone(),
        }
    }
}
