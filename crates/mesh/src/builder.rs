use glam::{Vec2, Vec3};
use terrastream_common::LodLevel;
use terrastream_elevation::ElevationGrid;

use crate::{MeshError, TileMesh};

/// Sample stride for a LOD: `2^lod`.
pub fn skip_factor(lod: LodLevel) -> usize {
    1usize.checked_shl(u32::from(lod)).unwrap_or(usize::MAX)
}

/// Vertices per edge after decimating `resolution` to `lod`.
pub fn decimated_resolution(resolution: usize, lod: LodLevel) -> usize {
    resolution.saturating_sub(1) / skip_factor(lod) + 1
}

/// Turns elevation grids into tile meshes.
#[derive(Debug, Clone, Copy)]
pub struct TileMeshBuilder {
    height_scale: f32,
}

impl TileMeshBuilder {
    pub fn new(height_scale: f32) -> Self {
        Self { height_scale }
    }

    pub fn height_scale(&self) -> f32 {
        self.height_scale
    }

    /// Build a mesh from `grid`, keeping every `2^lod`-th sample on each axis.
    ///
    /// Vertices sit at the world offset of the source sample they were taken
    /// from, so with `(R - 1)` divisible by the stride the mesh covers the
    /// whole tile at every LOD.
    pub fn build(&self, grid: &ElevationGrid, lod: LodLevel) -> Result<TileMesh, MeshError> {
        let resolution = grid.resolution();
        if resolution < 2 {
            return Err(MeshError::GridTooSmall(resolution));
        }
        let skip = skip_factor(lod);
        let reduced = decimated_resolution(resolution, lod);
        if reduced < 2 {
            return Err(MeshError::LodTooCoarse { lod, resolution });
        }

        let spacing = grid.spacing();
        let last = (resolution - 1) as f32;
        let vertex_count = reduced * reduced;

        let mut positions = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);
        for j in 0..reduced {
            for i in 0..reduced {
                let (si, sj) = (i * skip, j * skip);
                positions.push(Vec3::new(
                    si as f32 * spacing,
                    grid.get(si, sj) * self.height_scale,
                    sj as f32 * spacing,
                ));
                uvs.push(Vec2::new(si as f32 / last, sj as f32 / last));
            }
        }

        let quads = reduced - 1;
        let mut indices = Vec::with_capacity(quads * quads * 6);
        for j in 0..quads {
            for i in 0..quads {
                let a = (j * reduced + i) as u32;
                let b = a + 1;
                let c = a + reduced as u32;
                let d = c + 1;
                // Counter-clockwise seen from +Y.
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }

        let normals = vertex_normals(&positions, &indices);

        tracing::trace!(
            coord = %grid.coord(),
            lod,
            resolution = reduced,
            triangles = indices.len() / 3,
            "built tile mesh"
        );

        Ok(TileMesh {
            coord: grid.coord(),
            lod,
            resolution: reduced,
            positions,
            normals,
            uvs,
            indices,
        })
    }
}

/// Area-weighted vertex normals; vertices with no usable area point up.
fn vertex_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let face = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        normals[i0] += face;
        normals[i1] += face;
        normals[i2] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}
