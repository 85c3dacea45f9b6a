use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use terrastream_common::{LodLevel, TileCoord};

/// Interleaved vertex layout for GPU upload.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Renderable payload for one tile at one LOD.
///
/// Positions are relative to the tile origin (`coord * tile_size`); the
/// renderer applies that translation with no rotation or scale.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMesh {
    pub coord: TileCoord,
    pub lod: LodLevel,
    /// Vertices per edge after decimation.
    pub resolution: usize,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl TileMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Lowest and highest vertex heights.
    pub fn height_bounds(&self) -> (f32, f32) {
        self.positions
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.y), hi.max(p.y))
            })
    }

    /// Positions, normals and uvs zipped into the GPU vertex layout.
    pub fn interleaved(&self) -> Vec<TerrainVertex> {
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.uvs)
            .map(|((p, n), uv)| TerrainVertex {
                position: p.to_array(),
                normal: n.to_array(),
                uv: uv.to_array(),
            })
            .collect()
    }

    /// Index buffer as raw bytes, ready for an index buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
