//! Asset loading: parsed mesh data and decoded images.
//!
//! The loader is an I/O collaborator of the engine. It produces flat arrays
//! ([`MeshData`]) and RGBA8 pixels ([`ImageData`]) and knows nothing about the
//! GPU; turn the results into engine resources with
//! [`Geometry::from_mesh_data`](crate::Geometry::from_mesh_data) and
//! [`ImageData::upload`].
//!
//! # Supported Formats
//!
//! | Kind  | Extensions | Notes |
//! |-------|------------|-------|
//! | Mesh  | `.stl`     | Binary and ASCII, flat normals, no UV coordinates |
//! | Image | anything the `image` crate decodes | Converted to RGBA8 |

use std::path::Path;

use glam::Vec3;

use crate::backend::{GpuBackend, TextureDesc, TextureFormat, TextureId, TextureKind};
use crate::error::{BackendError, LoadError};

/// Flat mesh arrays as produced by a loader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    /// xyz triples.
    pub positions: Vec<f32>,
    /// xyz triples, empty when the source has none.
    pub normals: Vec<f32>,
    /// uv pairs, empty when the source has none.
    pub uvs: Vec<f32>,
    /// Triangle list indices, empty for non-indexed data.
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        self.points().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(min, max), p| (min.min(p), max.max(p)),
        )
    }

    pub fn center(&self) -> Vec3 {
        let (min, max) = self.bounds();
        (min + max) * 0.5
    }

    pub fn translate(&mut self, offset: Vec3) {
        for p in self.positions.chunks_exact_mut(3) {
            p[0] += offset.x;
            p[1] += offset.y;
            p[2] += offset.z;
        }
    }

    /// Moves the bounding-box center to the origin.
    pub fn recenter(&mut self) {
        let center = self.center();
        self.translate(-center);
    }

    /// Scales uniformly so the largest bounding-box side is 1.
    pub fn normalize(&mut self) {
        let (min, max) = self.bounds();
        let size = max - min;
        let max_dim = size.x.max(size.y).max(size.z);
        if max_dim > 0.0 {
            for v in &mut self.positions {
                *v /= max_dim;
            }
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    /// Creates a 2D texture holding these pixels.
    pub fn upload(&self, backend: &mut dyn GpuBackend, label: &str) -> Result<TextureId, BackendError> {
        backend.create_texture(&TextureDesc {
            label,
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8,
            width: self.width,
            height: self.height,
            data: Some(&self.rgba),
        })
    }
}

/// Loads a mesh, picking the parser from the file extension.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<MeshData, LoadError> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "stl" => {
            let file = std::fs::File::open(path)?;
            let mut reader = std::io::BufReader::new(file);
            parse_stl(&mut reader)
        }
        _ => Err(LoadError::UnknownFormat(ext)),
    }
}

/// Parses binary or ASCII STL from memory.
pub fn parse_stl_bytes(bytes: &[u8]) -> Result<MeshData, LoadError> {
    let mut cursor = std::io::Cursor::new(bytes);
    parse_stl(&mut cursor)
}

fn parse_stl<R: std::io::Read + std::io::Seek>(reader: &mut R) -> Result<MeshData, LoadError> {
    let stl = stl_io::read_stl(reader)?;

    let mut mesh = MeshData {
        positions: Vec::with_capacity(stl.faces.len() * 9),
        normals: Vec::with_capacity(stl.faces.len() * 9),
        uvs: Vec::new(),
        indices: Vec::with_capacity(stl.faces.len() * 3),
    };

    // Faces are unrolled so every corner carries the flat face normal.
    for (i, face) in stl.faces.iter().enumerate() {
        let normal: [f32; 3] = face.normal.into();
        for &vertex_idx in &face.vertices {
            let position: [f32; 3] = stl.vertices[vertex_idx].into();
            mesh.positions.extend_from_slice(&position);
            mesh.normals.extend_from_slice(&normal);
        }
        let base = (i * 3) as u32;
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    log::debug!("parsed STL with {} faces", stl.faces.len());
    Ok(mesh)
}

/// Loads and decodes an image file into RGBA8.
pub fn load_image(path: impl AsRef<Path>) -> Result<ImageData, LoadError> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(ImageData {
        width,
        height,
        rgba: img.into_raw(),
    })
}

/// Decodes an in-memory image into RGBA8.
pub fn load_image_bytes(bytes: &[u8]) -> Result<ImageData, LoadError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(ImageData {
        width,
        height,
        rgba: img.into_raw(),
    })
}
