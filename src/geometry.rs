//! Vertex data: named attribute streams, optional indices, and the built-in
//! primitives.
//!
//! A [`Geometry`] is validated when it is built and uploaded to the backend
//! the first time it is drawn. After that it is immutable; many meshes can
//! share one geometry through an `Rc`.
//!
//! # Attribute Layout
//!
//! Every attribute has a fixed shader location, whatever subset a geometry
//! actually carries:
//!
//! | Attribute      | Components | Location | Shader name    |
//! |----------------|------------|----------|----------------|
//! | position       | 3          | 0        | `aPosition`    |
//! | normal         | 3          | 1        | `aNormal`      |
//! | uv             | 2          | 2        | `aUv`          |
//! | tangent        | 3          | 3        | `aTangent`     |
//! | binormal       | 3          | 4        | `aBinormal`    |
//! | bone indices   | 4          | 5        | `aBoneIndices` |
//! | bone weights   | 4          | 6        | `aBoneWeights` |
//!
//! # Example
//!
//! ```
//! use umbra::geometry::{GeometryDesc, Geometry, VertexAttribute};
//!
//! let quad = Geometry::new(
//!     GeometryDesc::new("quad")
//!         .attribute(VertexAttribute::Position, vec![
//!             0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  1.0, 1.0, 0.0,  0.0, 1.0, 0.0,
//!         ])
//!         .indices(vec![0, 1, 2, 0, 2, 3]),
//! ).unwrap();
//! assert_eq!(quad.vertex_count(), 4);
//! assert_eq!(quad.draw_count(), 6);
//! ```

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use glam::Vec3;

use crate::backend::{AttributeData, DrawCall, GpuBackend, VertexArrayDesc, VertexArrayId};
use crate::error::{BackendError, ConfigError};
use crate::loader::MeshData;

/// Normals closer than this to ±Y derive tangents from the Z axis instead.
const TANGENT_AXIS_EPSILON: f32 = 1e-3;

/// A named vertex attribute stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexAttribute {
    Position,
    Normal,
    Uv,
    Tangent,
    Binormal,
    BoneIndices,
    BoneWeights,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 7] = [
        VertexAttribute::Position,
        VertexAttribute::Normal,
        VertexAttribute::Uv,
        VertexAttribute::Tangent,
        VertexAttribute::Binormal,
        VertexAttribute::BoneIndices,
        VertexAttribute::BoneWeights,
    ];

    /// Floats per vertex.
    pub fn components(self) -> usize {
        match self {
            VertexAttribute::Uv => 2,
            VertexAttribute::BoneIndices | VertexAttribute::BoneWeights => 4,
            _ => 3,
        }
    }

    /// Shader input location.
    pub fn location(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexAttribute::Position => "aPosition",
            VertexAttribute::Normal => "aNormal",
            VertexAttribute::Uv => "aUv",
            VertexAttribute::Tangent => "aTangent",
            VertexAttribute::Binormal => "aBinormal",
            VertexAttribute::BoneIndices => "aBoneIndices",
            VertexAttribute::BoneWeights => "aBoneWeights",
        }
    }
}

impl FromStr for VertexAttribute {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" | "aPosition" => Ok(VertexAttribute::Position),
            "normal" | "aNormal" => Ok(VertexAttribute::Normal),
            "uv" | "aUv" => Ok(VertexAttribute::Uv),
            "tangent" | "aTangent" => Ok(VertexAttribute::Tangent),
            "binormal" | "aBinormal" => Ok(VertexAttribute::Binormal),
            "boneIndices" | "aBoneIndices" => Ok(VertexAttribute::BoneIndices),
            "boneWeights" | "aBoneWeights" => Ok(VertexAttribute::BoneWeights),
            other => Err(ConfigError::UnknownAttribute(other.to_string())),
        }
    }
}

impl fmt::Display for VertexAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How vertices are assembled into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

impl FromStr for PrimitiveKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triangles" => Ok(PrimitiveKind::Triangles),
            "triangle_strip" => Ok(PrimitiveKind::TriangleStrip),
            "lines" => Ok(PrimitiveKind::Lines),
            "line_strip" => Ok(PrimitiveKind::LineStrip),
            "points" => Ok(PrimitiveKind::Points),
            other => Err(ConfigError::UnknownPrimitive(other.to_string())),
        }
    }
}

/// Unvalidated input for [`Geometry::new`].
#[derive(Clone, Debug, Default)]
pub struct GeometryDesc {
    pub label: String,
    pub primitive: PrimitiveKind,
    pub attributes: Vec<(VertexAttribute, Vec<f32>)>,
    pub indices: Option<Vec<u32>>,
}

impl GeometryDesc {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn primitive(mut self, primitive: PrimitiveKind) -> Self {
        self.primitive = primitive;
        self
    }

    /// Adds or replaces an attribute stream.
    pub fn attribute(mut self, attribute: VertexAttribute, data: Vec<f32>) -> Self {
        self.attributes.retain(|(a, _)| *a != attribute);
        self.attributes.push((attribute, data));
        self
    }

    pub fn indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = Some(indices);
        self
    }
}

/// Validated vertex data, uploaded to the backend at most once.
#[derive(Debug)]
pub struct Geometry {
    label: String,
    primitive: PrimitiveKind,
    /// Sorted by shader location.
    attributes: Vec<(VertexAttribute, Vec<f32>)>,
    indices: Option<Vec<u32>>,
    vertex_count: usize,
    vertex_array: Cell<Option<VertexArrayId>>,
}

impl Geometry {
    /// Validates the attribute streams and derives tangents.
    ///
    /// Position is mandatory and fixes the vertex count; every other stream
    /// must describe the same number of vertices. When normals are present
    /// and tangents are not, tangent and binormal streams are derived.
    pub fn new(desc: GeometryDesc) -> Result<Self, ConfigError> {
        let GeometryDesc {
            label,
            primitive,
            mut attributes,
            indices,
        } = desc;

        let positions = attributes
            .iter()
            .find(|(a, _)| *a == VertexAttribute::Position)
            .ok_or(ConfigError::MissingPositions)?;
        let vertex_count = positions.1.len() / 3;

        for (attribute, data) in &attributes {
            let components = attribute.components();
            if data.len() % components != 0 {
                return Err(ConfigError::RaggedAttribute {
                    attribute: attribute.name(),
                    len: data.len(),
                    components,
                });
            }
            let count = data.len() / components;
            if count != vertex_count {
                return Err(ConfigError::AttributeLengthMismatch {
                    attribute: attribute.name(),
                    expected: vertex_count,
                    actual: count,
                });
            }
        }

        if let Some(indices) = &indices {
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(ConfigError::IndexOutOfRange {
                    index: bad,
                    vertex_count,
                });
            }
        }

        let has = |attrs: &[(VertexAttribute, Vec<f32>)], which| attrs.iter().any(|(a, _)| *a == which);
        if has(&attributes, VertexAttribute::Normal) && !has(&attributes, VertexAttribute::Tangent) {
            let normals = attributes
                .iter()
                .find(|(a, _)| *a == VertexAttribute::Normal)
                .map(|(_, d)| d.as_slice())
                .unwrap_or_default();
            let (tangents, binormals) = derive_tangents(normals);
            attributes.retain(|(a, _)| *a != VertexAttribute::Binormal);
            attributes.push((VertexAttribute::Tangent, tangents));
            attributes.push((VertexAttribute::Binormal, binormals));
        }
        attributes.sort_by_key(|(a, _)| *a);

        Ok(Self {
            label,
            primitive,
            attributes,
            indices,
            vertex_count,
            vertex_array: Cell::new(None),
        })
    }

    /// Builds a triangle list from loader output.
    pub fn from_mesh_data(label: impl Into<String>, mesh: &MeshData) -> Result<Self, ConfigError> {
        let mut desc = GeometryDesc::new(label).attribute(VertexAttribute::Position, mesh.positions.clone());
        if !mesh.normals.is_empty() {
            desc = desc.attribute(VertexAttribute::Normal, mesh.normals.clone());
        }
        if !mesh.uvs.is_empty() {
            desc = desc.attribute(VertexAttribute::Uv, mesh.uvs.clone());
        }
        if !mesh.indices.is_empty() {
            desc = desc.indices(mesh.indices.clone());
        }
        Self::new(desc)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn primitive(&self) -> PrimitiveKind {
        self.primitive
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    pub fn attribute(&self, attribute: VertexAttribute) -> Option<&[f32]> {
        self.attributes
            .iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, d)| d.as_slice())
    }

    pub fn has_attribute(&self, attribute: VertexAttribute) -> bool {
        self.attribute(attribute).is_some()
    }

    /// Elements a draw submits: index count when indexed, else vertex count.
    pub fn draw_count(&self) -> usize {
        self.indices.as_ref().map_or(self.vertex_count, Vec::len)
    }

    pub fn is_uploaded(&self) -> bool {
        self.vertex_array.get().is_some()
    }

    /// Creates the backend vertex array on first call; later calls return
    /// the same handle.
    pub fn upload(&self, backend: &mut dyn GpuBackend) -> Result<VertexArrayId, BackendError> {
        if let Some(id) = self.vertex_array.get() {
            return Ok(id);
        }

        let attributes: Vec<AttributeData> = self
            .attributes
            .iter()
            .map(|(attribute, data)| AttributeData {
                attribute: *attribute,
                data,
            })
            .collect();
        let id = backend.create_vertex_array(&VertexArrayDesc {
            attributes: &attributes,
            indices: self.indices.as_deref(),
            vertex_count: self.vertex_count as u32,
        })?;

        log::debug!(
            "uploaded geometry '{}': {} vertices, {} attributes",
            self.label,
            self.vertex_count,
            attributes.len()
        );
        self.vertex_array.set(Some(id));
        Ok(id)
    }

    /// Issues one draw with the program and target currently bound.
    pub fn draw(&self, backend: &mut dyn GpuBackend) -> Result<(), BackendError> {
        let vertex_array = self.upload(backend)?;
        backend.draw(&DrawCall {
            vertex_array,
            primitive: self.primitive,
            count: self.draw_count() as u32,
            indexed: self.indices.is_some(),
        })
    }

    /// Unit cube centered at the origin, one quad per face.
    pub fn cube() -> Self {
        #[rustfmt::skip]
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([ 0.0,  0.0,  1.0], [[-0.5, -0.5,  0.5], [ 0.5, -0.5,  0.5], [ 0.5,  0.5,  0.5], [-0.5,  0.5,  0.5]]),
            ([ 0.0,  0.0, -1.0], [[ 0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5,  0.5, -0.5], [ 0.5,  0.5, -0.5]]),
            ([ 0.0,  1.0,  0.0], [[-0.5,  0.5,  0.5], [ 0.5,  0.5,  0.5], [ 0.5,  0.5, -0.5], [-0.5,  0.5, -0.5]]),
            ([ 0.0, -1.0,  0.0], [[-0.5, -0.5, -0.5], [ 0.5, -0.5, -0.5], [ 0.5, -0.5,  0.5], [-0.5, -0.5,  0.5]]),
            ([ 1.0,  0.0,  0.0], [[ 0.5, -0.5,  0.5], [ 0.5, -0.5, -0.5], [ 0.5,  0.5, -0.5], [ 0.5,  0.5,  0.5]]),
            ([-1.0,  0.0,  0.0], [[-0.5, -0.5, -0.5], [-0.5, -0.5,  0.5], [-0.5,  0.5,  0.5], [-0.5,  0.5, -0.5]]),
        ];
        const FACE_UVS: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];

        let mut positions = Vec::with_capacity(72);
        let mut normals = Vec::with_capacity(72);
        let mut uvs = Vec::with_capacity(48);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, corners)) in faces.iter().enumerate() {
            for corner in corners {
                positions.extend_from_slice(corner);
                normals.extend_from_slice(normal);
            }
            uvs.extend_from_slice(&FACE_UVS);
            let base = face as u32 * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::built_in("cube", positions, normals, uvs, indices)
    }

    /// Square on the XZ plane facing +Y, `size` units on a side.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        #[rustfmt::skip]
        let positions = vec![
            -h, 0.0,  h,
             h, 0.0,  h,
             h, 0.0, -h,
            -h, 0.0, -h,
        ];
        let normals = [0.0, 1.0, 0.0].repeat(4);
        let uvs = vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        Self::built_in("plane", positions, normals, uvs, vec![0, 1, 2, 2, 3, 0])
    }

    /// UV sphere of radius 0.5. `segments` and `rings` are clamped to 3 and 2.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let mut indices = Vec::new();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for seg in 0..=segments {
                let theta = 2.0 * std::f32::consts::PI * seg as f32 / segments as f32;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                positions.extend_from_slice(&[x * 0.5, y * 0.5, z * 0.5]);
                normals.extend_from_slice(&[x, y, z]);
                uvs.extend_from_slice(&[seg as f32 / segments as f32, ring as f32 / rings as f32]);
            }
        }

        // Counter-clockwise seen from outside.
        for ring in 0..rings {
            for seg in 0..segments {
                let current = ring * (segments + 1) + seg;
                let next = current + segments + 1;
                indices.extend_from_slice(&[current, current + 1, next]);
                indices.extend_from_slice(&[current + 1, next + 1, next]);
            }
        }

        Self::built_in("sphere", positions, normals, uvs, indices)
    }

    /// Clip-space quad covering the viewport, used by post-process passes.
    ///
    /// UV (0, 0) is the top-left corner of the screen.
    pub fn fullscreen_quad() -> Self {
        #[rustfmt::skip]
        let positions = vec![
            -1.0, -1.0, 0.0,
             1.0, -1.0, 0.0,
             1.0,  1.0, 0.0,
            -1.0,  1.0, 0.0,
        ];
        let uvs = vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let desc = GeometryDesc::new("fullscreen quad")
            .attribute(VertexAttribute::Position, positions)
            .attribute(VertexAttribute::Uv, uvs)
            .indices(vec![0, 1, 2, 2, 3, 0]);
        Self::from_valid(desc)
    }

    fn built_in(label: &str, positions: Vec<f32>, normals: Vec<f32>, uvs: Vec<f32>, indices: Vec<u32>) -> Self {
        let desc = GeometryDesc::new(label)
            .attribute(VertexAttribute::Position, positions)
            .attribute(VertexAttribute::Normal, normals)
            .attribute(VertexAttribute::Uv, uvs)
            .indices(indices);
        Self::from_valid(desc)
    }

    /// Skips validation for built-in data known to be consistent.
    fn from_valid(desc: GeometryDesc) -> Self {
        match Self::new(desc) {
            Ok(geometry) => geometry,
            Err(err) => unreachable!("built-in geometry is malformed: {err}"),
        }
    }
}

/// Per-vertex tangent and binormal from a fixed reference axis.
fn derive_tangents(normals: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut tangents = Vec::with_capacity(normals.len());
    let mut binormals = Vec::with_capacity(normals.len());

    for n in normals.chunks_exact(3) {
        let normal = Vec3::new(n[0], n[1], n[2]).normalize_or_zero();
        let reference = if (normal.y.abs() - 1.0).abs() < TANGENT_AXIS_EPSILON {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let tangent = reference.cross(normal).normalize_or_zero();
        let binormal = normal.cross(tangent);
        tangents.extend_from_slice(&tangent.to_array());
        binormals.extend_from_slice(&binormal.to_array());
    }

    (tangents, binormals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Command, GpuBackend, HeadlessBackend};

    fn quad_desc() -> GeometryDesc {
        GeometryDesc::new("quad")
            .attribute(
                VertexAttribute::Position,
                vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            )
            .indices(vec![0, 1, 2, 0, 2, 3])
    }

    fn backend_with_program() -> HeadlessBackend {
        let mut backend = HeadlessBackend::new(8, 8);
        let program = backend.compile_program("vs", "fs", &[]).unwrap();
        backend.use_program(program).unwrap();
        backend
    }

    #[test]
    fn indexed_quad_draws_six_elements() {
        let geometry = Geometry::new(quad_desc()).unwrap();
        assert_eq!(geometry.vertex_count(), 4);

        let mut backend = backend_with_program();
        geometry.draw(&mut backend).unwrap();

        let draws: Vec<_> = backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Draw(call) => Some(*call),
                _ => None,
            })
            .collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].count, 6);
        assert!(draws[0].indexed);
        assert_eq!(draws[0].primitive, PrimitiveKind::Triangles);
    }

    #[test]
    fn upload_happens_once() {
        let geometry = Geometry::new(quad_desc()).unwrap();
        let mut backend = backend_with_program();
        let first = geometry.upload(&mut backend).unwrap();
        geometry.draw(&mut backend).unwrap();
        geometry.draw(&mut backend).unwrap();
        assert_eq!(geometry.upload(&mut backend).unwrap(), first);

        let uploads = backend
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::CreateVertexArray { .. }))
            .count();
        assert_eq!(uploads, 1);
    }

    #[test]
    fn missing_positions_is_rejected() {
        let desc = GeometryDesc::new("bad").attribute(VertexAttribute::Uv, vec![0.0, 0.0]);
        assert!(matches!(Geometry::new(desc), Err(ConfigError::MissingPositions)));
    }

    #[test]
    fn mismatched_attribute_is_rejected() {
        let desc = quad_desc().attribute(VertexAttribute::Uv, vec![0.0; 6]);
        assert!(matches!(
            Geometry::new(desc),
            Err(ConfigError::AttributeLengthMismatch { expected: 4, actual: 3, .. })
        ));

        let ragged = quad_desc().attribute(VertexAttribute::Normal, vec![0.0; 10]);
        assert!(matches!(Geometry::new(ragged), Err(ConfigError::RaggedAttribute { .. })));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let desc = quad_desc().indices(vec![0, 1, 4]);
        assert!(matches!(
            Geometry::new(desc),
            Err(ConfigError::IndexOutOfRange { index: 4, vertex_count: 4 })
        ));
    }

    #[test]
    fn tangents_follow_reference_axis() {
        let desc = GeometryDesc::new("pair")
            .attribute(VertexAttribute::Position, vec![0.0; 6])
            .attribute(VertexAttribute::Normal, vec![0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let geometry = Geometry::new(desc).unwrap();
        let tangents = geometry.attribute(VertexAttribute::Tangent).unwrap();
        let binormals = geometry.attribute(VertexAttribute::Binormal).unwrap();

        // +Z normal uses the Y reference.
        assert_eq!(&tangents[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&binormals[0..3], &[0.0, 1.0, 0.0]);
        // +Y normal switches to the Z reference.
        assert_eq!(&tangents[3..6], &[-1.0, 0.0, 0.0]);
    }

    #[test]
    fn primitives_are_counter_clockwise_outward() {
        for geometry in [Geometry::cube(), Geometry::plane(2.0), Geometry::sphere(12, 6)] {
            let positions = geometry.attribute(VertexAttribute::Position).unwrap();
            let normals = geometry.attribute(VertexAttribute::Normal).unwrap();
            let at = |data: &[f32], i: u32| {
                let i = i as usize * 3;
                Vec3::new(data[i], data[i + 1], data[i + 2])
            };
            for tri in geometry.indices().unwrap().chunks_exact(3) {
                let (a, b, c) = (at(positions, tri[0]), at(positions, tri[1]), at(positions, tri[2]));
                let face = (b - a).cross(c - a);
                if face.length_squared() < 1e-12 {
                    continue; // collapsed triangles at the sphere poles
                }
                assert!(
                    face.dot(at(normals, tri[0])) > 0.0,
                    "{} has an inward triangle {tri:?}",
                    geometry.label()
                );
            }
        }
    }

    #[test]
    fn parses_primitive_names() {
        assert_eq!("line_strip".parse::<PrimitiveKind>(), Ok(PrimitiveKind::LineStrip));
        assert!("quads".parse::<PrimitiveKind>().is_err());
        assert_eq!("uv".parse::<VertexAttribute>(), Ok(VertexAttribute::Uv));
    }
}
