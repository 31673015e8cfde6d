use std::collections::HashMap;
use std::f32::consts::{PI, TAU};
use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use ultraviolet::{Vec2, Vec3};

use crate::vulkan::buffer::DeviceBuffer;
use crate::vulkan::context::Context;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// Billboard point: the geometry shader expands each one into a camera
/// facing quad of the given size.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SpriteVertex {
    pub position: Vec3,
    pub size: Vec2,
}

/// A named index range inside a shared buffer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

/// CPU-side mesh. The generators below produce these; the store repacks
/// them into GPU buffers.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) {
        self.vertices.push(Vertex {
            position,
            normal,
            uv,
        });
    }

    /// Flat m×n vertex grid in the xz plane, centered at the origin.
    pub fn grid(width: f32, depth: f32, m: usize, n: usize) -> MeshData {
        assert!(m >= 2 && n >= 2);
        let mut mesh = MeshData::default();

        let half_width = width * 0.5;
        let half_depth = depth * 0.5;
        let dx = width / (n - 1) as f32;
        let dz = depth / (m - 1) as f32;
        let du = 1.0 / (n - 1) as f32;
        let dv = 1.0 / (m - 1) as f32;

        for i in 0..m {
            let z = half_depth - i as f32 * dz;
            for j in 0..n {
                let x = -half_width + j as f32 * dx;
                mesh.push_vertex(
                    Vec3::new(x, 0.0, z),
                    Vec3::new(0.0, 1.0, 0.0),
                    Vec2::new(j as f32 * du, i as f32 * dv),
                );
            }
        }

        for i in 0..m - 1 {
            for j in 0..n - 1 {
                let a = (i * n + j) as u32;
                let b = (i * n + j + 1) as u32;
                let c = ((i + 1) * n + j) as u32;
                let d = ((i + 1) * n + j + 1) as u32;
                mesh.indices.extend_from_slice(&[a, b, c, c, b, d]);
            }
        }
        mesh
    }

    /// The index pattern of `grid`, without materializing vertices. The wave
    /// surface uses this: its vertices live in the frame resources.
    pub fn grid_indices(m: usize, n: usize) -> Vec<u32> {
        Self::grid(1.0, 1.0, m, n).indices
    }

    /// Axis-aligned box centered at the origin, one quad per face.
    pub fn cube(width: f32, height: f32, depth: f32) -> MeshData {
        let (w, h, d) = (width * 0.5, height * 0.5, depth * 0.5);

        // per face: normal, two tangents spanning the quad
        let faces = [
            (Vec3::new(0.0, 0.0, -1.0), Vec3::new(-1.0, 0.0, 0.0)),
            (Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0)),
            (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0)),
            (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
            (Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
            (Vec3::new(0.0, -1.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)),
        ];

        let half = Vec3::new(w, h, d);
        let mut mesh = MeshData::default();
        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            let base = mesh.vertices.len() as u32;
            for (s, t, uv) in [
                (-1.0, -1.0, Vec2::new(0.0, 1.0)),
                (-1.0, 1.0, Vec2::new(0.0, 0.0)),
                (1.0, 1.0, Vec2::new(1.0, 0.0)),
                (1.0, -1.0, Vec2::new(1.0, 1.0)),
            ] {
                let position = (normal + tangent * s + bitangent * t) * half;
                mesh.push_vertex(position, normal, uv);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        }
        mesh
    }

    /// Latitude/longitude sphere with pole vertices.
    pub fn sphere(radius: f32, slices: usize, stacks: usize) -> MeshData {
        assert!(slices >= 3 && stacks >= 2);
        let mut mesh = MeshData::default();

        mesh.push_vertex(
            Vec3::new(0.0, radius, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec2::new(0.0, 0.0),
        );

        for i in 1..stacks {
            let phi = PI * i as f32 / stacks as f32;
            for j in 0..=slices {
                let theta = TAU * j as f32 / slices as f32;
                let normal = Vec3::new(
                    phi.sin() * theta.cos(),
                    phi.cos(),
                    phi.sin() * theta.sin(),
                );
                mesh.push_vertex(
                    normal * radius,
                    normal,
                    Vec2::new(theta / TAU, phi / PI),
                );
            }
        }

        mesh.push_vertex(
            Vec3::new(0.0, -radius, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec2::new(0.0, 1.0),
        );

        // top cap
        for j in 0..slices as u32 {
            mesh.indices.extend_from_slice(&[0, j + 2, j + 1]);
        }

        let ring = slices as u32 + 1;
        let first_ring = 1;
        for i in 0..stacks as u32 - 2 {
            for j in 0..slices as u32 {
                let a = first_ring + i * ring + j;
                let b = first_ring + (i + 1) * ring + j;
                mesh.indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            }
        }

        // bottom cap
        let south = mesh.vertices.len() as u32 - 1;
        let last_ring = south - ring;
        for j in 0..slices as u32 {
            mesh.indices
                .extend_from_slice(&[south, last_ring + j, last_ring + j + 1]);
        }
        mesh
    }

    /// Capped cylinder (or truncated cone when the radii differ).
    pub fn cylinder(
        bottom_radius: f32,
        top_radius: f32,
        height: f32,
        slices: usize,
        stacks: usize,
    ) -> MeshData {
        assert!(slices >= 3 && stacks >= 1);
        let mut mesh = MeshData::default();

        let stack_height = height / stacks as f32;
        let radius_step = (top_radius - bottom_radius) / stacks as f32;

        for i in 0..=stacks {
            let y = -0.5 * height + i as f32 * stack_height;
            let r = bottom_radius + i as f32 * radius_step;
            for j in 0..=slices {
                let theta = TAU * j as f32 / slices as f32;
                let (sin, cos) = theta.sin_cos();

                // slope term makes the side normal correct for cones too
                let tangent = Vec3::new(-sin, 0.0, cos);
                let bitangent = Vec3::new(
                    (bottom_radius - top_radius) / height * cos,
                    -1.0,
                    (bottom_radius - top_radius) / height * sin,
                );
                let normal = tangent.cross(bitangent).normalized();

                mesh.push_vertex(
                    Vec3::new(r * cos, y, r * sin),
                    normal,
                    Vec2::new(j as f32 / slices as f32, 1.0 - i as f32 / stacks as f32),
                );
            }
        }

        let ring = slices as u32 + 1;
        for i in 0..stacks as u32 {
            for j in 0..slices as u32 {
                let a = i * ring + j;
                let b = (i + 1) * ring + j;
                mesh.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        build_cylinder_cap(&mut mesh, top_radius, 0.5 * height, slices, true);
        build_cylinder_cap(&mut mesh, bottom_radius, -0.5 * height, slices, false);
        mesh
    }

    /// Cone standing on its base, apex up.
    pub fn cone(radius: f32, height: f32, slices: usize) -> MeshData {
        Self::cylinder(radius, 0.001, height, slices, 1)
    }

    /// Torus in the xz plane.
    pub fn torus(radius: f32, tube_radius: f32, rings: usize, sides: usize) -> MeshData {
        assert!(rings >= 3 && sides >= 3);
        let mut mesh = MeshData::default();

        for i in 0..=rings {
            let theta = TAU * i as f32 / rings as f32;
            let (sin_t, cos_t) = theta.sin_cos();
            let center = Vec3::new(radius * cos_t, 0.0, radius * sin_t);

            for j in 0..=sides {
                let phi = TAU * j as f32 / sides as f32;
                let (sin_p, cos_p) = phi.sin_cos();
                let normal =
                    Vec3::new(cos_t * cos_p, sin_p, sin_t * cos_p).normalized();
                mesh.push_vertex(
                    center + normal * tube_radius,
                    normal,
                    Vec2::new(i as f32 / rings as f32, j as f32 / sides as f32),
                );
            }
        }

        let ring = sides as u32 + 1;
        for i in 0..rings as u32 {
            for j in 0..sides as u32 {
                let a = i * ring + j;
                let b = (i + 1) * ring + j;
                mesh.indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
            }
        }
        mesh
    }

    /// Four-sided pyramid with a square base.
    pub fn pyramid(base: f32, height: f32) -> MeshData {
        let b = base * 0.5;
        let apex = Vec3::new(0.0, height * 0.5, 0.0);
        let corners = [
            Vec3::new(-b, -height * 0.5, -b),
            Vec3::new(b, -height * 0.5, -b),
            Vec3::new(b, -height * 0.5, b),
            Vec3::new(-b, -height * 0.5, b),
        ];

        let positions = [apex, corners[0], corners[1], corners[2], corners[3]];
        flat_shaded(
            &positions,
            &[
                [0, 2, 1],
                [0, 3, 2],
                [0, 4, 3],
                [0, 1, 4],
                [1, 2, 3],
                [1, 3, 4],
            ],
        )
    }

    /// Box cut in half along a diagonal: a right-triangle cross-section prism.
    pub fn wedge(width: f32, height: f32, depth: f32) -> MeshData {
        let (w, h, d) = (width * 0.5, height * 0.5, depth * 0.5);
        let positions = [
            Vec3::new(-w, -h, -d),
            Vec3::new(w, -h, -d),
            Vec3::new(w, -h, d),
            Vec3::new(-w, -h, d),
            Vec3::new(-w, h, -d),
            Vec3::new(-w, h, d),
        ];
        flat_shaded(
            &positions,
            &[
                [0, 2, 1],
                [0, 3, 2],
                [0, 1, 4],
                [2, 3, 5],
                [1, 2, 5],
                [1, 5, 4],
                [0, 4, 5],
                [0, 5, 3],
            ],
        )
    }

    /// Prism with an isosceles-triangle cross-section, ridge along z.
    pub fn triangular_prism(width: f32, height: f32, depth: f32) -> MeshData {
        let (w, h, d) = (width * 0.5, height * 0.5, depth * 0.5);
        let positions = [
            Vec3::new(-w, -h, -d),
            Vec3::new(w, -h, -d),
            Vec3::new(0.0, h, -d),
            Vec3::new(-w, -h, d),
            Vec3::new(w, -h, d),
            Vec3::new(0.0, h, d),
        ];
        flat_shaded(
            &positions,
            &[
                [0, 2, 1],
                [3, 4, 5],
                [0, 1, 4],
                [0, 4, 3],
                [1, 2, 5],
                [1, 5, 4],
                [0, 3, 5],
                [0, 5, 2],
            ],
        )
    }

    /// Elongated octahedron, a gem-like ornament.
    pub fn diamond(width: f32, height: f32) -> MeshData {
        let w = width * 0.5;
        let positions = [
            Vec3::new(0.0, height * 0.5, 0.0),
            Vec3::new(-w, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -w),
            Vec3::new(w, 0.0, 0.0),
            Vec3::new(0.0, 0.0, w),
            Vec3::new(0.0, -height * 0.5, 0.0),
        ];
        flat_shaded(
            &positions,
            &[
                [0, 2, 1],
                [0, 3, 2],
                [0, 4, 3],
                [0, 1, 4],
                [5, 1, 2],
                [5, 2, 3],
                [5, 3, 4],
                [5, 4, 1],
            ],
        )
    }
}

fn build_cylinder_cap(mesh: &mut MeshData, radius: f32, y: f32, slices: usize, top: bool) {
    let base = mesh.vertices.len() as u32;
    let normal = Vec3::new(0.0, if top { 1.0 } else { -1.0 }, 0.0);

    for j in 0..=slices {
        let theta = TAU * j as f32 / slices as f32;
        let (sin, cos) = theta.sin_cos();
        mesh.push_vertex(
            Vec3::new(radius * cos, y, radius * sin),
            normal,
            Vec2::new(cos * 0.5 + 0.5, sin * 0.5 + 0.5),
        );
    }
    let center = mesh.vertices.len() as u32;
    mesh.push_vertex(Vec3::new(0.0, y, 0.0), normal, Vec2::new(0.5, 0.5));

    for j in 0..slices as u32 {
        if top {
            mesh.indices.extend_from_slice(&[center, base + j + 1, base + j]);
        } else {
            mesh.indices.extend_from_slice(&[center, base + j, base + j + 1]);
        }
    }
}

/// Expands an indexed convex hull into flat-shaded triangles with per-face
/// normals. Faces are oriented away from the centroid, so the triangle
/// lists above do not need to agree on a winding.
fn flat_shaded(positions: &[Vec3], triangles: &[[usize; 3]]) -> MeshData {
    let centroid = positions.iter().fold(Vec3::zero(), |acc, &p| acc + p)
        / positions.len() as f32;

    let mut mesh = MeshData::default();
    for &[a, b, c] in triangles {
        let (pa, mut pb, mut pc) = (positions[a], positions[b], positions[c]);
        let mut normal = (pb - pa).cross(pc - pa).normalized();
        if normal.dot((pa + pb + pc) / 3.0 - centroid) < 0.0 {
            std::mem::swap(&mut pb, &mut pc);
            normal = -normal;
        }
        let base = mesh.vertices.len() as u32;
        mesh.push_vertex(pa, normal, Vec2::new(0.0, 0.0));
        mesh.push_vertex(pb, normal, Vec2::new(1.0, 0.0));
        mesh.push_vertex(pc, normal, Vec2::new(1.0, 1.0));
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
    mesh
}

/// Concatenates named meshes into one shared buffer pair, producing the
/// submesh table that addresses each part.
pub fn concat_meshes<'a>(
    parts: impl IntoIterator<Item = (&'a str, MeshData)>,
) -> (MeshData, HashMap<String, Submesh>) {
    let mut combined = MeshData::default();
    let mut submeshes = HashMap::new();

    for (name, part) in parts {
        let submesh = Submesh {
            index_count: part.indices.len() as u32,
            start_index: combined.indices.len() as u32,
            base_vertex: combined.vertices.len() as i32,
        };
        let previous = submeshes.insert(name.to_string(), submesh);
        assert!(previous.is_none(), "duplicate submesh name: {}", name);

        combined.vertices.extend_from_slice(&part.vertices);
        combined.indices.extend_from_slice(&part.indices);
    }
    (combined, submeshes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(usize);

#[cfg(test)]
impl GeometryHandle {
    pub fn default_for_tests() -> Self {
        GeometryHandle(0)
    }
}

enum VertexBacking {
    Static(DeviceBuffer<Vertex>),
    Sprites(DeviceBuffer<SpriteVertex>),
    /// Vertices are rewritten into the current frame resource every frame.
    PerFrame,
}

pub struct Geometry {
    backing: VertexBacking,
    index_buffer: DeviceBuffer<u32>,
    submeshes: HashMap<String, Submesh>,
    vertex_count: usize,
}

impl Geometry {
    pub fn static_mesh(
        context: Arc<Context>,
        mesh: &MeshData,
        submeshes: HashMap<String, Submesh>,
    ) -> Geometry {
        let geometry = Geometry {
            backing: VertexBacking::Static(DeviceBuffer::from_data(
                context.clone(),
                &mesh.vertices,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )),
            index_buffer: DeviceBuffer::from_data(
                context,
                &mesh.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
            ),
            submeshes,
            vertex_count: mesh.vertices.len(),
        };
        geometry.validate_submeshes(mesh.indices.len());
        geometry
    }

    pub fn sprite_points(
        context: Arc<Context>,
        submesh_name: &str,
        points: &[SpriteVertex],
    ) -> Geometry {
        let indices: Vec<u32> = (0..points.len() as u32).collect();
        Geometry {
            backing: VertexBacking::Sprites(DeviceBuffer::from_data(
                context.clone(),
                points,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )),
            index_buffer: DeviceBuffer::from_data(
                context,
                &indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
            ),
            submeshes: HashMap::from([(
                submesh_name.to_string(),
                Submesh {
                    index_count: points.len() as u32,
                    start_index: 0,
                    base_vertex: 0,
                },
            )]),
            vertex_count: points.len(),
        }
    }

    /// Index buffer only; the vertices come from the frame resources'
    /// dynamic buffers.
    pub fn frame_owned(
        context: Arc<Context>,
        submesh_name: &str,
        vertex_count: usize,
        indices: &[u32],
    ) -> Geometry {
        let geometry = Geometry {
            backing: VertexBacking::PerFrame,
            index_buffer: DeviceBuffer::from_data(
                context,
                indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
            ),
            submeshes: HashMap::from([(
                submesh_name.to_string(),
                Submesh {
                    index_count: indices.len() as u32,
                    start_index: 0,
                    base_vertex: 0,
                },
            )]),
            vertex_count,
        };
        geometry.validate_submeshes(indices.len());
        geometry
    }

    fn validate_submeshes(&self, index_count: usize) {
        for (name, submesh) in self.submeshes.iter() {
            assert!(
                (submesh.start_index + submesh.index_count) as usize <= index_count,
                "submesh '{}' exceeds its index buffer",
                name
            );
            assert!(
                (submesh.base_vertex as usize) < self.vertex_count.max(1),
                "submesh '{}' starts past its vertex buffer",
                name
            );
        }
    }

    /// `None` for frame-owned geometry; the caller binds the current frame
    /// resource's dynamic buffer instead.
    pub fn vertex_buffer(&self) -> Option<vk::Buffer> {
        match &self.backing {
            VertexBacking::Static(buffer) => Some(buffer.buffer()),
            VertexBacking::Sprites(buffer) => Some(buffer.buffer()),
            VertexBacking::PerFrame => None,
        }
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.buffer()
    }

    pub fn submesh(&self, name: &str) -> Submesh {
        *self
            .submeshes
            .get(name)
            .unwrap_or_else(|| panic!("unknown submesh: {}", name))
    }
}

/// Owns all geometry for the session; render items refer into it by handle.
#[derive(Default)]
pub struct GeometryStore {
    geometries: Vec<Geometry>,
    names: HashMap<String, GeometryHandle>,
}

impl GeometryStore {
    pub fn add(&mut self, name: &str, geometry: Geometry) -> GeometryHandle {
        let handle = GeometryHandle(self.geometries.len());
        let previous = self.names.insert(name.to_string(), handle);
        assert!(previous.is_none(), "duplicate geometry name: {}", name);
        self.geometries.push(geometry);
        handle
    }

    pub fn get(&self, handle: GeometryHandle) -> &Geometry {
        &self.geometries[handle.0]
    }

    pub fn handle(&self, name: &str) -> GeometryHandle {
        *self
            .names
            .get(name)
            .unwrap_or_else(|| panic!("unknown geometry: {}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_bounds(mesh: &MeshData) {
        let max = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < max));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn grid_has_two_triangles_per_cell() {
        let mesh = MeshData::grid(10.0, 10.0, 4, 5);
        assert_eq!(mesh.vertices.len(), 20);
        assert_eq!(mesh.indices.len(), 3 * 2 * 3 * 4);
        assert_indices_in_bounds(&mesh);
    }

    #[test]
    fn all_generators_produce_valid_meshes() {
        for mesh in [
            MeshData::cube(1.0, 2.0, 3.0),
            MeshData::sphere(1.0, 12, 8),
            MeshData::cylinder(1.0, 0.7, 2.0, 16, 3),
            MeshData::cone(1.0, 2.0, 12),
            MeshData::torus(2.0, 0.5, 16, 8),
            MeshData::pyramid(1.0, 1.5),
            MeshData::wedge(1.0, 1.0, 2.0),
            MeshData::triangular_prism(1.0, 1.0, 2.0),
            MeshData::diamond(0.8, 1.6),
        ] {
            assert_indices_in_bounds(&mesh);
            for vertex in mesh.vertices.iter() {
                assert!((vertex.normal.mag() - 1.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn origin_centered_solids_face_outward() {
        for mesh in [
            MeshData::cube(1.0, 1.0, 1.0),
            MeshData::sphere(1.0, 12, 8),
            MeshData::pyramid(1.0, 1.5),
            MeshData::diamond(0.8, 1.6),
        ] {
            for triangle in mesh.indices.chunks_exact(3) {
                let [a, b, c] =
                    [triangle[0], triangle[1], triangle[2]].map(|i| mesh.vertices[i as usize]);
                let geometric = (b.position - a.position).cross(c.position - a.position);
                let center = (a.position + b.position + c.position) / 3.0;
                // right-handed winding must agree with the outward direction
                assert!(geometric.dot(center) > 0.0);
            }
        }
    }

    #[test]
    fn concat_accumulates_offsets() {
        let a = MeshData::cube(1.0, 1.0, 1.0);
        let b = MeshData::pyramid(1.0, 1.0);
        let (a_verts, a_indices) = (a.vertices.len(), a.indices.len());

        let (combined, submeshes) = concat_meshes([("cube", a), ("pyramid", b)]);

        let cube = submeshes["cube"];
        assert_eq!(cube.start_index, 0);
        assert_eq!(cube.base_vertex, 0);
        assert_eq!(cube.index_count as usize, a_indices);

        let pyramid = submeshes["pyramid"];
        assert_eq!(pyramid.start_index as usize, a_indices);
        assert_eq!(pyramid.base_vertex as usize, a_verts);
        assert_eq!(
            combined.indices.len() as u32,
            cube.index_count + pyramid.index_count
        );
    }

    #[test]
    #[should_panic(expected = "duplicate submesh name")]
    fn concat_rejects_duplicate_names() {
        concat_meshes([
            ("cube", MeshData::cube(1.0, 1.0, 1.0)),
            ("cube", MeshData::cube(2.0, 2.0, 2.0)),
        ]);
    }

    #[test]
    fn grid_indices_match_grid() {
        assert_eq!(MeshData::grid_indices(4, 5), MeshData::grid(3.0, 7.0, 4, 5).indices);
    }
}
