use std::sync::Arc;

use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

use crate::geometry::{
    concat_meshes, Geometry, GeometryStore, MeshData, SpriteVertex,
};
use crate::scene::{MaterialHandle, RenderLayer, Scene};
use crate::vulkan::context::Context;
use crate::vulkan::texture;
use crate::waves::Waves;

/// Labyrinth floor plan on the central plateau. `#` is a wall segment,
/// `.` is walkway; the center stays open for the building and sculpture.
const MAZE_PLAN: &[&str] = &[
    "##### . #####",
    "#...#.#.#...#",
    "#.#.#.#.#.#.#",
    "#.#...#...#.#",
    "#.###...###.#",
    "..... ... ...",
    "#.#.. ... #.#",
    "..... ... ...",
    "#.###...###.#",
    "#.#...#...#.#",
    "#.#.#.#.#.#.#",
    "#...#.#.#...#",
    "##### . #####",
];

const MAZE_CELL: f32 = 5.0;
const WALL_HEIGHT: f32 = 6.0;

const PLATEAU_EXTENT: f32 = 36.0;
const MOAT_BOTTOM: f32 = -6.0;
const RIM_START: f32 = 52.0;

pub const WATER_LEVEL: f32 = -1.5;

/// Everything the frame loop needs from scene construction.
pub struct BuiltScene {
    pub scene: Scene,
    pub geometries: GeometryStore,
    pub water_material: MaterialHandle,
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Terrain height: a flat central plateau, a moat ring that dips under the
/// water level, and a hilly outer rim.
pub fn land_height(x: f32, z: f32) -> f32 {
    let d = x.abs().max(z.abs());

    let moat = smoothstep(PLATEAU_EXTENT, PLATEAU_EXTENT + 8.0, d);
    let rim = smoothstep(RIM_START, RIM_START + 14.0, d);

    let hills = 0.3 * (z * (0.1 * x).sin() + x * (0.1 * z).cos());
    moat * MOAT_BOTTOM + rim * (10.0 - MOAT_BOTTOM + hills).max(0.0)
}

fn land_normal(x: f32, z: f32) -> Vec3 {
    let h = 0.5;
    let dx = land_height(x + h, z) - land_height(x - h, z);
    let dz = land_height(x, z + h) - land_height(x, z - h);
    Vec3::new(-dx, 2.0 * h, -dz).normalized()
}

/// Grid cells of the maze plan that carry a wall, as (row, column).
fn wall_cells(plan: &[&str]) -> Vec<(usize, usize)> {
    plan.iter()
        .enumerate()
        .flat_map(|(row, line)| {
            line.chars()
                .enumerate()
                .filter(|&(_, c)| c == '#')
                .map(move |(col, _)| (row, col))
        })
        .collect()
}

/// World-space center of a maze cell.
fn cell_center(plan: &[&str], row: usize, col: usize) -> Vec2 {
    let rows = plan.len() as f32;
    let cols = plan[0].len() as f32;
    Vec2::new(
        (col as f32 - (cols - 1.0) * 0.5) * MAZE_CELL,
        (row as f32 - (rows - 1.0) * 0.5) * MAZE_CELL,
    )
}

fn translation_scale(translation: Vec3, scale: Vec3) -> Mat4 {
    Mat4::from_translation(translation) * Mat4::from_nonuniform_scale(scale)
}

fn uv_scale(u: f32, v: f32) -> Mat4 {
    Mat4::from_nonuniform_scale(Vec3::new(u, v, 1.0))
}

pub fn build_scene(context: &Arc<Context>, waves: &Waves) -> BuiltScene {
    let mut scene = Scene::new();
    let mut geometries = GeometryStore::default();

    // Materials in texture-slot order; reordering either side breaks the
    // descriptor binding.
    let bricks = scene.add_material(
        "bricks",
        texture::TEXTURE_BRICKS,
        Vec4::one(),
        Vec3::new(0.02, 0.02, 0.02),
        0.1,
    );
    let stone = scene.add_material(
        "stone",
        texture::TEXTURE_STONE,
        Vec4::one(),
        Vec3::new(0.05, 0.05, 0.05),
        0.3,
    );
    let tile = scene.add_material(
        "tile",
        texture::TEXTURE_TILE,
        Vec4::one(),
        Vec3::new(0.02, 0.02, 0.02),
        0.3,
    );
    let grass = scene.add_material(
        "grass",
        texture::TEXTURE_GRASS,
        Vec4::one(),
        Vec3::new(0.01, 0.01, 0.01),
        0.125,
    );
    let water_material = scene.add_material(
        "water",
        texture::TEXTURE_WATER,
        Vec4::new(1.0, 1.0, 1.0, 0.5),
        Vec3::new(0.1, 0.1, 0.1),
        0.0,
    );
    let rosy_bricks = scene.add_material(
        "rosy bricks",
        texture::TEXTURE_ROSY_BRICKS,
        Vec4::one(),
        Vec3::new(0.02, 0.02, 0.02),
        0.25,
    );
    let tree_sprites = scene.add_material(
        "tree sprites",
        texture::TEXTURE_TREE_ARRAY,
        Vec4::one(),
        Vec3::new(0.01, 0.01, 0.01),
        0.125,
    );

    // land: a displaced grid
    let land_geometry = {
        let mut mesh = MeshData::grid(160.0, 160.0, 50, 50);
        for vertex in mesh.vertices.iter_mut() {
            let (x, z) = (vertex.position.x, vertex.position.z);
            vertex.position.y = land_height(x, z);
            vertex.normal = land_normal(x, z);
        }
        let submeshes = std::collections::HashMap::from([(
            "land".to_string(),
            crate::geometry::Submesh {
                index_count: mesh.indices.len() as u32,
                start_index: 0,
                base_vertex: 0,
            },
        )]);
        geometries.add("land", Geometry::static_mesh(context.clone(), &mesh, submeshes))
    };

    // ornamental shapes share one concatenated buffer pair
    let (shapes_mesh, shape_submeshes) = concat_meshes([
        ("cube", MeshData::cube(1.0, 1.0, 1.0)),
        ("cylinder", MeshData::cylinder(1.0, 0.8, 1.0, 20, 3)),
        ("sphere", MeshData::sphere(1.0, 20, 14)),
        ("torus", MeshData::torus(1.0, 0.3, 24, 12)),
        ("cone", MeshData::cone(1.0, 1.0, 20)),
        ("pyramid", MeshData::pyramid(1.0, 1.0)),
        ("wedge", MeshData::wedge(1.0, 1.0, 1.0)),
        ("diamond", MeshData::diamond(1.0, 1.0)),
        ("prism", MeshData::triangular_prism(1.0, 1.0, 1.0)),
    ]);
    let shapes = geometries.add(
        "shapes",
        Geometry::static_mesh(context.clone(), &shapes_mesh, shape_submeshes),
    );

    // the wave surface owns only indices; vertices live per frame resource
    let water = geometries.add(
        "water",
        Geometry::frame_owned(
            context.clone(),
            "surface",
            waves.vertex_count(),
            &MeshData::grid_indices(waves.row_count(), waves.column_count()),
        ),
    );

    // tree billboards on the outer rim
    let trees = {
        let mut points = Vec::new();
        for i in 0..16 {
            let angle = std::f32::consts::TAU * i as f32 / 16.0;
            let radius = 62.0 + 4.0 * ((i * 7) % 5) as f32;
            let (x, z) = (radius * angle.cos(), radius * angle.sin());
            points.push(SpriteVertex {
                position: Vec3::new(x, land_height(x, z) + 7.0, z),
                size: Vec2::new(14.0, 14.0),
            });
        }
        geometries.add("trees", Geometry::sprite_points(context.clone(), "points", &points))
    };

    // --- render items ---

    let shape = |name: &str| geometries.get(shapes).submesh(name);

    let land_submesh = geometries.get(land_geometry).submesh("land");
    scene.add_item(
        RenderLayer::Opaque,
        Mat4::identity(),
        uv_scale(8.0, 8.0),
        grass,
        land_geometry,
        land_submesh,
    );

    let water_submesh = geometries.get(water).submesh("surface");
    scene.add_item(
        RenderLayer::Transparent,
        Mat4::from_translation(Vec3::new(0.0, WATER_LEVEL, 0.0)),
        uv_scale(5.0, 5.0),
        water_material,
        water,
        water_submesh,
    );

    // labyrinth walls
    let cube = shape("cube");
    for (row, col) in wall_cells(MAZE_PLAN) {
        let center = cell_center(MAZE_PLAN, row, col);
        scene.add_item(
            RenderLayer::Opaque,
            translation_scale(
                Vec3::new(center.x, WALL_HEIGHT * 0.5, center.y),
                Vec3::new(MAZE_CELL, WALL_HEIGHT, MAZE_CELL),
            ),
            uv_scale(1.0, 1.5),
            bricks,
            shapes,
            cube,
        );
    }

    // central building
    scene.add_item(
        RenderLayer::AlphaTested,
        translation_scale(Vec3::new(0.0, 5.0, 0.0), Vec3::new(9.0, 10.0, 9.0)),
        uv_scale(2.0, 2.0),
        rosy_bricks,
        shapes,
        cube,
    );
    scene.add_item(
        RenderLayer::Opaque,
        translation_scale(Vec3::new(0.0, 12.0, 0.0), Vec3::new(10.0, 4.0, 10.0)),
        Mat4::identity(),
        stone,
        shapes,
        shape("pyramid"),
    );

    // sculpture stack in the north courtyard
    let sculpture_base = Vec3::new(0.0, 0.0, -15.0);
    scene.add_item(
        RenderLayer::Opaque,
        translation_scale(sculpture_base + Vec3::new(0.0, 1.0, 0.0), Vec3::new(2.0, 2.0, 2.0)),
        Mat4::identity(),
        tile,
        shapes,
        shape("cylinder"),
    );
    scene.add_item(
        RenderLayer::Opaque,
        translation_scale(sculpture_base + Vec3::new(0.0, 2.4, 0.0), Vec3::new(1.6, 1.6, 1.6)),
        Mat4::identity(),
        stone,
        shapes,
        shape("torus"),
    );
    scene.add_item(
        RenderLayer::Opaque,
        translation_scale(sculpture_base + Vec3::new(0.0, 3.5, 0.0), Vec3::new(1.4, 2.0, 1.4)),
        Mat4::identity(),
        stone,
        shapes,
        shape("cone"),
    );
    scene.add_item(
        RenderLayer::Opaque,
        translation_scale(sculpture_base + Vec3::new(0.0, 6.0, 0.0), Vec3::new(0.8, 1.4, 0.8)),
        Mat4::identity(),
        tile,
        shapes,
        shape("diamond"),
    );

    // column pairs flanking the south entrance
    for side in [-1.0f32, 1.0] {
        for depth in 0..3 {
            let position = Vec3::new(side * 6.0, 0.0, 24.0 + 4.0 * depth as f32);
            scene.add_item(
                RenderLayer::Opaque,
                translation_scale(
                    position + Vec3::new(0.0, 3.0, 0.0),
                    Vec3::new(1.0, 6.0, 1.0),
                ),
                uv_scale(1.0, 2.0),
                stone,
                shapes,
                shape("cylinder"),
            );
            scene.add_item(
                RenderLayer::Opaque,
                translation_scale(
                    position + Vec3::new(0.0, 7.0, 0.0),
                    Vec3::new(1.2, 1.2, 1.2),
                ),
                Mat4::identity(),
                tile,
                shapes,
                shape("sphere"),
            );
        }
    }

    // corner ornaments
    for (sx, sz) in [(-1.0f32, -1.0f32), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
        let corner = Vec3::new(sx * 30.0, 0.0, sz * 30.0);
        scene.add_item(
            RenderLayer::Opaque,
            translation_scale(corner + Vec3::new(0.0, 1.0, 0.0), Vec3::new(3.0, 2.0, 3.0)),
            Mat4::identity(),
            stone,
            shapes,
            shape("wedge"),
        );
        scene.add_item(
            RenderLayer::Opaque,
            translation_scale(corner + Vec3::new(0.0, 3.0, 0.0), Vec3::new(2.0, 2.0, 2.0)),
            Mat4::identity(),
            tile,
            shapes,
            shape("prism"),
        );
    }

    // tree billboards
    let tree_points = geometries.get(trees).submesh("points");
    scene.add_item(
        RenderLayer::AlphaTestedSprites,
        Mat4::identity(),
        Mat4::identity(),
        tree_sprites,
        trees,
        tree_points,
    );

    log::info!(
        "Scene built: {} render items, {} materials",
        scene.object_count(),
        scene.material_count()
    );

    BuiltScene {
        scene,
        geometries,
        water_material,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maze_plan_is_rectangular_and_symmetric() {
        let cols = MAZE_PLAN[0].len();
        assert!(MAZE_PLAN.iter().all(|line| line.len() == cols));

        // the plan mirrors left-right, so wall cells must too
        let walls = wall_cells(MAZE_PLAN);
        for &(row, col) in walls.iter() {
            assert!(walls.contains(&(row, cols - 1 - col)));
        }
    }

    #[test]
    fn wall_cells_only_reports_walls() {
        let cells = wall_cells(&["#.#", "...", ".#."]);
        assert_eq!(cells, vec![(0, 0), (0, 2), (2, 1)]);
    }

    #[test]
    fn cell_centers_are_symmetric_around_the_origin() {
        let plan = MAZE_PLAN;
        let rows = plan.len();
        let cols = plan[0].len();
        let a = cell_center(plan, 0, 0);
        let b = cell_center(plan, rows - 1, cols - 1);
        assert!((a.x + b.x).abs() < 1e-4);
        assert!((a.y + b.y).abs() < 1e-4);
    }

    #[test]
    fn plateau_is_flat_and_the_moat_dips_below_the_water() {
        assert_eq!(land_height(0.0, 0.0), 0.0);
        assert_eq!(land_height(20.0, -30.0), 0.0);
        assert!(land_height(48.0, 0.0) < WATER_LEVEL);
        // outer rim climbs back out of the water
        assert!(land_height(75.0, 0.0) > 0.0);
    }

    #[test]
    fn land_normals_are_unit_length_and_upward() {
        for (x, z) in [(0.0, 0.0), (40.0, 10.0), (-60.0, 55.0), (70.0, -70.0)] {
            let normal = land_normal(x, z);
            assert!((normal.mag() - 1.0).abs() < 1e-4);
            assert!(normal.y > 0.0);
        }
    }
}
