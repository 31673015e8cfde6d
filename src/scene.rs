use std::collections::HashMap;

use ultraviolet::{Mat4, Vec3, Vec4};

use crate::frame::FRAMES_IN_FLIGHT;
use crate::geometry::{GeometryHandle, Submesh};
use crate::render::shader_types::{MaterialConstants, ObjectConstants};

/// Draw-ordering partition. Submission always walks `DRAW_ORDER`, never
/// registration order across layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Opaque,
    AlphaTested,
    AlphaTestedSprites,
    Transparent,
}

impl RenderLayer {
    pub const DRAW_ORDER: [RenderLayer; 4] = [
        RenderLayer::Opaque,
        RenderLayer::AlphaTested,
        RenderLayer::AlphaTestedSprites,
        RenderLayer::Transparent,
    ];

    fn index(self) -> usize {
        match self {
            RenderLayer::Opaque => 0,
            RenderLayer::AlphaTested => 1,
            RenderLayer::AlphaTestedSprites => 2,
            RenderLayer::Transparent => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderItemHandle(usize);

/// Shading parameters shared by any number of render items. `dirty_frames`
/// counts how many frame-resource copies still hold stale constants.
pub struct Material {
    pub name: String,
    pub constant_slot: usize,
    pub texture_slot: usize,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    dirty_frames: u32,
}

impl Material {
    fn constants(&self) -> MaterialConstants {
        MaterialConstants {
            diffuse_albedo: self.diffuse_albedo,
            fresnel_r0: self.fresnel_r0,
            roughness: self.roughness,
            mat_transform: self.transform,
        }
    }
}

/// One drawable instance: transforms plus handles into the registries and
/// the submesh addressing one indexed draw.
pub struct RenderItem {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub object_slot: usize,
    pub material: MaterialHandle,
    pub geometry: GeometryHandle,
    pub submesh: Submesh,
    dirty_frames: u32,
}

impl RenderItem {
    fn constants(&self) -> ObjectConstants {
        ObjectConstants {
            world: self.world,
            tex_transform: self.tex_transform,
        }
    }
}

/// Flat registries for render items and materials, plus the layer mapping.
/// Built once at startup, mutated only by the per-frame animation step.
#[derive(Default)]
pub struct Scene {
    items: Vec<RenderItem>,
    layers: [Vec<usize>; RenderLayer::DRAW_ORDER.len()],
    materials: Vec<Material>,
    material_names: HashMap<String, MaterialHandle>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(
        &mut self,
        name: &str,
        texture_slot: usize,
        diffuse_albedo: Vec4,
        fresnel_r0: Vec3,
        roughness: f32,
    ) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len());
        let previous = self.material_names.insert(name.to_string(), handle);
        assert!(previous.is_none(), "duplicate material name: {}", name);

        self.materials.push(Material {
            name: name.to_string(),
            constant_slot: handle.0,
            texture_slot,
            diffuse_albedo,
            fresnel_r0,
            roughness,
            transform: Mat4::identity(),
            dirty_frames: FRAMES_IN_FLIGHT as u32,
        });
        handle
    }

    pub fn material_handle(&self, name: &str) -> MaterialHandle {
        *self
            .material_names
            .get(name)
            .unwrap_or_else(|| panic!("unknown material: {}", name))
    }

    pub fn material(&self, handle: MaterialHandle) -> &Material {
        &self.materials[handle.0]
    }

    pub fn add_item(
        &mut self,
        layer: RenderLayer,
        world: Mat4,
        tex_transform: Mat4,
        material: MaterialHandle,
        geometry: GeometryHandle,
        submesh: Submesh,
    ) -> RenderItemHandle {
        let handle = RenderItemHandle(self.items.len());
        self.items.push(RenderItem {
            world,
            tex_transform,
            object_slot: handle.0,
            material,
            geometry,
            submesh,
            dirty_frames: FRAMES_IN_FLIGHT as u32,
        });
        self.layers[layer.index()].push(handle.0);
        handle
    }

    pub fn item(&self, handle: RenderItemHandle) -> &RenderItem {
        &self.items[handle.0]
    }

    /// Replaces the item's world transform. Restarts propagation so every
    /// frame resource observes the new value.
    pub fn set_world(&mut self, handle: RenderItemHandle, world: Mat4) {
        let item = &mut self.items[handle.0];
        item.world = world;
        item.dirty_frames = FRAMES_IN_FLIGHT as u32;
    }

    /// Replaces a material's UV transform (the water scroll animation).
    pub fn set_material_transform(&mut self, handle: MaterialHandle, transform: Mat4) {
        let material = &mut self.materials[handle.0];
        material.transform = transform;
        material.dirty_frames = FRAMES_IN_FLIGHT as u32;
    }

    pub fn object_count(&self) -> usize {
        self.items.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn items_in_layer(&self, layer: RenderLayer) -> impl Iterator<Item = &RenderItem> {
        self.layers[layer.index()].iter().map(|&i| &self.items[i])
    }

    /// One propagation step: recomputes constants for every item whose
    /// counter is still positive and decrements it. The caller writes the
    /// returned (slot, constants) pairs into the current frame resource.
    pub fn dirty_object_updates(&mut self) -> Vec<(usize, ObjectConstants)> {
        self.items
            .iter_mut()
            .filter(|item| item.dirty_frames > 0)
            .map(|item| {
                item.dirty_frames -= 1;
                (item.object_slot, item.constants())
            })
            .collect()
    }

    pub fn dirty_material_updates(&mut self) -> Vec<(usize, MaterialConstants)> {
        self.materials
            .iter_mut()
            .filter(|material| material.dirty_frames > 0)
            .map(|material| {
                material.dirty_frames -= 1;
                (material.constant_slot, material.constants())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Submesh;

    fn test_submesh() -> Submesh {
        Submesh {
            index_count: 36,
            start_index: 0,
            base_vertex: 0,
        }
    }

    fn test_scene_with_one_item() -> (Scene, RenderItemHandle, MaterialHandle) {
        let mut scene = Scene::new();
        let material = scene.add_material(
            "stone",
            1,
            Vec4::one(),
            Vec3::new(0.05, 0.05, 0.05),
            0.3,
        );
        let item = scene.add_item(
            RenderLayer::Opaque,
            Mat4::identity(),
            Mat4::identity(),
            material,
            crate::geometry::GeometryHandle::default_for_tests(),
            test_submesh(),
        );
        (scene, item, material)
    }

    #[test]
    fn fresh_entries_propagate_to_every_frame_copy_then_go_quiet() {
        let (mut scene, item, _) = test_scene_with_one_item();

        for _ in 0..FRAMES_IN_FLIGHT {
            let updates = scene.dirty_object_updates();
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].0, scene.item(item).object_slot);
        }
        assert!(scene.dirty_object_updates().is_empty());

        for _ in 0..FRAMES_IN_FLIGHT {
            assert_eq!(scene.dirty_material_updates().len(), 1);
        }
        assert!(scene.dirty_material_updates().is_empty());
    }

    #[test]
    fn mutation_restarts_propagation() {
        let (mut scene, item, _) = test_scene_with_one_item();
        for _ in 0..FRAMES_IN_FLIGHT {
            scene.dirty_object_updates();
        }

        let moved = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        scene.set_world(item, moved);

        let mut passes = 0;
        loop {
            let updates = scene.dirty_object_updates();
            if updates.is_empty() {
                break;
            }
            passes += 1;
            assert_eq!(updates[0].1.world.cols[3].x, 1.0);
        }
        assert_eq!(passes, FRAMES_IN_FLIGHT);
    }

    #[test]
    fn re_mutation_mid_propagation_never_leaves_a_stale_copy() {
        let (mut scene, item, _) = test_scene_with_one_item();
        for _ in 0..FRAMES_IN_FLIGHT {
            scene.dirty_object_updates();
        }

        scene.set_world(item, Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        scene.dirty_object_updates();

        // supersede the half-propagated value
        let latest = Mat4::from_translation(Vec3::new(9.0, 0.0, 0.0));
        scene.set_world(item, latest);

        let mut passes = 0;
        loop {
            let updates = scene.dirty_object_updates();
            if updates.is_empty() {
                break;
            }
            passes += 1;
            // every remaining write carries the latest mutation
            assert_eq!(updates[0].1.world.cols[3].x, 9.0);
        }
        // a full round of passes, so all frame copies got the latest value
        assert_eq!(passes, FRAMES_IN_FLIGHT);
    }

    #[test]
    fn material_scroll_resets_its_own_counter_not_the_items() {
        let (mut scene, _, material) = test_scene_with_one_item();
        for _ in 0..FRAMES_IN_FLIGHT {
            scene.dirty_object_updates();
            scene.dirty_material_updates();
        }

        scene.set_material_transform(material, Mat4::from_translation(Vec3::new(0.1, 0.0, 0.0)));

        assert!(scene.dirty_object_updates().is_empty());
        assert_eq!(scene.dirty_material_updates().len(), 1);
    }

    #[test]
    fn layers_come_back_in_draw_order_regardless_of_registration_order() {
        let mut scene = Scene::new();
        let material = scene.add_material(
            "stone",
            1,
            Vec4::one(),
            Vec3::new(0.05, 0.05, 0.05),
            0.3,
        );
        let geometry = crate::geometry::GeometryHandle::default_for_tests();

        // scrambled registration order
        let layers = [
            RenderLayer::Transparent,
            RenderLayer::Opaque,
            RenderLayer::AlphaTestedSprites,
            RenderLayer::AlphaTested,
            RenderLayer::Opaque,
        ];
        for layer in layers {
            scene.add_item(
                layer,
                Mat4::identity(),
                Mat4::identity(),
                material,
                geometry,
                test_submesh(),
            );
        }

        let visited: Vec<usize> = RenderLayer::DRAW_ORDER
            .iter()
            .flat_map(|&layer| scene.items_in_layer(layer).map(|item| item.object_slot))
            .collect();

        // opaque (registration order 1, 4), alpha tested (3), sprites (2),
        // transparent (0)
        assert_eq!(visited, vec![1, 4, 3, 2, 0]);
    }
}
