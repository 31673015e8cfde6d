use bytemuck::{Pod, Zeroable};
use ultraviolet::{Mat4, Vec2, Vec3, Vec4};

/// GPU-side structs. Layouts mirror the std140 uniform blocks in
/// `assets/shaders/`, with explicit padding where std140 inserts it.
/// Matrices are column-major, which is what GLSL expects by default.

pub const MAX_LIGHTS: usize = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub _pad0: f32,
    pub strength: Vec3,
    pub _pad1: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, 0.0),
            _pad0: 0.0,
            strength: Vec3::zero(),
            _pad1: 0.0,
        }
    }
}

/// Scene-global data, rebuilt from camera and timer every frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub eye_position: Vec3,
    pub _pad0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub fog_color: Vec4,
    pub fog_start: f32,
    pub fog_range: f32,
    pub _pad1: [f32; 2],
    pub lights: [DirectionalLight; MAX_LIGHTS],
}

/// Per render item: one slot in each frame resource's object buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub tex_transform: Mat4,
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: Mat4::identity(),
            tex_transform: Mat4::identity(),
        }
    }
}

/// Per material: one slot in each frame resource's material buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub mat_transform: Mat4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset_of;

    // std140 requires these exact sizes; a drifted field would silently
    // shear every uniform read after it.
    #[test]
    fn struct_sizes_match_std140_blocks() {
        assert_eq!(std::mem::size_of::<DirectionalLight>(), 32);
        assert_eq!(std::mem::size_of::<PassConstants>(), 576);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 128);
        assert_eq!(std::mem::size_of::<MaterialConstants>(), 96);
    }

    #[test]
    fn lights_start_right_after_the_fog_block() {
        assert_eq!(offset_of!(PassConstants, ambient_light), 432);
        assert_eq!(offset_of!(PassConstants, fog_color), 448);
        assert_eq!(offset_of!(PassConstants, lights), 480);
    }
}
