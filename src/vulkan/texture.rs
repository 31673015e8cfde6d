use std::sync::Arc;

use ash::vk;

use crate::vulkan::buffer::find_memorytype_index;
use crate::vulkan::context::Context;

/// Shader-visible texture slots, in build order. Material texture indices
/// point into this table, so the order here is load-bearing.
pub const TEXTURE_BRICKS: usize = 0;
pub const TEXTURE_STONE: usize = 1;
pub const TEXTURE_TILE: usize = 2;
pub const TEXTURE_GRASS: usize = 3;
pub const TEXTURE_WATER: usize = 4;
pub const TEXTURE_ROSY_BRICKS: usize = 5;
pub const TEXTURE_TREE_ARRAY: usize = 6;
pub const TEXTURE_COUNT: usize = 7;

pub const TREE_ARRAY_LAYERS: u32 = 3;

const TEXTURE_SIZE: u32 = 64;

struct Texture {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

/// Owns the seven textures the scene samples plus the shared sampler.
/// Pixels are generated procedurally, so the binary needs no image assets.
pub struct TextureStore {
    textures: Vec<Texture>,
    pub sampler: vk::Sampler,
    context: Arc<Context>,
}

impl TextureStore {
    pub fn new(context: Arc<Context>) -> Self {
        let builders: [(&str, fn(u32, u32, u32) -> [u8; 4], u32); TEXTURE_COUNT] = [
            ("bricks", bricks_pixel, 1),
            ("stone", stone_pixel, 1),
            ("tile", tile_pixel, 1),
            ("grass", grass_pixel, 1),
            ("water", water_pixel, 1),
            ("rosy bricks", rosy_bricks_pixel, 1),
            ("trees", tree_pixel, TREE_ARRAY_LAYERS),
        ];

        let textures = builders
            .iter()
            .map(|&(name, pixel, layers)| {
                log::debug!("Generating texture '{}' ({} layer(s))", name, layers);
                let pixels = generate_pixels(pixel, layers);
                upload_texture(&context, &pixels, layers)
            })
            .collect();

        let sampler = {
            let create_info = vk::SamplerCreateInfo::builder()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .anisotropy_enable(true)
                .max_anisotropy(8.0)
                .max_lod(vk::LOD_CLAMP_NONE);

            unsafe { context.device.create_sampler(&create_info, None) }
                .expect("Could not create sampler")
        };

        Self {
            textures,
            sampler,
            context,
        }
    }

    pub fn view(&self, slot: usize) -> vk::ImageView {
        self.textures[slot].view
    }
}

impl Drop for TextureStore {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_sampler(self.sampler, None) };
        for texture in self.textures.iter() {
            unsafe { device.destroy_image_view(texture.view, None) };
            unsafe { device.destroy_image(texture.image, None) };
            unsafe { device.free_memory(texture.memory, None) };
        }
    }
}

fn generate_pixels(pixel: fn(u32, u32, u32) -> [u8; 4], layers: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((TEXTURE_SIZE * TEXTURE_SIZE * layers * 4) as usize);
    for layer in 0..layers {
        for y in 0..TEXTURE_SIZE {
            for x in 0..TEXTURE_SIZE {
                pixels.extend_from_slice(&pixel(x, y, layer));
            }
        }
    }
    pixels
}

fn upload_texture(context: &Arc<Context>, pixels: &[u8], layers: u32) -> Texture {
    let device = &context.device;
    let format = vk::Format::R8G8B8A8_SRGB;

    let image = {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: TEXTURE_SIZE,
                height: TEXTURE_SIZE,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe { device.create_image(&create_info, None) }.expect("Could not create texture image")
    };

    let memory = {
        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memorytype_index = find_memorytype_index(
            &requirements,
            &context.device_memory_properties,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .expect("Could not find memorytype for texture image");

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memorytype_index);

        unsafe { device.allocate_memory(&allocate_info, None) }
            .expect("Could not allocate memory for texture image")
    };
    unsafe { device.bind_image_memory(image, memory, 0) }
        .expect("Could not bind texture image memory");

    // staging buffer with the raw pixels
    let (staging_buffer, staging_memory) = {
        let create_info = vk::BufferCreateInfo::builder()
            .size(pixels.len() as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None) }
            .expect("Could not create staging buffer");

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memorytype_index = find_memorytype_index(
            &requirements,
            &context.device_memory_properties,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .expect("Could not find memorytype for staging buffer");

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memorytype_index);

        let buffer_memory = unsafe { device.allocate_memory(&allocate_info, None) }
            .expect("Could not allocate memory for staging buffer");
        unsafe { device.bind_buffer_memory(buffer, buffer_memory, 0) }
            .expect("Could not bind staging buffer memory");

        let ptr = unsafe {
            device.map_memory(
                buffer_memory,
                0,
                pixels.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
        }
        .expect("Could not map staging buffer memory") as *mut u8;
        unsafe { std::ptr::copy_nonoverlapping(pixels.as_ptr(), ptr, pixels.len()) };
        unsafe { device.unmap_memory(buffer_memory) };

        (buffer, buffer_memory)
    };

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: layers,
    };

    context.one_time_submit(|device, command_buffer| {
        let to_transfer = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&to_transfer),
            )
        };

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: layers,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: TEXTURE_SIZE,
                height: TEXTURE_SIZE,
                depth: 1,
            },
        };

        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                staging_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            )
        };

        let to_sampled = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&to_sampled),
            )
        };
    });

    unsafe { device.destroy_buffer(staging_buffer, None) };
    unsafe { device.free_memory(staging_memory, None) };

    let view = {
        let view_type = if layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let create_info = vk::ImageViewCreateInfo::builder()
            .view_type(view_type)
            .format(format)
            .subresource_range(subresource_range)
            .image(image);

        unsafe { device.create_image_view(&create_info, None) }
            .expect("Could not create texture image view")
    };

    Texture {
        image,
        memory,
        view,
    }
}

// deterministic integer hash for the noise-based patterns
fn hash(mut v: u32) -> u32 {
    v ^= v >> 16;
    v = v.wrapping_mul(0x7feb_352d);
    v ^= v >> 15;
    v = v.wrapping_mul(0x846c_a68b);
    v ^ (v >> 16)
}

fn noise(x: u32, y: u32, seed: u32) -> f32 {
    (hash(x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263) ^ seed) & 0xff) as f32 / 255.0
}

fn brick_pattern(x: u32, y: u32, base: [u8; 3], mortar: [u8; 3]) -> [u8; 4] {
    let row = y / 16;
    let offset = if row % 2 == 0 { 0 } else { 16 };
    let in_mortar = y % 16 < 2 || (x + offset) % 32 < 2;
    let [r, g, b] = if in_mortar { mortar } else { base };
    let shade = 0.85 + 0.15 * noise(x, y, 7);
    [
        (r as f32 * shade) as u8,
        (g as f32 * shade) as u8,
        (b as f32 * shade) as u8,
        255,
    ]
}

fn bricks_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    brick_pattern(x, y, [156, 74, 60], [180, 170, 160])
}

fn rosy_bricks_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    brick_pattern(x, y, [188, 104, 110], [200, 186, 180])
}

fn stone_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    let n = noise(x / 4, y / 4, 13) * 0.5 + noise(x, y, 29) * 0.5;
    let v = (120.0 + 60.0 * n) as u8;
    [v, v, v, 255]
}

fn tile_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    let edge = x % 32 < 2 || y % 32 < 2;
    if edge {
        [90, 90, 100, 255]
    } else {
        let checker = (x / 32 + y / 32) % 2 == 0;
        let base = if checker { 190 } else { 165 };
        let v = base + (noise(x, y, 43) * 20.0) as u8;
        [v, v, v + 10, 255]
    }
}

fn grass_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    let n = noise(x, y, 57);
    [
        (40.0 + 40.0 * n) as u8,
        (120.0 + 70.0 * n) as u8,
        (30.0 + 30.0 * n) as u8,
        255,
    ]
}

fn water_pixel(x: u32, y: u32, _layer: u32) -> [u8; 4] {
    let ripple = ((x as f32 * 0.3).sin() + (y as f32 * 0.25).cos()) * 0.25 + 0.5;
    [
        (30.0 + 30.0 * ripple) as u8,
        (90.0 + 50.0 * ripple) as u8,
        (160.0 + 60.0 * ripple) as u8,
        255,
    ]
}

/// Tree silhouette with transparent background; each array layer varies the
/// canopy slightly so neighboring billboards do not look cloned.
fn tree_pixel(x: u32, y: u32, layer: u32) -> [u8; 4] {
    let size = TEXTURE_SIZE as f32;
    let fx = x as f32 / size - 0.5;
    let fy = y as f32 / size;

    let trunk = fx.abs() < 0.04 && fy > 0.55 && fy < 0.97;
    if trunk {
        return [92, 64, 40, 255];
    }

    // cone-shaped canopy, widened per layer
    let width = 0.30 + 0.05 * layer as f32;
    let canopy = fy > 0.08 && fy < 0.65 && fx.abs() < width * (fy - 0.05) / 0.6;
    if canopy {
        let n = noise(x, y, 71 + layer);
        return [
            (20.0 + 30.0 * n) as u8,
            (90.0 + 60.0 * n) as u8,
            (25.0 + 30.0 * n) as u8,
            255,
        ];
    }

    [0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_deterministic() {
        let a = generate_pixels(bricks_pixel, 1);
        let b = generate_pixels(bricks_pixel, 1);
        assert_eq!(a, b);
        assert_eq!(a.len(), (TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize);
    }

    #[test]
    fn tree_layers_differ_and_have_transparent_background() {
        let pixels = generate_pixels(tree_pixel, TREE_ARRAY_LAYERS);
        let layer_size = (TEXTURE_SIZE * TEXTURE_SIZE * 4) as usize;
        assert_eq!(pixels.len(), layer_size * TREE_ARRAY_LAYERS as usize);
        assert_ne!(pixels[..layer_size], pixels[layer_size..2 * layer_size]);
        // corner pixel is background
        assert_eq!(pixels[3], 0);
    }

    #[test]
    fn opaque_textures_have_full_alpha() {
        for pixel in [
            bricks_pixel,
            stone_pixel,
            tile_pixel,
            grass_pixel,
            water_pixel,
            rosy_bricks_pixel,
        ] {
            let pixels = generate_pixels(pixel, 1);
            assert!(pixels.chunks_exact(4).all(|px| px[3] == 255));
        }
    }
}
