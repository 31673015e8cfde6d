pub mod pipelines;
pub mod shader_types;

use std::sync::Arc;

use ash::vk;
use ultraviolet::Vec2;

use crate::frame::{FrameResource, FRAMES_IN_FLIGHT};
use crate::geometry::{GeometryStore, Vertex};
use crate::render::pipelines::{DescriptorLayouts, Pipelines};
use crate::render::shader_types::PassConstants;
use crate::scene::{RenderLayer, Scene};
use crate::vulkan::buffer::find_memorytype_index;
use crate::vulkan::context::Context;
use crate::vulkan::swapchain::SwapchainContainer;
use crate::vulkan::texture::{TextureStore, TEXTURE_COUNT, TEXTURE_TREE_ARRAY};
use crate::waves::Waves;

const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
const CLEAR_COLOR: [f32; 4] = [0.69, 0.77, 0.87, 1.0];

struct DepthBuffer {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl DepthBuffer {
    fn new(context: &Context, extent: vk::Extent2D) -> Self {
        let device = &context.device;

        let image = {
            let create_info = vk::ImageCreateInfo::builder()
                .image_type(vk::ImageType::TYPE_2D)
                .format(DEPTH_FORMAT)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            unsafe { device.create_image(&create_info, None) }
                .expect("Could not create depth image")
        };

        let memory = {
            let requirements = unsafe { device.get_image_memory_requirements(image) };
            let memorytype_index = find_memorytype_index(
                &requirements,
                &context.device_memory_properties,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .expect("Could not find memorytype for depth image");

            let allocate_info = vk::MemoryAllocateInfo::builder()
                .allocation_size(requirements.size)
                .memory_type_index(memorytype_index);

            unsafe { device.allocate_memory(&allocate_info, None) }
                .expect("Could not allocate memory for depth image")
        };
        unsafe { device.bind_image_memory(image, memory, 0) }
            .expect("Could not bind depth image memory");

        let view = {
            let create_info = vk::ImageViewCreateInfo::builder()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(DEPTH_FORMAT)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(image);

            unsafe { device.create_image_view(&create_info, None) }
                .expect("Could not create depth image view")
        };

        Self {
            image,
            memory,
            view,
        }
    }

    fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_image_view(self.view, None) };
        unsafe { device.destroy_image(self.image, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}

/// Owns the render pass, depth buffer, framebuffers, layer pipelines and
/// texture descriptor sets; updates frame resources and records draws.
pub struct SceneRenderer {
    render_pass: vk::RenderPass,
    depth_buffer: DepthBuffer,
    framebuffers: Vec<vk::Framebuffer>,

    pipelines: Pipelines,
    layouts: DescriptorLayouts,
    descriptor_pool: vk::DescriptorPool,
    texture_sets: Vec<vk::DescriptorSet>,

    context: Arc<Context>,
}

impl SceneRenderer {
    pub fn new(
        context: Arc<Context>,
        swapchain: &SwapchainContainer,
        textures: &TextureStore,
    ) -> Self {
        let device = &context.device;

        let render_pass = create_render_pass(device, swapchain.format);

        let depth_buffer = DepthBuffer::new(&context, swapchain.extent);
        let framebuffers =
            create_framebuffers(device, render_pass, swapchain, depth_buffer.view);

        let layouts = DescriptorLayouts::new(context.clone());
        let pipelines = Pipelines::new(context.clone(), render_pass, &layouts);

        let descriptor_pool = {
            let pool_sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: FRAMES_IN_FLIGHT as u32,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    descriptor_count: 2 * FRAMES_IN_FLIGHT as u32,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: TEXTURE_COUNT as u32,
                },
            ];

            let create_info = vk::DescriptorPoolCreateInfo::builder()
                .max_sets((3 * FRAMES_IN_FLIGHT + TEXTURE_COUNT) as u32)
                .pool_sizes(&pool_sizes);

            unsafe { device.create_descriptor_pool(&create_info, None) }
                .expect("Could not create descriptor pool")
        };

        let texture_sets = (0..TEXTURE_COUNT)
            .map(|slot| {
                let layout = if slot == TEXTURE_TREE_ARRAY {
                    layouts.texture_array
                } else {
                    layouts.texture
                };
                let allocate_info = vk::DescriptorSetAllocateInfo::builder()
                    .descriptor_pool(descriptor_pool)
                    .set_layouts(std::slice::from_ref(&layout));
                let set = unsafe { device.allocate_descriptor_sets(&allocate_info) }
                    .expect("Could not allocate texture descriptor set")[0];

                let image_info = vk::DescriptorImageInfo {
                    sampler: textures.sampler,
                    image_view: textures.view(slot),
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&image_info));
                unsafe { device.update_descriptor_sets(std::slice::from_ref(&write), &[]) };

                set
            })
            .collect();

        Self {
            render_pass,
            depth_buffer,
            framebuffers,
            pipelines,
            layouts,
            descriptor_pool,
            texture_sets,
            context,
        }
    }

    pub fn descriptor_pool(&self) -> vk::DescriptorPool {
        self.descriptor_pool
    }

    pub fn layouts(&self) -> &DescriptorLayouts {
        &self.layouts
    }

    pub fn resize(&mut self, swapchain: &SwapchainContainer) {
        let device = &self.context.device;

        for &framebuffer in self.framebuffers.iter() {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
        self.depth_buffer.destroy(device);

        self.depth_buffer = DepthBuffer::new(&self.context, swapchain.extent);
        self.framebuffers =
            create_framebuffers(device, self.render_pass, swapchain, self.depth_buffer.view);
    }

    /// Writes everything the GPU will read for this frame into the acquired
    /// frame resource: pass constants, the dirty object/material sweeps, and
    /// a full rewrite of the wave surface's vertices.
    pub fn update_frame(
        &self,
        frame: &mut FrameResource,
        scene: &mut Scene,
        waves: &Waves,
        pass: &PassConstants,
    ) {
        frame.pass_constants.write(0, pass);

        for (slot, constants) in scene.dirty_object_updates() {
            frame.object_constants.write(slot, &constants);
        }
        for (slot, constants) in scene.dirty_material_updates() {
            frame.material_constants.write(slot, &constants);
        }

        // UVs are a linear remap of the grid's world extent to [0,1]
        let (width, depth) = (waves.width(), waves.depth());
        for i in 0..waves.vertex_count() {
            let position = waves.position(i);
            frame.wave_vertices.write(
                i,
                &Vertex {
                    position,
                    normal: waves.normal(i),
                    uv: Vec2::new(0.5 + position.x / width, 0.5 - position.z / depth),
                },
            );
        }
    }

    /// Records the whole frame: one render pass, layers in fixed draw order,
    /// one indexed draw per render item.
    pub fn draw(
        &self,
        frame: &FrameResource,
        scene: &Scene,
        geometries: &GeometryStore,
        swapchain: &SwapchainContainer,
        image_index: usize,
        viewport: vk::Viewport,
    ) {
        let device = &self.context.device;
        let command_buffer = frame.command_buffer;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            )
        };

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: swapchain.extent,
        };
        unsafe { device.cmd_set_viewport(command_buffer, 0, std::slice::from_ref(&viewport)) };
        unsafe { device.cmd_set_scissor(command_buffer, 0, std::slice::from_ref(&scissor)) };

        for layer in RenderLayer::DRAW_ORDER {
            self.draw_layer(frame, scene, geometries, layer);
        }

        unsafe { device.cmd_end_render_pass(command_buffer) };
    }

    fn draw_layer(
        &self,
        frame: &FrameResource,
        scene: &Scene,
        geometries: &GeometryStore,
        layer: RenderLayer,
    ) {
        let mut items = scene.items_in_layer(layer).peekable();
        if items.peek().is_none() {
            return;
        }

        let device = &self.context.device;
        let command_buffer = frame.command_buffer;
        let layout = self.pipelines.layout_for(layer);

        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipelines.get(layer),
            )
        };
        unsafe {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                std::slice::from_ref(&frame.pass_set),
                &[],
            )
        };

        for item in items {
            let geometry = geometries.get(item.geometry);

            // frame-owned geometry reads the current frame's dynamic buffer
            let vertex_buffer = geometry
                .vertex_buffer()
                .unwrap_or_else(|| frame.wave_vertices.buffer());

            unsafe {
                device.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    std::slice::from_ref(&vertex_buffer),
                    &[0],
                )
            };
            unsafe {
                device.cmd_bind_index_buffer(
                    command_buffer,
                    geometry.index_buffer(),
                    0,
                    vk::IndexType::UINT32,
                )
            };

            let material = scene.material(item.material);
            let object_sets = [frame.object_set, frame.material_set];
            let dynamic_offsets = [
                frame.object_constants.slot_offset(item.object_slot) as u32,
                frame
                    .material_constants
                    .slot_offset(material.constant_slot) as u32,
            ];
            unsafe {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    1,
                    &object_sets,
                    &dynamic_offsets,
                )
            };
            unsafe {
                device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    3,
                    std::slice::from_ref(&self.texture_sets[material.texture_slot]),
                    &[],
                )
            };

            unsafe {
                device.cmd_draw_indexed(
                    command_buffer,
                    item.submesh.index_count,
                    1,
                    item.submesh.start_index,
                    item.submesh.base_vertex,
                    0,
                )
            };
        }
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        let device = &self.context.device;
        for &framebuffer in self.framebuffers.iter() {
            unsafe { device.destroy_framebuffer(framebuffer, None) };
        }
        self.depth_buffer.destroy(device);
        unsafe { device.destroy_descriptor_pool(self.descriptor_pool, None) };
        unsafe { device.destroy_render_pass(self.render_pass, None) };
    }
}

fn create_render_pass(device: &ash::Device, color_format: vk::Format) -> vk::RenderPass {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..vk::AttachmentDescription::default()
        },
        vk::AttachmentDescription {
            format: DEPTH_FORMAT,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..vk::AttachmentDescription::default()
        },
    ];

    let color_reference = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_reference = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_reference))
        .depth_stencil_attachment(&depth_reference);

    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    };

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    unsafe { device.create_render_pass(&create_info, None) }
        .expect("Could not create render pass")
}

fn create_framebuffers(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    swapchain: &SwapchainContainer,
    depth_view: vk::ImageView,
) -> Vec<vk::Framebuffer> {
    swapchain
        .imageviews
        .iter()
        .map(|&imageview| {
            let attachments = [imageview, depth_view];
            let create_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(swapchain.extent.width)
                .height(swapchain.extent.height)
                .layers(1);

            unsafe { device.create_framebuffer(&create_info, None) }
                .expect("Could not create framebuffer")
        })
        .collect()
}
