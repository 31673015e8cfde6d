use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::geometry::{SpriteVertex, Vertex};
use crate::offset_of;
use crate::scene::RenderLayer;
use crate::vulkan::context::Context;

const SHADER_ENTRY: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
const SHADER_DIR: &str = "assets/shaders";

/// Set layouts shared by the pipelines and the frame resources:
/// set 0 pass, set 1 object (dynamic), set 2 material (dynamic),
/// set 3 texture (2D for meshes, array for the sprite layer).
pub struct DescriptorLayouts {
    pub pass: vk::DescriptorSetLayout,
    pub object: vk::DescriptorSetLayout,
    pub material: vk::DescriptorSetLayout,
    pub texture: vk::DescriptorSetLayout,
    pub texture_array: vk::DescriptorSetLayout,
    context: Arc<Context>,
}

impl DescriptorLayouts {
    pub fn new(context: Arc<Context>) -> Self {
        let uniform = |ty: vk::DescriptorType, stages: vk::ShaderStageFlags| {
            let binding = vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stages)
                .build();
            let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
                .bindings(std::slice::from_ref(&binding));

            unsafe { context.device.create_descriptor_set_layout(&create_info, None) }
                .expect("Could not create descriptor set layout")
        };

        let all_graphics = vk::ShaderStageFlags::VERTEX
            | vk::ShaderStageFlags::GEOMETRY
            | vk::ShaderStageFlags::FRAGMENT;

        // Every stage includes the shared uniform header, so the blocks are
        // visible (if not always read) from all three stages.
        Self {
            pass: uniform(vk::DescriptorType::UNIFORM_BUFFER, all_graphics),
            object: uniform(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, all_graphics),
            material: uniform(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, all_graphics),
            texture: uniform(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            ),
            texture_array: uniform(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            ),
            context,
        }
    }
}

impl Drop for DescriptorLayouts {
    fn drop(&mut self) {
        let device = &self.context.device;
        for layout in [
            self.pass,
            self.object,
            self.material,
            self.texture,
            self.texture_array,
        ] {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

fn load_shader_module(device: &ash::Device, name: &str) -> vk::ShaderModule {
    let path = Path::new(SHADER_DIR).join(name);
    let mut file = std::fs::File::open(&path)
        .unwrap_or_else(|e| panic!("Could not open shader {:?}: {}", path, e));
    let code = ash::util::read_spv(&mut file)
        .unwrap_or_else(|e| panic!("Could not read shader {:?}: {}", path, e));

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
    unsafe { device.create_shader_module(&create_info, None) }
        .expect("Could not create shader module")
}

struct LayerPipelineDesc {
    vertex_shader: &'static str,
    geometry_shader: Option<&'static str>,
    fragment_shader: &'static str,
    topology: vk::PrimitiveTopology,
    cull_mode: vk::CullModeFlags,
    blend_enabled: bool,
    depth_write: bool,
    sprite_input: bool,
}

fn layer_desc(layer: RenderLayer) -> LayerPipelineDesc {
    match layer {
        RenderLayer::Opaque => LayerPipelineDesc {
            vertex_shader: "scene.vert.spv",
            geometry_shader: None,
            fragment_shader: "scene.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            blend_enabled: false,
            depth_write: true,
            sprite_input: false,
        },
        // cutout pixels discard, and thin walls need both faces
        RenderLayer::AlphaTested => LayerPipelineDesc {
            vertex_shader: "scene.vert.spv",
            geometry_shader: None,
            fragment_shader: "cutout.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            blend_enabled: false,
            depth_write: true,
            sprite_input: false,
        },
        RenderLayer::AlphaTestedSprites => LayerPipelineDesc {
            vertex_shader: "sprite.vert.spv",
            geometry_shader: Some("sprite.geom.spv"),
            fragment_shader: "sprite.frag.spv",
            topology: vk::PrimitiveTopology::POINT_LIST,
            cull_mode: vk::CullModeFlags::NONE,
            blend_enabled: false,
            depth_write: true,
            sprite_input: true,
        },
        RenderLayer::Transparent => LayerPipelineDesc {
            vertex_shader: "scene.vert.spv",
            geometry_shader: None,
            fragment_shader: "scene.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            blend_enabled: true,
            depth_write: false,
            sprite_input: false,
        },
    }
}

/// The four layer pipelines plus the two pipeline layouts they share.
pub struct Pipelines {
    mesh_layout: vk::PipelineLayout,
    sprite_layout: vk::PipelineLayout,
    pipelines: [vk::Pipeline; RenderLayer::DRAW_ORDER.len()],
    context: Arc<Context>,
}

impl Pipelines {
    pub fn new(
        context: Arc<Context>,
        render_pass: vk::RenderPass,
        layouts: &DescriptorLayouts,
    ) -> Self {
        let device = &context.device;

        let mesh_layout = {
            let set_layouts = [layouts.pass, layouts.object, layouts.material, layouts.texture];
            let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
            unsafe { device.create_pipeline_layout(&create_info, None) }
                .expect("Could not create pipeline layout")
        };
        let sprite_layout = {
            let set_layouts = [
                layouts.pass,
                layouts.object,
                layouts.material,
                layouts.texture_array,
            ];
            let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
            unsafe { device.create_pipeline_layout(&create_info, None) }
                .expect("Could not create sprite pipeline layout")
        };

        let pipelines = RenderLayer::DRAW_ORDER.map(|layer| {
            let desc = layer_desc(layer);
            let layout = if desc.sprite_input {
                sprite_layout
            } else {
                mesh_layout
            };
            create_layer_pipeline(device, render_pass, layout, &desc)
        });

        Self {
            mesh_layout,
            sprite_layout,
            pipelines,
            context,
        }
    }

    pub fn get(&self, layer: RenderLayer) -> vk::Pipeline {
        let index = RenderLayer::DRAW_ORDER
            .iter()
            .position(|&l| l == layer)
            .unwrap();
        self.pipelines[index]
    }

    pub fn layout_for(&self, layer: RenderLayer) -> vk::PipelineLayout {
        match layer {
            RenderLayer::AlphaTestedSprites => self.sprite_layout,
            _ => self.mesh_layout,
        }
    }
}

impl Drop for Pipelines {
    fn drop(&mut self) {
        let device = &self.context.device;
        for &pipeline in self.pipelines.iter() {
            unsafe { device.destroy_pipeline(pipeline, None) };
        }
        unsafe { device.destroy_pipeline_layout(self.mesh_layout, None) };
        unsafe { device.destroy_pipeline_layout(self.sprite_layout, None) };
    }
}

fn create_layer_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    desc: &LayerPipelineDesc,
) -> vk::Pipeline {
    let vertex_module = load_shader_module(device, desc.vertex_shader);
    let fragment_module = load_shader_module(device, desc.fragment_shader);
    let geometry_module = desc
        .geometry_shader
        .map(|name| load_shader_module(device, name));

    let mut stages = vec![
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(SHADER_ENTRY)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_module)
            .name(SHADER_ENTRY)
            .build(),
    ];
    if let Some(module) = geometry_module {
        stages.push(
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::GEOMETRY)
                .module(module)
                .name(SHADER_ENTRY)
                .build(),
        );
    }

    let (binding, attributes) = if desc.sprite_input {
        (
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: std::mem::size_of::<SpriteVertex>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: offset_of!(SpriteVertex, position) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(SpriteVertex, size) as u32,
                },
            ],
        )
    } else {
        (
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: std::mem::size_of::<Vertex>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: offset_of!(Vertex, position) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: offset_of!(Vertex, normal) as u32,
                },
                vk::VertexInputAttributeDescription {
                    location: 2,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: offset_of!(Vertex, uv) as u32,
                },
            ],
        )
    };

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(std::slice::from_ref(&binding))
        .vertex_attribute_descriptions(&attributes);

    let input_assembly_state =
        vk::PipelineInputAssemblyStateCreateInfo::builder().topology(desc.topology);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    // Meshes wind counter-clockwise in model space; the projection's y-flip
    // turns that into clockwise in framebuffer space.
    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(desc.cull_mode)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(desc.blend_enabled)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA);

    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .attachments(std::slice::from_ref(&color_blend_attachment));

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipeline = unsafe {
        device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&create_info),
            None,
        )
    }
    .expect("Could not create graphics pipeline")[0];

    unsafe { device.destroy_shader_module(vertex_module, None) };
    unsafe { device.destroy_shader_module(fragment_module, None) };
    if let Some(module) = geometry_module {
        unsafe { device.destroy_shader_module(module, None) };
    }

    pipeline
}
