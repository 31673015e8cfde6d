mod camera;
mod config_loader;
mod frame;
mod geometry;
mod input_map;
mod render;
mod scene;
mod scene_builder;
mod time;
mod utility;
mod vulkan;
mod waves;

use std::sync::Arc;

use ash::vk;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ultraviolet::{Mat4, Vec2, Vec3, Vec4};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use camera::OrbitCamera;
use config_loader::{Config, ConfigFileLoader};
use frame::FrameResources;
use geometry::GeometryStore;
use input_map::InputMap;
use render::shader_types::{DirectionalLight, PassConstants};
use render::SceneRenderer;
use scene::{MaterialHandle, Scene};
use scene_builder::build_scene;
use time::Time;
use vulkan::context::Context;
use vulkan::swapchain::SwapchainContainer;
use vulkan::texture::TextureStore;
use waves::Waves;

const WAVE_GRID: usize = 128;

/// Rains pseudo-random droplets onto the wave surface at a fixed cadence,
/// independent of the frame rate.
struct DropletTrigger {
    interval: f32,
    elapsed: f32,
    rng: StdRng,
}

impl DropletTrigger {
    fn new(interval: f32) -> Self {
        Self {
            interval,
            elapsed: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    fn update(&mut self, delta_seconds: f32, waves: &mut Waves) {
        self.elapsed += delta_seconds;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;

            // keep away from the clamped border cells
            let row = self.rng.gen_range(4..waves.row_count() - 4);
            let col = self.rng.gen_range(4..waves.column_count() - 4);
            let magnitude = self.rng.gen_range(0.2..0.5);
            waves.disturb(row, col, magnitude);
        }
    }
}

// Rust will drop these fields in the order they are declared
struct WaveMaze {
    frame_resources: FrameResources,
    renderer: SceneRenderer,
    geometries: GeometryStore,
    _textures: TextureStore,

    scene: Scene,
    waves: Waves,
    droplets: DropletTrigger,
    water_material: MaterialHandle,
    water_scroll: Vec2,

    camera: OrbitCamera,
    input_map: InputMap,
    time: Time,

    should_recreate_swapchain: bool,
    swapchain: SwapchainContainer,
    context: Arc<Context>,
    window: Window,
}

impl WaveMaze {
    fn new(event_loop: &EventLoop<()>, window: Window, config: &Config) -> Self {
        let context = Arc::new(Context::new(event_loop, &window));
        let swapchain =
            SwapchainContainer::new(context.clone(), window.inner_size(), config.present_mode);

        let textures = TextureStore::new(context.clone());
        let renderer = SceneRenderer::new(context.clone(), &swapchain, &textures);

        let waves = Waves::new(WAVE_GRID, WAVE_GRID, 1.0, 0.03, 4.0, 0.2);
        let built = build_scene(&context, &waves);

        let frame_resources = FrameResources::new(
            context.clone(),
            renderer.descriptor_pool(),
            renderer.layouts(),
            built.scene.object_count(),
            built.scene.material_count(),
            waves.vertex_count(),
        );

        let size = window.inner_size();
        let camera = OrbitCamera::new(size.width as f32 / size.height as f32);

        Self {
            frame_resources,
            renderer,
            geometries: built.geometries,
            _textures: textures,
            scene: built.scene,
            waves,
            droplets: DropletTrigger::new(0.25),
            water_material: built.water_material,
            water_scroll: Vec2::zero(),
            camera,
            input_map: InputMap::new(),
            time: Time::new(),
            should_recreate_swapchain: false,
            swapchain,
            context,
            window,
        }
    }

    fn update(&mut self) {
        self.time.update();
        let dt = self.time.delta_seconds();

        self.camera.update(&self.input_map);

        self.droplets.update(dt, &mut self.waves);
        self.waves.update(dt);

        // scroll the water texture, wrapping to keep the offsets small
        self.water_scroll.x += 0.1 * dt;
        self.water_scroll.y += 0.02 * dt;
        if self.water_scroll.x >= 1.0 {
            self.water_scroll.x -= 1.0;
        }
        if self.water_scroll.y >= 1.0 {
            self.water_scroll.y -= 1.0;
        }
        self.scene.set_material_transform(
            self.water_material,
            Mat4::from_translation(Vec3::new(self.water_scroll.x, self.water_scroll.y, 0.0)),
        );
    }

    fn pass_constants(&self, extent: vk::Extent2D) -> PassConstants {
        let view = self.camera.view_matrix();
        let proj = self.camera.projection_matrix();
        let view_proj = proj * view;

        PassConstants {
            view,
            inv_view: view.inversed(),
            proj,
            inv_proj: proj.inversed(),
            view_proj,
            inv_view_proj: view_proj.inversed(),
            eye_position: self.camera.position(),
            _pad0: 0.0,
            render_target_size: Vec2::new(extent.width as f32, extent.height as f32),
            inv_render_target_size: Vec2::new(
                1.0 / extent.width as f32,
                1.0 / extent.height as f32,
            ),
            near_z: self.camera.near(),
            far_z: self.camera.far(),
            total_time: self.time.total_seconds(),
            delta_time: self.time.delta_seconds(),
            ambient_light: Vec4::new(0.25, 0.25, 0.35, 1.0),
            fog_color: Vec4::new(0.7, 0.7, 0.7, 1.0),
            fog_start: 25.0,
            fog_range: 150.0,
            _pad1: [0.0; 2],
            lights: [
                DirectionalLight {
                    direction: Vec3::new(0.57735, -0.57735, 0.57735),
                    strength: Vec3::new(0.6, 0.6, 0.6),
                    ..DirectionalLight::default()
                },
                DirectionalLight {
                    direction: Vec3::new(-0.57735, -0.57735, 0.57735),
                    strength: Vec3::new(0.3, 0.3, 0.3),
                    ..DirectionalLight::default()
                },
                DirectionalLight {
                    direction: Vec3::new(0.0, -0.707, -0.707),
                    strength: Vec3::new(0.15, 0.15, 0.15),
                    ..DirectionalLight::default()
                },
            ],
        }
    }

    fn draw_frame(&mut self) {
        if self.should_recreate_swapchain {
            let size = self.window.inner_size();
            if size.width == 0 || size.height == 0 {
                return;
            }
            self.swapchain.recreate(size);
            self.renderer.resize(&self.swapchain);
            self.camera
                .update_aspect_ratio(size.width as f32 / size.height as f32);
            self.should_recreate_swapchain = false;
        }

        let device = &self.context.device;
        let pass = self.pass_constants(self.swapchain.extent);

        // Acquiring blocks until this slot's previous GPU work completed,
        // which is what makes rewriting its buffers below safe.
        let image_index = {
            let frame = self.frame_resources.acquire();

            let acquire_result = unsafe {
                self.swapchain.loader.acquire_next_image(
                    self.swapchain.inner,
                    u64::MAX,
                    frame.image_available,
                    vk::Fence::null(),
                )
            };
            let image_index = match acquire_result {
                Ok((index, _suboptimal)) => index,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    self.should_recreate_swapchain = true;
                    return;
                }
                Err(e) => panic!("Could not acquire swapchain image: {}", e),
            };

            self.renderer
                .update_frame(frame, &mut self.scene, &self.waves, &pass);

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { device.begin_command_buffer(frame.command_buffer, &begin_info) }
                .expect("Could not begin command buffer");

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: self.swapchain.extent.width as f32,
                height: self.swapchain.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.renderer.draw(
                frame,
                &self.scene,
                &self.geometries,
                &self.swapchain,
                image_index as usize,
                viewport,
            );

            unsafe { device.end_command_buffer(frame.command_buffer) }
                .expect("Could not end command buffer");

            image_index
        };

        let signal_value = self.frame_resources.next_signal_value();
        let frame = self.frame_resources.current();

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished, self.frame_resources.timeline_handle()];

        // Binary semaphore entries carry a zero; the timeline entry carries
        // the value the frame cycle stamped for this slot.
        let wait_values = [0];
        let signal_values = [0, signal_value];
        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(std::slice::from_ref(&frame.command_buffer))
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            device.queue_submit(
                self.context.queue,
                std::slice::from_ref(&submit_info),
                vk::Fence::null(),
            )
        }
        .expect("Could not submit frame");

        let present_wait = [frame.render_finished];
        let swapchains = [self.swapchain.inner];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&present_wait)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.swapchain
                .loader
                .queue_present(self.context.queue, &present_info)
        };
        match present_result {
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.should_recreate_swapchain = true;
            }
            Ok(false) => {}
            Err(e) => panic!("Could not present swapchain image: {}", e),
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width > 0 && size.height > 0 {
            self.camera
                .update_aspect_ratio(size.width as f32 / size.height as f32);
        }
        self.should_recreate_swapchain = true;
    }
}

impl Drop for WaveMaze {
    fn drop(&mut self) {
        unsafe { self.context.device.device_wait_idle() }
            .expect("Could not wait for device idle on shutdown");
    }
}

fn main() {
    env_logger::init();

    let mut config_loader = ConfigFileLoader::new("config.json");
    let config = config_loader.load_config().clone();

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Wave Maze")
        .with_inner_size(PhysicalSize::new(config.window_width, config.window_height))
        .build(&event_loop)
        .expect("Could not create window");

    let mut app = WaveMaze::new(&event_loop, window, &config);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => app.resize(size),
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state,
                            virtual_keycode: Some(keycode),
                            ..
                        },
                    ..
                } => {
                    if keycode == VirtualKeyCode::Escape {
                        *control_flow = ControlFlow::Exit;
                    }
                    match state {
                        ElementState::Pressed => app.input_map.update_key_press(keycode),
                        ElementState::Released => app.input_map.update_key_release(keycode),
                    }
                }
                WindowEvent::MouseInput { state, button, .. } => match state {
                    ElementState::Pressed => app.input_map.update_mouse_press(button),
                    ElementState::Released => app.input_map.update_mouse_release(button),
                },
                WindowEvent::MouseWheel { delta, .. } => {
                    let scroll = match delta {
                        winit::event::MouseScrollDelta::LineDelta(_, y) => y,
                        winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                    };
                    app.input_map.accumulate_scroll(scroll);
                }
                _ => {}
            },
            Event::DeviceEvent {
                event: winit::event::DeviceEvent::MouseMotion { delta },
                ..
            } => {
                app.input_map
                    .accumulate_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
            }
            Event::MainEventsCleared => app.window.request_redraw(),
            Event::RedrawRequested(_) => {
                app.update();
                app.draw_frame();
                app.input_map.clear_frame_deltas();
            }
            _ => {}
        }
    });
}
