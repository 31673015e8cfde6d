use std::sync::Arc;

use ash::vk;

use crate::geometry::Vertex;
use crate::render::pipelines::DescriptorLayouts;
use crate::render::shader_types::{MaterialConstants, ObjectConstants, PassConstants};
use crate::vulkan::buffer::UploadBuffer;
use crate::vulkan::context::Context;
use crate::vulkan::timeline::TimelineSemaphore;

/// Depth of the frame-resource pool: how many frames the CPU may run ahead
/// of the GPU. Dirty counters are initialized to this value so a mutation
/// propagates into every pooled copy.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// The GPU-side completion counter as the frame cycle sees it. The real
/// implementation is a timeline semaphore; tests substitute their own.
pub trait GpuTimeline {
    fn completed_value(&self) -> u64;
    /// Blocks until the counter reaches `value`.
    fn wait_for(&self, value: u64);
}

/// Round-robin cursor over the frame slots plus the submission value each
/// slot was last stamped with. Pure bookkeeping, no device handles, so the
/// reuse invariant is testable without a GPU.
pub struct FrameCycle {
    cursor: usize,
    submitted: [u64; FRAMES_IN_FLIGHT],
}

impl FrameCycle {
    pub fn new() -> Self {
        Self {
            cursor: FRAMES_IN_FLIGHT - 1,
            submitted: [0; FRAMES_IN_FLIGHT],
        }
    }

    /// Advances to the next slot and blocks until the GPU has finished the
    /// work the slot was last stamped with. Zero means "never submitted"
    /// and skips the wait.
    pub fn acquire(&mut self, timeline: &impl GpuTimeline) -> usize {
        self.cursor = (self.cursor + 1) % FRAMES_IN_FLIGHT;

        let pending = self.submitted[self.cursor];
        if pending != 0 && timeline.completed_value() < pending {
            timeline.wait_for(pending);
        }
        self.cursor
    }

    /// Stamps the slot after its command buffer went to the queue.
    pub fn record_submission(&mut self, slot: usize, value: u64) {
        debug_assert_eq!(slot, self.cursor, "stamping a slot that is not current");
        self.submitted[slot] = value;
    }

    pub fn current(&self) -> usize {
        self.cursor
    }
}

/// One full copy of the per-frame GPU-visible state: command pool and
/// buffer, one slot per render item / material / pass, and the wave
/// surface's dynamic vertex buffer.
pub struct FrameResource {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    pub pass_constants: UploadBuffer<PassConstants>,
    pub object_constants: UploadBuffer<ObjectConstants>,
    pub material_constants: UploadBuffer<MaterialConstants>,
    pub wave_vertices: UploadBuffer<Vertex>,

    pub pass_set: vk::DescriptorSet,
    pub object_set: vk::DescriptorSet,
    pub material_set: vk::DescriptorSet,

    /// Binary semaphores for the swapchain handoff, one pair per slot so a
    /// semaphore is never re-submitted while still pending.
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,

    context: Arc<Context>,
}

impl FrameResource {
    fn new(
        context: Arc<Context>,
        descriptor_pool: vk::DescriptorPool,
        layouts: &DescriptorLayouts,
        object_count: usize,
        material_count: usize,
        wave_vertex_count: usize,
    ) -> Self {
        let device = &context.device;

        let command_pool = {
            let create_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(context.queue_family_index)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);

            unsafe { device.create_command_pool(&create_info, None) }
                .expect("Could not create frame command pool")
        };

        let command_buffer = {
            let allocate_info = vk::CommandBufferAllocateInfo::builder()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            unsafe { device.allocate_command_buffers(&allocate_info) }
                .expect("Could not allocate frame command buffer")[0]
        };

        let alignment = context.min_uniform_buffer_alignment;
        let pass_constants = UploadBuffer::new(
            context.clone(),
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            alignment,
        );
        let object_constants = UploadBuffer::new(
            context.clone(),
            object_count,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            alignment,
        );
        let material_constants = UploadBuffer::new(
            context.clone(),
            material_count,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            alignment,
        );
        let wave_vertices = UploadBuffer::new(
            context.clone(),
            wave_vertex_count,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            1,
        );

        let (pass_set, object_set, material_set) = {
            let set_layouts = [layouts.pass, layouts.object, layouts.material];
            let allocate_info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(descriptor_pool)
                .set_layouts(&set_layouts);

            let sets = unsafe { device.allocate_descriptor_sets(&allocate_info) }
                .expect("Could not allocate frame descriptor sets");
            (sets[0], sets[1], sets[2])
        };

        let buffer_infos = [
            vk::DescriptorBufferInfo {
                buffer: pass_constants.buffer(),
                offset: 0,
                range: pass_constants.element_size(),
            },
            vk::DescriptorBufferInfo {
                buffer: object_constants.buffer(),
                offset: 0,
                range: object_constants.element_size(),
            },
            vk::DescriptorBufferInfo {
                buffer: material_constants.buffer(),
                offset: 0,
                range: material_constants.element_size(),
            },
        ];
        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(pass_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(&buffer_infos[0]))
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(object_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(std::slice::from_ref(&buffer_infos[1]))
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(material_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(std::slice::from_ref(&buffer_infos[2]))
                .build(),
        ];
        unsafe { device.update_descriptor_sets(&writes, &[]) };

        let (image_available, render_finished) = {
            let create_info = vk::SemaphoreCreateInfo::builder();
            let image_available = unsafe { device.create_semaphore(&create_info, None) }
                .expect("Could not create image available semaphore");
            let render_finished = unsafe { device.create_semaphore(&create_info, None) }
                .expect("Could not create render finished semaphore");
            (image_available, render_finished)
        };

        Self {
            command_pool,
            command_buffer,
            pass_constants,
            object_constants,
            material_constants,
            wave_vertices,
            pass_set,
            object_set,
            material_set,
            image_available,
            render_finished,
            context,
        }
    }

    fn reset(&self) {
        unsafe {
            self.context
                .device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
        }
        .expect("Could not reset frame command pool");
    }
}

impl Drop for FrameResource {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_semaphore(self.image_available, None) };
        unsafe { device.destroy_semaphore(self.render_finished, None) };
        unsafe { device.destroy_command_pool(self.command_pool, None) };
    }
}

/// The pool of `FRAMES_IN_FLIGHT` frame resources plus the timeline that
/// gates their reuse.
pub struct FrameResources {
    resources: Vec<FrameResource>,
    cycle: FrameCycle,
    timeline: TimelineSemaphore,
    last_value: u64,
}

impl FrameResources {
    pub fn new(
        context: Arc<Context>,
        descriptor_pool: vk::DescriptorPool,
        layouts: &DescriptorLayouts,
        object_count: usize,
        material_count: usize,
        wave_vertex_count: usize,
    ) -> Self {
        let resources = (0..FRAMES_IN_FLIGHT)
            .map(|_| {
                FrameResource::new(
                    context.clone(),
                    descriptor_pool,
                    layouts,
                    object_count,
                    material_count,
                    wave_vertex_count,
                )
            })
            .collect();

        Self {
            resources,
            cycle: FrameCycle::new(),
            timeline: TimelineSemaphore::new(context),
            last_value: 0,
        }
    }

    /// Waits until the next slot's prior GPU work is done, resets its
    /// command pool and hands it out for rewriting.
    pub fn acquire(&mut self) -> &mut FrameResource {
        let slot = self.cycle.acquire(&self.timeline);
        let resource = &mut self.resources[slot];
        resource.reset();
        resource
    }

    pub fn current(&self) -> &FrameResource {
        &self.resources[self.cycle.current()]
    }

    /// The value the caller must signal on the timeline for the submission
    /// it is about to make. Also stamps the current slot with it.
    pub fn next_signal_value(&mut self) -> u64 {
        self.last_value += 1;
        self.cycle
            .record_submission(self.cycle.current(), self.last_value);
        self.last_value
    }

    pub fn timeline_handle(&self) -> vk::Semaphore {
        self.timeline.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Scripted GPU: `complete_up_to` plays the role of the device making
    /// progress; `wait_for` records every block and then completes the
    /// value, like a real wait returning.
    struct FakeTimeline {
        completed: Cell<u64>,
        waits: RefCell<Vec<u64>>,
    }

    impl FakeTimeline {
        fn new() -> Self {
            Self {
                completed: Cell::new(0),
                waits: RefCell::new(Vec::new()),
            }
        }

        fn complete_up_to(&self, value: u64) {
            self.completed.set(self.completed.get().max(value));
        }
    }

    impl GpuTimeline for FakeTimeline {
        fn completed_value(&self) -> u64 {
            self.completed.get()
        }

        fn wait_for(&self, value: u64) {
            self.waits.borrow_mut().push(value);
            self.complete_up_to(value);
        }
    }

    #[test]
    fn cycles_through_all_slots_in_order() {
        let timeline = FakeTimeline::new();
        let mut cycle = FrameCycle::new();

        let slots: Vec<usize> = (0..6).map(|_| cycle.acquire(&timeline)).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn never_submitted_slots_skip_the_wait() {
        let timeline = FakeTimeline::new();
        let mut cycle = FrameCycle::new();

        for _ in 0..FRAMES_IN_FLIGHT {
            cycle.acquire(&timeline);
        }
        assert!(timeline.waits.borrow().is_empty());
    }

    #[test]
    fn reuse_blocks_until_the_stamped_value_completes() {
        let timeline = FakeTimeline::new();
        let mut cycle = FrameCycle::new();

        for value in 1..=FRAMES_IN_FLIGHT as u64 {
            let slot = cycle.acquire(&timeline);
            cycle.record_submission(slot, value);
        }

        // The GPU has not signaled anything: wrapping back to slot 0 must
        // wait for its stamp (1), and the wait must happen before reuse.
        let slot = cycle.acquire(&timeline);
        assert_eq!(slot, 0);
        assert_eq!(timeline.waits.borrow().as_slice(), &[1]);
        assert!(timeline.completed_value() >= 1);
    }

    #[test]
    fn completed_work_is_reclaimed_without_blocking() {
        let timeline = FakeTimeline::new();
        let mut cycle = FrameCycle::new();

        for value in 1..=FRAMES_IN_FLIGHT as u64 {
            let slot = cycle.acquire(&timeline);
            cycle.record_submission(slot, value);
        }

        timeline.complete_up_to(FRAMES_IN_FLIGHT as u64);
        for _ in 0..FRAMES_IN_FLIGHT {
            cycle.acquire(&timeline);
        }
        assert!(timeline.waits.borrow().is_empty());
    }

    #[test]
    fn every_reuse_satisfies_the_fence_invariant() {
        let timeline = FakeTimeline::new();
        let mut cycle = FrameCycle::new();
        let mut stamps = [0u64; FRAMES_IN_FLIGHT];

        for value in 1..=50u64 {
            let slot = cycle.acquire(&timeline);
            // at the moment of reuse, the slot's prior work must be done
            assert!(timeline.completed_value() >= stamps[slot]);

            cycle.record_submission(slot, value);
            stamps[slot] = value;

            // let the GPU trail a couple of frames behind
            if value > 2 {
                timeline.complete_up_to(value - 2);
            }
        }
    }
}
