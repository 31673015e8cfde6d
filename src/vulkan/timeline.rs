use std::sync::Arc;

use ash::vk;

use crate::frame::GpuTimeline;
use crate::vulkan::context::Context;

/// Timeline semaphore wrapper, the monotonically increasing completion
/// counter that frame resources stamp their submissions with.
pub struct TimelineSemaphore {
    inner: vk::Semaphore,
    context: Arc<Context>,
}

impl TimelineSemaphore {
    pub fn new(context: Arc<Context>) -> Self {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);

        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);

        let inner = unsafe { context.device.create_semaphore(&create_info, None) }
            .expect("Could not create timeline semaphore");

        Self { inner, context }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.inner
    }
}

impl GpuTimeline for TimelineSemaphore {
    fn completed_value(&self) -> u64 {
        unsafe { self.context.device.get_semaphore_counter_value(self.inner) }
            .expect("Could not read timeline semaphore value")
    }

    fn wait_for(&self, value: u64) {
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(std::slice::from_ref(&self.inner))
            .values(std::slice::from_ref(&value));

        unsafe { self.context.device.wait_semaphores(&wait_info, u64::MAX) }
            .expect("Could not wait on timeline semaphore");
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_semaphore(self.inner, None) };
    }
}
