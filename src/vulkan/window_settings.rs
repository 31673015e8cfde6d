use ash::vk;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl Default for PresentMode {
    fn default() -> Self {
        PresentMode::Fifo
    }
}

impl PresentMode {
    /// Picks the configured mode if the surface supports it, otherwise FIFO,
    /// which is the only mode the standard guarantees.
    pub fn pick_supported(self, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
        let wanted = vk::PresentModeKHR::from(self);
        if available.contains(&wanted) {
            wanted
        } else {
            log::warn!(
                "Present mode {:?} not supported by the surface, falling back to FIFO",
                self
            );
            vk::PresentModeKHR::FIFO
        }
    }
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}
