pub mod buffer;
pub mod context;
pub mod swapchain;
pub mod texture;
pub mod timeline;
pub mod window_settings;
