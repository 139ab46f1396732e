// Backend module - Vulkan layer for the triangle
//
// Long-lived objects (device, surface, command pool, semaphores) are created
// once; the presentation chain is rebuilt whenever the swapchain goes stale.

pub mod device;
pub mod lifecycle;
pub mod pipeline;
pub mod presentation;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use lifecycle::{FrameAction, Lifecycle};
pub use presentation::{ChainSettings, PresentationChain};
pub use swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
