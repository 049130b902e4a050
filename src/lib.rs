// =============================================================================
// RENDER DEVICE - GPU device, resource and presentation layer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Presenter decorators (wrap / virtual swapchain / present hook) │
// │    └── Swapchain (on-screen, headless or XR; indirect target)   │
// │          └── Device (typed handles into per-kind registries)    │
// │                └── Backend (null, or Vulkan via ash)            │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. acquire_next_image -> image index (+ semaphore / fence signaled)
// 2. Record and submit the frame into the presenter's target
// 3. present(index, wait semaphores) -> decorators add their own passes
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod objects;
pub mod present;
pub mod registry;
pub mod swapchain;
pub mod types;

pub use backend::{Api, Backend, NullBackend};
#[cfg(feature = "vulkan")]
pub use backend::VulkanBackend;
pub use config::Config;
pub use device::{Device, DeviceCreateInfo};
pub use error::{Error, PresentStatus, Result};
pub use handle::{Handle, NativeHandle};
pub use present::{DeviceSwapchainWrap, PresentHook, Presenter, VirtualSwapchain, VirtualSwapchainCreateInfo};
pub use registry::ObjectKind;
pub use swapchain::{PresentMode, Swapchain, SwapchainCreateInfo, SwapchainMode, Target};
