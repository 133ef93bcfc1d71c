//! Vulkan context and render loop for the Lumen renderer.
//!
//! This crate provides:
//! - Instance creation with validation output routed to `tracing`
//! - Queue family resolution and physical device selection
//! - Surface probing and swapchain configuration
//! - Logical device and swapchain lifetime management
//! - A single-frame-in-flight render loop using dynamic rendering
//! - Graphics pipelines and staged buffer uploads via gpu-allocator

pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod selection;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::Vertex;
pub use capabilities::{DeviceKind, GpuVendor, PhysicalDeviceCandidate};
pub use command::CommandPool;
pub use context::{RenderContext, RenderContextBuilder};
pub use device::LogicalDevice;
pub use error::{GpuError, Result};
pub use frame::{DrawRecorder, FrameCycle, FrameExecutor, FrameOps, FramePhase, FrameTarget};
pub use instance::Instance;
pub use memory::{GpuAllocator, GpuBuffer};
pub use pipeline::{BlendMode, GraphicsPipeline, GraphicsPipelineConfig};
pub use queue::{QueueFamilies, QueueFamilyIndices};
pub use selection::{select_device, Rejection};
pub use surface::{Surface, SurfaceConfiguration, SurfaceSupport};
pub use swapchain::Swapchain;
pub use sync::FrameSync;

pub use ash::vk;
