//! Headless Vulkan abstraction layer for gpu-mtv.
//!
//! This crate provides:
//! - Vulkan instance and device management (no surfaces, one graphics queue)
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command buffer, fence and descriptor helpers
//! - Timestamp queries for per-sector device time
//! - Explicit image/buffer state tracking for synchronization2 barriers
//! - The attachment-less voxelization pipeline and SPIR-V loading

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod query;
pub mod shaders;
pub mod state;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWrites};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use query::{ticks_to_duration, TimestampQueries};
pub use shaders::{bytes_to_spirv, load_spirv};
pub use state::{cmd_barrier, BufferState, ImageState, TrackedBuffer, TrackedImage};
pub use sync::{create_fence, reset_fence, wait_for_fence};
