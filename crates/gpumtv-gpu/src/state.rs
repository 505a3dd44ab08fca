//! Explicit resource state tracking.
//!
//! Images and buffers carry their current layout, pipeline stage and
//! access scope as plain values. Every transition names the state it
//! expects to leave; a mismatch is an [`GpuError::InvalidState`] instead of
//! a silently wrong barrier.
//!
//! State advances when a barrier is recorded, not when it executes. The
//! tracked value therefore only matches the device once the command buffer
//! holding the barrier has been submitted and completed; after a failed
//! recording or submission the resource must be considered lost. gpu-mtv
//! treats every such failure as fatal for the run.

use crate::error::{GpuError, Result};
use ash::vk;

/// Layout and last access of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageState {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl ImageState {
    /// Contents undefined, nothing pending.
    pub const UNDEFINED: Self = Self::new(
        vk::ImageLayout::UNDEFINED,
        vk::PipelineStageFlags2::NONE,
        vk::AccessFlags2::NONE,
    );

    /// Target of `vkCmdClearColorImage` in the general layout.
    pub const CLEAR: Self = Self::new(
        vk::ImageLayout::GENERAL,
        vk::PipelineStageFlags2::ALL_TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
    );

    /// Written through a storage image binding by the fragment stage.
    pub const FRAGMENT_STORAGE: Self = Self::new(
        vk::ImageLayout::GENERAL,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
                | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    );

    /// Source of an image-to-buffer copy.
    pub const COPY_SRC: Self = Self::new(
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::PipelineStageFlags2::COPY,
        vk::AccessFlags2::TRANSFER_READ,
    );

    pub const fn new(
        layout: vk::ImageLayout,
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
    ) -> Self {
        Self {
            layout,
            stage,
            access,
        }
    }
}

/// Last access of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl BufferState {
    /// Nothing pending.
    pub const IDLE: Self = Self::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE);

    /// Written by a transfer command (fill or copy).
    pub const TRANSFER_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::ALL_TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
    );

    /// Visible to host reads after the submission's fence signals.
    pub const HOST_READ: Self = Self::new(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ);

    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }
}

/// An image handle paired with its tracked state.
#[derive(Debug)]
pub struct TrackedImage {
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    state: ImageState,
}

impl TrackedImage {
    /// Track a single-mip, single-layer color image that starts undefined.
    pub const fn new(image: vk::Image) -> Self {
        Self {
            image,
            range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            state: ImageState::UNDEFINED,
        }
    }

    pub const fn image(&self) -> vk::Image {
        self.image
    }

    pub const fn state(&self) -> ImageState {
        self.state
    }

    pub const fn subresource_range(&self) -> vk::ImageSubresourceRange {
        self.range
    }

    /// Move to `next`, returning the barrier to record.
    ///
    /// Fails without changing state if the current layout is not one of
    /// `expected`. On success the tracked state is `next` immediately, even
    /// though the barrier has not run yet.
    pub fn transition(
        &mut self,
        expected: &[vk::ImageLayout],
        next: ImageState,
    ) -> Result<vk::ImageMemoryBarrier2<'static>> {
        if !expected.contains(&self.state.layout) {
            return Err(GpuError::InvalidState(format!(
                "image in layout {:?}, expected one of {expected:?}",
                self.state.layout
            )));
        }

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.state.stage)
            .src_access_mask(self.state.access)
            .dst_stage_mask(next.stage)
            .dst_access_mask(next.access)
            .old_layout(self.state.layout)
            .new_layout(next.layout)
            .image(self.image)
            .subresource_range(self.range);

        self.state = next;
        Ok(barrier)
    }
}

/// A buffer handle paired with its tracked state.
#[derive(Debug)]
pub struct TrackedBuffer {
    buffer: vk::Buffer,
    size: u64,
    state: BufferState,
}

impl TrackedBuffer {
    pub const fn new(buffer: vk::Buffer, size: u64) -> Self {
        Self {
            buffer,
            size,
            state: BufferState::IDLE,
        }
    }

    pub const fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// Move to `next`, returning the barrier to record.
    ///
    /// Fails without changing state if the current state is not one of
    /// `expected`. On success the tracked state is `next` immediately, even
    /// though the barrier has not run yet.
    pub fn transition(
        &mut self,
        expected: &[BufferState],
        next: BufferState,
    ) -> Result<vk::BufferMemoryBarrier2<'static>> {
        if !expected.contains(&self.state) {
            return Err(GpuError::InvalidState(format!(
                "buffer in state {:?}, expected one of {expected:?}",
                self.state
            )));
        }

        let barrier = vk::BufferMemoryBarrier2::default()
            .src_stage_mask(self.state.stage)
            .src_access_mask(self.state.access)
            .dst_stage_mask(next.stage)
            .dst_access_mask(next.access)
            .buffer(self.buffer)
            .offset(0)
            .size(self.size);

        self.state = next;
        Ok(barrier)
    }
}

/// Record a synchronization2 barrier.
///
/// # Safety
/// The device and command buffer must be valid and recording.
pub unsafe fn cmd_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    images: &[vk::ImageMemoryBarrier2],
    buffers: &[vk::BufferMemoryBarrier2],
) {
    let dependency_info = vk::DependencyInfo::default()
        .image_memory_barriers(images)
        .buffer_memory_barriers(buffers);
    device.cmd_pipeline_barrier2(cmd, &dependency_info);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_sector_cycle() {
        let mut image = TrackedImage::new(vk::Image::null());
        assert_eq!(image.state(), ImageState::UNDEFINED);

        let clear = image
            .transition(
                &[vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_SRC_OPTIMAL],
                ImageState::CLEAR,
            )
            .unwrap();
        assert_eq!(clear.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(clear.new_layout, vk::ImageLayout::GENERAL);

        let render = image
            .transition(&[vk::ImageLayout::GENERAL], ImageState::FRAGMENT_STORAGE)
            .unwrap();
        assert_eq!(render.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert!(render
            .dst_access_mask
            .contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));

        let copy = image
            .transition(&[vk::ImageLayout::GENERAL], ImageState::COPY_SRC)
            .unwrap();
        assert_eq!(copy.src_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(copy.dst_stage_mask, vk::PipelineStageFlags2::COPY);
        assert_eq!(image.state().layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        // Next sector starts from the copy source layout
        let clear = image
            .transition(
                &[vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_SRC_OPTIMAL],
                ImageState::CLEAR,
            )
            .unwrap();
        assert_eq!(clear.old_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    }

    #[test]
    fn unexpected_layout_is_rejected() {
        let mut image = TrackedImage::new(vk::Image::null());
        let result = image.transition(&[vk::ImageLayout::GENERAL], ImageState::COPY_SRC);
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
        assert_eq!(image.state(), ImageState::UNDEFINED);
    }

    #[test]
    fn buffer_readback_cycle() {
        let mut buffer = TrackedBuffer::new(vk::Buffer::null(), 64);

        buffer
            .transition(
                &[BufferState::IDLE, BufferState::HOST_READ],
                BufferState::TRANSFER_WRITE,
            )
            .unwrap();
        let to_host = buffer
            .transition(&[BufferState::TRANSFER_WRITE], BufferState::HOST_READ)
            .unwrap();
        assert_eq!(to_host.dst_access_mask, vk::AccessFlags2::HOST_READ);
        assert_eq!(to_host.size, 64);

        assert!(buffer
            .transition(&[BufferState::TRANSFER_WRITE], BufferState::HOST_READ)
            .is_err());
        assert_eq!(buffer.state(), BufferState::HOST_READ);
    }

    #[test]
    fn state_follows_recording_not_execution() {
        let mut image = TrackedImage::new(vk::Image::null());
        image
            .transition(&[vk::ImageLayout::UNDEFINED], ImageState::CLEAR)
            .unwrap();
        // Nothing was submitted, yet the next barrier already starts from
        // the recorded layout
        assert_eq!(image.state(), ImageState::CLEAR);
        let next = image
            .transition(&[vk::ImageLayout::GENERAL], ImageState::COPY_SRC)
            .unwrap();
        assert_eq!(next.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(next.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
    }
}
