//! Vulkan occupancy backend.
//!
//! Each sector is drawn with an attachment-less dynamic rendering pass whose
//! fragment stage writes occupancy into a 3D storage image. The image is
//! then copied into a host-visible transfer buffer and read back once the
//! slot's fence signals.
//!
//! Resources are grouped in frame slots. With one slot every sector is
//! rendered and read back before the next is recorded; more slots let the
//! host read one sector while the device renders the next ones.

use std::collections::VecDeque;
use std::time::Duration;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpumtv_core::{Error, OccupancyChunk, Sector, Vertex};
use gpumtv_gpu::command::{self, begin_one_time, device_may_still_use, submit_one_shot};
use gpumtv_gpu::{
    cmd_barrier, create_fence, load_spirv, reset_fence, wait_for_fence, BufferState, CommandPool,
    DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWrites, GpuBuffer, GpuContext, GpuError,
    GpuImage, GraphicsPipeline, GraphicsPipelineConfig, ImageState, TimestampQueries,
    TrackedBuffer, TrackedImage,
};
use gpumtv_mesh::Mesh;
use tracing::{debug, info, trace};

use crate::backend::{OccupancyBackend, SectorFrame};
use crate::config::VoxelizeConfig;
use crate::frame::FrameTracker;
use crate::uniforms::{SectorUniforms, VoxelizePushConstants};

/// Stages that read the push constants and sector uniforms.
const PROGRAM_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw()
        | vk::ShaderStageFlags::GEOMETRY.as_raw()
        | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Render target format and how occupancy is stored in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    /// One unsigned byte per voxel
    R8Uint,
    /// Four bytes per voxel, occupancy in alpha
    Rgba8Unorm,
}

impl TargetFormat {
    pub const fn vk_format(self) -> vk::Format {
        match self {
            Self::R8Uint => vk::Format::R8_UINT,
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        }
    }

    pub const fn texel_size(self) -> u64 {
        match self {
            Self::R8Uint => 1,
            Self::Rgba8Unorm => 4,
        }
    }

    /// Pick the single-byte format when the device can store to and copy it.
    pub fn select(ctx: &GpuContext) -> Self {
        if ctx.capabilities().supports_r8_uint_storage {
            Self::R8Uint
        } else {
            Self::Rgba8Unorm
        }
    }

    /// Copy read-back texels into `dst`, one byte per voxel.
    pub fn extract(self, texels: &[u8], dst: &mut [u8]) -> Result<(), Error> {
        let expected = dst.len() * self.texel_size() as usize;
        if texels.len() != expected {
            return Err(Error::InvalidData(format!(
                "read back {} bytes, expected {expected}",
                texels.len()
            )));
        }

        match self {
            Self::R8Uint => dst.copy_from_slice(texels),
            Self::Rgba8Unorm => {
                for (voxel, texel) in dst.iter_mut().zip(texels.chunks_exact(4)) {
                    *voxel = texel[3];
                }
            }
        }
        Ok(())
    }
}

/// Vertex input layout matching [`Vertex`].
pub fn vertex_input() -> (
    vk::VertexInputBindingDescription,
    [vk::VertexInputAttributeDescription; 5],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::SIZE,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attribute = |location: u32, format: vk::Format, offset: u32| {
        vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        }
    };
    let attributes = [
        attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
        attribute(1, vk::Format::R32G32B32_SFLOAT, 12),
        attribute(2, vk::Format::R32G32B32_SFLOAT, 24),
        attribute(3, vk::Format::R32G32_SFLOAT, 36),
        attribute(4, vk::Format::R32_UINT, 44),
    ];
    (binding, attributes)
}

/// Resources owned by one sector at a time.
struct FrameSlot {
    tracker: FrameTracker,
    target: GpuImage,
    target_view: vk::ImageView,
    target_state: TrackedImage,
    transfer: GpuBuffer,
    transfer_state: TrackedBuffer,
    uniforms: GpuBuffer,
    descriptor_set: vk::DescriptorSet,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

impl FrameSlot {
    fn null() -> Self {
        Self {
            tracker: FrameTracker::new(),
            target: GpuImage::null(),
            target_view: vk::ImageView::null(),
            target_state: TrackedImage::new(vk::Image::null()),
            transfer: GpuBuffer::null(),
            transfer_state: TrackedBuffer::new(vk::Buffer::null(), 0),
            uniforms: GpuBuffer::null(),
            descriptor_set: vk::DescriptorSet::null(),
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
        }
    }
}

/// GPU implementation of [`OccupancyBackend`].
///
/// Borrows the context so it is always dropped before the device.
pub struct GpuVoxelizer<'ctx> {
    ctx: &'ctx GpuContext,
    chunk_resolution: u32,
    target_format: TargetFormat,
    fence_timeout: Duration,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    pipeline: GraphicsPipeline,
    command_pool: CommandPool,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
    /// Staging buffer of an upload that timed out; freed once the device
    /// is idle
    abandoned_staging: GpuBuffer,
    /// One begin/end pair per slot, when the queue supports timestamps
    timestamps: Option<TimestampQueries>,
    last_device_time: Option<Duration>,
    slots: Vec<FrameSlot>,
    /// Slots with a submitted sector, oldest first
    order: VecDeque<usize>,
    next_slot: usize,
}

impl<'ctx> GpuVoxelizer<'ctx> {
    /// Upload `mesh` and create the pipeline and frame slots for `config`.
    ///
    /// On failure everything created so far is released.
    pub fn new(ctx: &'ctx GpuContext, mesh: &Mesh, config: &VoxelizeConfig) -> Result<Self, Error> {
        let mut voxelizer = Self {
            ctx,
            chunk_resolution: config.effective_chunk_resolution(),
            target_format: TargetFormat::select(ctx),
            fence_timeout: config.fence_timeout,
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: DescriptorPool::null(),
            pipeline: GraphicsPipeline::null(),
            command_pool: CommandPool::null(),
            vertex_buffer: GpuBuffer::null(),
            index_buffer: GpuBuffer::null(),
            index_count: 0,
            abandoned_staging: GpuBuffer::null(),
            timestamps: None,
            last_device_time: None,
            slots: Vec::new(),
            order: VecDeque::new(),
            next_slot: 0,
        };
        voxelizer.init(mesh, config)?;

        info!(
            chunk_resolution = voxelizer.chunk_resolution,
            format = ?voxelizer.target_format,
            frames_in_flight = voxelizer.slots.len(),
            timestamps = voxelizer.timestamps.is_some(),
            conservative = ctx.conservative_rasterization(),
            "GPU voxelizer ready"
        );
        Ok(voxelizer)
    }

    pub const fn target_format(&self) -> TargetFormat {
        self.target_format
    }

    pub const fn chunk_resolution(&self) -> u32 {
        self.chunk_resolution
    }

    fn init(&mut self, mesh: &Mesh, config: &VoxelizeConfig) -> Result<(), Error> {
        let caps = self.ctx.capabilities();
        let missing = caps.missing_requirements();
        if !missing.is_empty() {
            return Err(GpuError::NoSuitableDevice(format!(
                "{} lacks {}",
                caps.device_name,
                missing.join(", ")
            ))
            .into());
        }
        if VoxelizePushConstants::SIZE > caps.max_push_constants_size {
            return Err(Error::ResourceCreation(format!(
                "push constants need {} bytes, device allows {}",
                VoxelizePushConstants::SIZE,
                caps.max_push_constants_size
            )));
        }

        let ctx = self.ctx;
        let device = ctx.device();
        let slot_count = config.frames_in_flight;

        unsafe {
            self.command_pool = CommandPool::new(device, ctx.graphics_queue_family())?;
        }

        self.upload_mesh(mesh)?;

        if ctx.timestamp_valid_bits() > 0 {
            self.timestamps = Some(unsafe {
                TimestampQueries::new(
                    device,
                    slot_count,
                    ctx.timestamp_valid_bits(),
                    ctx.capabilities().timestamp_period,
                )?
            });
        }

        let layout_builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, PROGRAM_STAGES)
            .storage_image(1, vk::ShaderStageFlags::FRAGMENT);
        let pool_sizes = layout_builder.pool_sizes(slot_count);
        unsafe {
            self.descriptor_set_layout = layout_builder.build(device)?;
            self.descriptor_pool = DescriptorPool::new(device, slot_count, &pool_sizes)?;
        }

        let shaders = config.shader_paths();
        let (binding, attributes) = vertex_input();
        let pipeline_config = GraphicsPipelineConfig {
            vertex_shader: load_spirv(&shaders.vertex)?,
            geometry_shader: load_spirv(&shaders.geometry)?,
            fragment_shader: load_spirv(&shaders.fragment)?,
            vertex_bindings: vec![binding],
            vertex_attributes: attributes.to_vec(),
            conservative_rasterization: self.ctx.conservative_rasterization(),
        };
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(PROGRAM_STAGES)
            .offset(0)
            .size(VoxelizePushConstants::SIZE);
        unsafe {
            self.pipeline = GraphicsPipeline::new(
                device,
                &pipeline_config,
                &[self.descriptor_set_layout],
                &[push_constant_range],
            )?;
        }

        for index in 0..slot_count {
            self.slots.push(FrameSlot::null());
            self.init_slot(index as usize)?;
        }

        Ok(())
    }

    /// Copy vertices and indices into device-local buffers.
    fn upload_mesh(&mut self, mesh: &Mesh) -> Result<(), Error> {
        let ctx = self.ctx;
        let device = ctx.device();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        if vertex_bytes.is_empty() || index_bytes.is_empty() {
            return Err(Error::AssetLoad("mesh has no geometry to upload".to_string()));
        }

        let mut allocator = ctx.allocator().lock();
        self.vertex_buffer = allocator.create_buffer(
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "mesh_vertices",
        )?;
        self.index_buffer = allocator.create_buffer(
            index_bytes.len() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            "mesh_indices",
        )?;

        let mut staging = allocator.create_buffer(
            (vertex_bytes.len() + index_bytes.len()) as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "mesh_staging",
        )?;

        let vertex_size = vertex_bytes.len() as u64;
        let (staging_buffer, vertex_buffer, index_buffer) =
            (staging.buffer, self.vertex_buffer.buffer, self.index_buffer.buffer);
        let upload = staging
            .write_bytes(0, vertex_bytes)
            .and_then(|()| staging.write_bytes(vertex_size, index_bytes))
            .and_then(|()| unsafe {
                submit_one_shot(
                    device,
                    &self.command_pool,
                    ctx.graphics_queue(),
                    self.fence_timeout,
                    |cmd| {
                        let vertex_region = vk::BufferCopy::default().size(vertex_size);
                        let index_region = vk::BufferCopy::default()
                            .src_offset(vertex_size)
                            .size(index_bytes.len() as u64);
                        device.cmd_copy_buffer(cmd, staging_buffer, vertex_buffer, &[vertex_region]);
                        device.cmd_copy_buffer(cmd, staging_buffer, index_buffer, &[index_region]);
                    },
                )
            });
        if device_may_still_use(&upload) {
            // The copy may still be reading it
            self.abandoned_staging = staging;
        } else {
            allocator.free_buffer(&mut staging)?;
        }
        upload?;

        self.index_count = mesh.indices.len() as u32;
        debug!(
            vertices = mesh.vertices.len(),
            indices = mesh.indices.len(),
            bytes = vertex_bytes.len() + index_bytes.len(),
            "Uploaded mesh"
        );
        Ok(())
    }

    fn init_slot(&mut self, index: usize) -> Result<(), Error> {
        let ctx = self.ctx;
        let device = ctx.device();
        let c = self.chunk_resolution;
        let format = self.target_format.vk_format();
        let texel_size = self.target_format.texel_size();

        let descriptor_set =
            unsafe { self.descriptor_pool.allocate_one(device, self.descriptor_set_layout)? };
        let command_buffer = unsafe { self.command_pool.allocate_primary(device)? };

        let slot = &mut self.slots[index];
        slot.descriptor_set = descriptor_set;
        slot.command_buffer = command_buffer;

        {
            let mut allocator = ctx.allocator().lock();
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_3D)
                .format(format)
                .extent(vk::Extent3D {
                    width: c,
                    height: c,
                    depth: c,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(
                    vk::ImageUsageFlags::STORAGE
                        | vk::ImageUsageFlags::TRANSFER_SRC
                        | vk::ImageUsageFlags::TRANSFER_DST,
                )
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            slot.target = allocator.create_image(
                &image_info,
                MemoryLocation::GpuOnly,
                &format!("voxel_target_{index}"),
            )?;
            slot.transfer = allocator.create_buffer(
                slot.target.byte_size(texel_size),
                vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuToCpu,
                &format!("voxel_readback_{index}"),
            )?;
            slot.uniforms = allocator.create_buffer(
                u64::from(SectorUniforms::SIZE),
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("sector_uniforms_{index}"),
            )?;
        }
        slot.target_state = TrackedImage::new(slot.target.image);
        slot.transfer_state = TrackedBuffer::new(slot.transfer.buffer, slot.transfer.size);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(slot.target.image)
            .view_type(vk::ImageViewType::TYPE_3D)
            .format(format)
            .subresource_range(slot.target_state.subresource_range());

        unsafe {
            slot.target_view = device
                .create_image_view(&view_info, None)
                .map_err(GpuError::from)?;
            // The first wait on a fresh slot returns immediately
            slot.fence = create_fence(device, true)?;

            DescriptorWrites::new()
                .uniform_buffer(0, slot.uniforms.buffer, u64::from(SectorUniforms::SIZE))
                .storage_image(1, slot.target_view)
                .apply(device, slot.descriptor_set);
        }

        Ok(())
    }

    /// Record the full sector pass into the slot's command buffer.
    unsafe fn record(&mut self, index: usize, push: &VoxelizePushConstants) -> Result<(), Error> {
        let device = self.ctx.device();
        let c = self.chunk_resolution;
        let slot = &mut self.slots[index];
        let cmd = slot.command_buffer;

        begin_one_time(device, cmd)?;
        if let Some(timestamps) = &self.timestamps {
            timestamps.cmd_begin(device, cmd, index as u32)?;
        }

        // Zero the transfer buffer and clear the target
        let buffer_barrier = slot.transfer_state.transition(
            &[BufferState::IDLE, BufferState::HOST_READ],
            BufferState::TRANSFER_WRITE,
        )?;
        let image_barrier = slot.target_state.transition(
            &[vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_SRC_OPTIMAL],
            ImageState::CLEAR,
        )?;
        cmd_barrier(device, cmd, &[image_barrier], &[buffer_barrier]);

        device.cmd_fill_buffer(cmd, slot.transfer.buffer, 0, vk::WHOLE_SIZE, 0);
        device.cmd_clear_color_image(
            cmd,
            slot.target.image,
            vk::ImageLayout::GENERAL,
            &vk::ClearColorValue { uint32: [0; 4] },
            &[slot.target_state.subresource_range()],
        );

        let image_barrier = slot
            .target_state
            .transition(&[vk::ImageLayout::GENERAL], ImageState::FRAGMENT_STORAGE)?;
        cmd_barrier(device, cmd, &[image_barrier], &[]);

        // Attachment-less pass; the fragment stage stores into the target
        let extent = vk::Extent2D {
            width: c,
            height: c,
        };
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1);
        device.cmd_begin_rendering(cmd, &rendering_info);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: c as f32,
            height: c as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[render_area]);

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout,
            0,
            &[slot.descriptor_set],
            &[],
        );
        device.cmd_push_constants(
            cmd,
            self.pipeline.layout,
            PROGRAM_STAGES,
            0,
            bytemuck::bytes_of(push),
        );
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);

        device.cmd_end_rendering(cmd);
        if let Some(timestamps) = &self.timestamps {
            timestamps.cmd_end(device, cmd, index as u32)?;
        }

        // Copy waits for every fragment store and for the fill
        let image_barrier = slot
            .target_state
            .transition(&[vk::ImageLayout::GENERAL], ImageState::COPY_SRC)?;
        let buffer_barrier = slot
            .transfer_state
            .transition(&[BufferState::TRANSFER_WRITE], BufferState::TRANSFER_WRITE)?;
        cmd_barrier(device, cmd, &[image_barrier], &[buffer_barrier]);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: c,
                height: c,
                depth: c,
            });
        device.cmd_copy_image_to_buffer(
            cmd,
            slot.target.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            slot.transfer.buffer,
            &[region],
        );

        let buffer_barrier = slot
            .transfer_state
            .transition(&[BufferState::TRANSFER_WRITE], BufferState::HOST_READ)?;
        cmd_barrier(device, cmd, &[], &[buffer_barrier]);

        command::end(device, cmd)?;
        Ok(())
    }
}

impl OccupancyBackend for GpuVoxelizer<'_> {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn max_in_flight(&self) -> usize {
        self.slots.len()
    }

    fn in_flight(&self) -> usize {
        self.order.len()
    }

    fn submit(&mut self, frame: &SectorFrame) -> Result<(), Error> {
        if frame.sector.resolution() != self.chunk_resolution {
            return Err(Error::Configuration(format!(
                "sector resolution {} does not match target resolution {}",
                frame.sector.resolution(),
                self.chunk_resolution
            )));
        }

        let index = self.next_slot;
        let ctx = self.ctx;
        let device = ctx.device();
        let slot = &mut self.slots[index];

        unsafe { wait_for_fence(device, slot.fence, self.fence_timeout)? };
        slot.tracker.begin_recording(frame.sector)?;

        let uniforms = SectorUniforms::for_sector(&frame.sector);
        let push = VoxelizePushConstants::new(
            frame.view_proj,
            self.chunk_resolution,
            frame.frame_index as u32,
        );

        let recorded = match slot.uniforms.write(std::slice::from_ref(&uniforms)) {
            Ok(()) => unsafe { self.record(index, &push) },
            Err(error) => Err(error.into()),
        };
        if let Err(error) = recorded {
            self.slots[index].tracker.abandon_recording();
            return Err(error);
        }

        let slot = &mut self.slots[index];
        unsafe {
            reset_fence(device, slot.fence)?;
            command::submit(device, ctx.graphics_queue(), slot.command_buffer, slot.fence)?;
        }
        slot.tracker.mark_submitted()?;

        trace!(
            sector = frame.sector.index(),
            slot = index,
            frame = frame.frame_index,
            "Submitted sector"
        );
        self.order.push_back(index);
        self.next_slot = (index + 1) % self.slots.len();
        Ok(())
    }

    fn last_device_time(&self) -> Option<Duration> {
        self.last_device_time
    }

    fn complete_oldest(&mut self, chunk: &mut OccupancyChunk) -> Result<Sector, Error> {
        let index = self
            .order
            .pop_front()
            .ok_or_else(|| GpuError::InvalidState("no sector in flight".to_string()))?;
        let ctx = self.ctx;
        let device = ctx.device();
        let slot = &mut self.slots[index];

        unsafe { wait_for_fence(device, slot.fence, self.fence_timeout)? };
        let sector = slot.tracker.begin_readback()?;
        self.last_device_time = match &self.timestamps {
            Some(timestamps) => unsafe { timestamps.elapsed(device, index as u32)? },
            None => None,
        };

        let texels = slot.transfer.mapped_bytes()?;
        self.target_format.extract(texels, chunk.as_bytes_mut())?;
        slot.tracker.finish_readback()?;

        trace!(sector = sector.index(), slot = index, "Read back sector");
        Ok(sector)
    }
}

impl Drop for GpuVoxelizer<'_> {
    fn drop(&mut self) {
        let ctx = self.ctx;
        let device = ctx.device();
        let _ = ctx.wait_idle();

        let mut allocator = ctx.allocator().lock();
        for slot in &mut self.slots {
            unsafe {
                device.destroy_fence(slot.fence, None);
                device.destroy_image_view(slot.target_view, None);
            }
            let _ = allocator.free_image(&mut slot.target);
            let _ = allocator.free_buffer(&mut slot.transfer);
            let _ = allocator.free_buffer(&mut slot.uniforms);
        }
        let _ = allocator.free_buffer(&mut self.vertex_buffer);
        let _ = allocator.free_buffer(&mut self.index_buffer);
        let _ = allocator.free_buffer(&mut self.abandoned_staging);
        drop(allocator);

        unsafe {
            self.pipeline.destroy(device);
            if let Some(timestamps) = &self.timestamps {
                timestamps.destroy(device);
            }
            self.descriptor_pool.destroy(device);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            // Frees the slot command buffers too
            self.command_pool.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_input_matches_vertex_layout() {
        let (binding, attributes) = vertex_input();
        assert_eq!(binding.stride, 48);

        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2, 3, 4]);
        assert_eq!(
            attributes.map(|a| a.offset),
            [
                std::mem::offset_of!(Vertex, position) as u32,
                std::mem::offset_of!(Vertex, normal) as u32,
                std::mem::offset_of!(Vertex, color) as u32,
                std::mem::offset_of!(Vertex, uv) as u32,
                std::mem::offset_of!(Vertex, material_id) as u32,
            ]
        );
        assert_eq!(attributes[4].format, vk::Format::R32_UINT);
    }

    #[test]
    fn extract_single_byte_texels() {
        let mut voxels = [0u8; 4];
        TargetFormat::R8Uint
            .extract(&[0, 7, 0, 255], &mut voxels)
            .unwrap();
        assert_eq!(voxels, [0, 7, 0, 255]);
    }

    #[test]
    fn extract_alpha_from_rgba_texels() {
        let texels = [9, 9, 9, 0, 1, 2, 3, 255, 0, 0, 0, 128];
        let mut voxels = [1u8; 3];
        TargetFormat::Rgba8Unorm.extract(&texels, &mut voxels).unwrap();
        assert_eq!(voxels, [0, 255, 128]);
    }

    #[test]
    fn extract_rejects_short_readback() {
        let mut voxels = [0u8; 4];
        assert!(TargetFormat::Rgba8Unorm.extract(&[0; 8], &mut voxels).is_err());
        assert_eq!(TargetFormat::R8Uint.texel_size(), 1);
        assert_eq!(TargetFormat::Rgba8Unorm.vk_format(), vk::Format::R8G8B8A8_UNORM);
    }
}
