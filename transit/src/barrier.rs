//! Pipeline barrier accumulation and recording.
use crate::{
    access::classify, access_mask_for_layout, stage_flags_for_layout, vk, Access, CommandBufferManager, ResourceKind,
    Texture,
};
use tracing::trace;

/// Accesses that only read memory.
const READ_ACCESS_MASK: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags::INDEX_READ.as_raw()
        | vk::AccessFlags::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags::UNIFORM_READ.as_raw()
        | vk::AccessFlags::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::SHADER_READ.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::TRANSFER_READ.as_raw(),
);

/// Widens a global memory barrier with a dependency from `src_access` to `dst_access`.
///
/// Nothing is added if `src_access` only contains reads: an execution dependency is enough in
/// that case.
pub fn add_memory_barrier(barrier: &mut vk::MemoryBarrier, src_access: vk::AccessFlags, dst_access: vk::AccessFlags) {
    if !READ_ACCESS_MASK.contains(src_access) {
        barrier.src_access_mask |= src_access;
        barrier.dst_access_mask |= dst_access;
    }
}

pub(crate) fn is_memory_barrier_empty(barrier: &vk::MemoryBarrier) -> bool {
    barrier.src_access_mask.is_empty() && barrier.dst_access_mask.is_empty()
}

/// Returns whether the depth and stencil aspects are writable in the specified layout.
fn depth_stencil_writable_state(layout: vk::ImageLayout) -> (bool, bool) {
    match layout {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (true, true),
        vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL => (false, true),
        vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL => (true, false),
        _ => (false, false),
    }
}

/// Fixes the layout of a barrier that addresses only one aspect of a depth-stencil image, so that
/// it preserves the writability of the other aspect, then widens the barrier to both aspects.
///
/// # Panics
///
/// If the barrier addresses a subset of the aspects of the image that is neither the depth
/// nor the stencil aspect.
pub(crate) fn adjust_depth_stencil_layout(barrier: &mut vk::ImageMemoryBarrier, full_aspect_mask: vk::ImageAspectFlags) {
    let aspect_mask = barrier.subresource_range.aspect_mask;
    if aspect_mask == full_aspect_mask {
        return;
    }
    assert!(
        aspect_mask == vk::ImageAspectFlags::DEPTH || aspect_mask == vk::ImageAspectFlags::STENCIL,
        "invalid aspect mask for a depth-stencil barrier: {:?}",
        aspect_mask
    );

    let (depth_writable_current, stencil_writable_current) = depth_stencil_writable_state(barrier.old_layout);
    let (depth_writable_new, stencil_writable_new) = depth_stencil_writable_state(barrier.new_layout);

    if aspect_mask == vk::ImageAspectFlags::DEPTH {
        if stencil_writable_current {
            barrier.new_layout = if depth_writable_new {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
            };
        }
    } else if depth_writable_current {
        barrier.new_layout = if stencil_writable_new {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
        };
    }

    barrier.subresource_range.aspect_mask = vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL;
}

pub(crate) fn image_barrier(
    image: vk::Image,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    subresource_range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier {
        src_access_mask,
        dst_access_mask,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range,
        ..Default::default()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Helper to build a pipeline barrier.
#[derive(Clone, Debug, Default)]
pub struct PipelineBarrier {
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub memory_barrier: vk::MemoryBarrier,
    pub buffer_barriers: Vec<vk::BufferMemoryBarrier>,
    pub image_barriers: Vec<vk::ImageMemoryBarrier>,
}

impl PipelineBarrier {
    pub fn new() -> PipelineBarrier {
        PipelineBarrier::default()
    }

    /// Builds a subresource range.
    pub fn make_subresource_range(
        aspect_mask: vk::ImageAspectFlags,
        base_mip_level: u32,
        level_count: u32,
        base_array_layer: u32,
        layer_count: u32,
    ) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level,
            level_count,
            base_array_layer,
            layer_count,
        }
    }

    /// Whether the barrier contains no memory, buffer or image barrier.
    pub fn is_empty(&self) -> bool {
        is_memory_barrier_empty(&self.memory_barrier) && self.buffer_barriers.is_empty() && self.image_barriers.is_empty()
    }

    /// Adds a layout transition of an image from `src_layout` to `dst_layout`.
    ///
    /// Stages and accesses are derived from the layouts.
    pub fn add_image_layout_transition(
        &mut self,
        image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
        subresource_range: vk::ImageSubresourceRange,
    ) {
        self.src_stage_mask |= stage_flags_for_layout(src_layout);
        self.dst_stage_mask |= stage_flags_for_layout(dst_layout);
        self.image_barriers.push(image_barrier(
            image,
            access_mask_for_layout(src_layout),
            access_mask_for_layout(dst_layout),
            src_layout,
            dst_layout,
            subresource_range,
        ));
    }

    /// Adds a transition of an image between two accesses.
    ///
    /// `layout` is the current layout of the subresources. It is used as the source layout if
    /// `src_access` doesn't determine one, and is updated to the destination layout.
    pub fn add_image_access_transition(
        &mut self,
        texture: &dyn Texture,
        src_access: Access,
        dst_access: Access,
        subresource_range: vk::ImageSubresourceRange,
        layout: &mut vk::ImageLayout,
    ) {
        let is_depth_stencil = texture.is_depth_or_stencil();
        let src = classify(src_access, ResourceKind::Texture, is_depth_stencil, true);
        let dst = classify(dst_access, ResourceKind::Texture, is_depth_stencil, false);

        self.src_stage_mask |= src.stages;
        self.dst_stage_mask |= dst.stages;

        let (src_layout, src_access_mask) = match src.layout {
            Some(src_layout) => {
                debug_assert_eq!(src_layout, *layout, "image is not in the layout of its source access");
                (src_layout, src.access)
            }
            None => (*layout, access_mask_for_layout(*layout)),
        };
        let dst_layout = dst.layout.unwrap_or(vk::ImageLayout::GENERAL);

        self.image_barriers.push(image_barrier(
            texture.image(),
            src_access_mask,
            dst.access,
            src_layout,
            dst_layout,
            subresource_range,
        ));
        *layout = dst_layout;
    }

    /// Records the barrier into the active command buffer, if it is not empty.
    pub fn execute(&self, commands: &mut impl CommandBufferManager) {
        if self.is_empty() {
            return;
        }
        let command_buffer = commands.active_command_buffer();
        self.record(commands, command_buffer);
    }

    pub(crate) fn record(&self, commands: &mut impl CommandBufferManager, command_buffer: vk::CommandBuffer) {
        trace!(
            "pipeline barrier src={:?} dst={:?} memory={} buffers={} images={}",
            self.src_stage_mask,
            self.dst_stage_mask,
            !is_memory_barrier_empty(&self.memory_barrier),
            self.buffer_barriers.len(),
            self.image_barriers.len()
        );
        let memory_barriers: &[vk::MemoryBarrier] = if is_memory_barrier_empty(&self.memory_barrier) {
            &[]
        } else {
            std::slice::from_ref(&self.memory_barrier)
        };
        commands.cmd_pipeline_barrier(
            command_buffer,
            self.src_stage_mask,
            self.dst_stage_mask,
            memory_barriers,
            &self.buffer_barriers,
            &self.image_barriers,
        );
    }
}

/// Records a layout transition of a single image into the active command buffer.
pub fn set_image_layout(
    commands: &mut impl CommandBufferManager,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    subresource_range: vk::ImageSubresourceRange,
) {
    let mut barrier = PipelineBarrier::new();
    barrier.add_image_layout_transition(image, old_layout, new_layout, subresource_range);
    barrier.execute(commands);
}
