//! Interfaces to the command buffer and semaphore management of a queue.
use crate::vk;
use ash::prelude::VkResult;

/// A wrapper around a signaled binary semaphore.
#[derive(Debug)]
pub struct SignaledSemaphore(pub(crate) vk::Semaphore);

impl SignaledSemaphore {
    pub fn handle(&self) -> vk::Semaphore {
        self.0
    }
}

/// A wrapper around an unsignaled binary semaphore.
#[derive(Debug)]
pub struct UnsignaledSemaphore(pub(crate) vk::Semaphore);

impl UnsignaledSemaphore {
    /// Wraps a semaphore that is known to be unsignaled.
    pub fn new(semaphore: vk::Semaphore) -> UnsignaledSemaphore {
        UnsignaledSemaphore(semaphore)
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.0
    }
}

/// Source of binary semaphores for queue ownership transfers.
pub trait SemaphorePool {
    fn get_or_create_semaphore(&mut self) -> VkResult<UnsignaledSemaphore>;
}

/// Command buffer recording and submission on one queue.
pub trait CommandBufferManager {
    /// Returns the command buffer currently being recorded.
    fn active_command_buffer(&mut self) -> vk::CommandBuffer;

    /// Whether commands have been recorded into the active command buffer since it was begun.
    fn has_pending_active_command_buffer(&self) -> bool;

    /// Ends and submits the active command buffer, signaling the specified semaphores on completion.
    fn submit_active_command_buffer(&mut self, signal_semaphores: &[vk::Semaphore]) -> VkResult<()>;

    /// Begins a new active command buffer.
    fn prepare_new_active_command_buffer(&mut self) -> VkResult<()>;

    /// Makes the next submission wait for `semaphore` at the specified stages.
    ///
    /// The manager takes ownership of the semaphore, and is responsible for recycling it once the
    /// wait has completed.
    fn add_wait_semaphore(&mut self, dst_stage: vk::PipelineStageFlags, semaphore: SignaledSemaphore);

    /// Records a pipeline barrier.
    fn cmd_pipeline_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier],
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    );
}

/// Records a pipeline barrier with `vkCmdPipelineBarrier`.
///
/// Helper for implementations of `CommandBufferManager::cmd_pipeline_barrier` backed by a device.
///
/// # Safety
///
/// `command_buffer` must be a valid command buffer of `device` in the recording state, and the
/// barriers must reference valid objects of `device`.
pub unsafe fn emit_pipeline_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
    memory_barriers: &[vk::MemoryBarrier],
    buffer_barriers: &[vk::BufferMemoryBarrier],
    image_barriers: &[vk::ImageMemoryBarrier],
) {
    device.cmd_pipeline_barrier(
        command_buffer,
        src_stage_mask,
        dst_stage_mask,
        vk::DependencyFlags::empty(),
        memory_barriers,
        buffer_barriers,
        image_barriers,
    );
}
