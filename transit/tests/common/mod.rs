#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use transit::{
    ash::prelude::VkResult,
    vk::{self, Handle},
    CommandBufferManager, SemaphorePool, SignaledSemaphore, Texture, TextureRef, UnsignaledSemaphore,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct RecordedBarrier {
    pub command_buffer: vk::CommandBuffer,
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub memory_barriers: Vec<vk::MemoryBarrier>,
    pub buffer_barriers: Vec<vk::BufferMemoryBarrier>,
    pub image_barriers: Vec<vk::ImageMemoryBarrier>,
}

#[derive(Debug)]
pub enum Command {
    Barrier(RecordedBarrier),
    Submit { signal_semaphores: Vec<vk::Semaphore> },
    Prepare,
    Wait { stage: vk::PipelineStageFlags, semaphore: vk::Semaphore },
}

/// Records the calls made by the executor instead of talking to a queue.
#[derive(Debug, Default)]
pub struct RecordingCommands {
    pub commands: Vec<Command>,
    command_buffer: u64,
    pending: bool,
}

impl RecordingCommands {
    pub fn new() -> RecordingCommands {
        RecordingCommands {
            command_buffer: 1,
            ..Default::default()
        }
    }

    pub fn barriers(&self) -> Vec<&RecordedBarrier> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Barrier(barrier) => Some(barrier),
                _ => None,
            })
            .collect()
    }

    pub fn image_barriers(&self) -> Vec<vk::ImageMemoryBarrier> {
        self.barriers()
            .into_iter()
            .flat_map(|barrier| barrier.image_barriers.iter().copied())
            .collect()
    }

    pub fn submits(&self) -> Vec<&[vk::Semaphore]> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Command::Submit { signal_semaphores } => Some(signal_semaphores.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn waits(&self) -> Vec<(vk::PipelineStageFlags, vk::Semaphore)> {
        self.commands
            .iter()
            .filter_map(|command| match *command {
                Command::Wait { stage, semaphore } => Some((stage, semaphore)),
                _ => None,
            })
            .collect()
    }

    /// Records an unrelated barrier into the active command buffer.
    pub fn record_work(&mut self) {
        let command_buffer = self.active_command_buffer();
        self.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            &[],
            &[],
            &[],
        );
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl CommandBufferManager for RecordingCommands {
    fn active_command_buffer(&mut self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(self.command_buffer)
    }

    fn has_pending_active_command_buffer(&self) -> bool {
        self.pending
    }

    fn submit_active_command_buffer(&mut self, signal_semaphores: &[vk::Semaphore]) -> VkResult<()> {
        self.pending = false;
        self.commands.push(Command::Submit {
            signal_semaphores: signal_semaphores.to_vec(),
        });
        Ok(())
    }

    fn prepare_new_active_command_buffer(&mut self) -> VkResult<()> {
        self.command_buffer += 1;
        self.commands.push(Command::Prepare);
        Ok(())
    }

    fn add_wait_semaphore(&mut self, dst_stage: vk::PipelineStageFlags, semaphore: SignaledSemaphore) {
        self.commands.push(Command::Wait {
            stage: dst_stage,
            semaphore: semaphore.handle(),
        });
    }

    fn cmd_pipeline_barrier(
        &mut self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        memory_barriers: &[vk::MemoryBarrier],
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        self.pending = true;
        self.commands.push(Command::Barrier(RecordedBarrier {
            command_buffer,
            src_stage_mask,
            dst_stage_mask,
            memory_barriers: memory_barriers.to_vec(),
            buffer_barriers: buffer_barriers.to_vec(),
            image_barriers: image_barriers.to_vec(),
        }));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Default)]
pub struct CountingSemaphorePool {
    pub created: u64,
}

impl SemaphorePool for CountingSemaphorePool {
    fn get_or_create_semaphore(&mut self) -> VkResult<UnsignaledSemaphore> {
        self.created += 1;
        Ok(UnsignaledSemaphore::new(vk::Semaphore::from_raw(0x5e00 + self.created)))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct MockTexture {
    pub handle: Cell<u64>,
    pub aspects: vk::ImageAspectFlags,
    pub mips: u32,
    pub layers: u32,
    pub cpu_readback: bool,
    /// Layouts passed to `on_layout_transition`.
    pub transitions: RefCell<Vec<vk::ImageLayout>>,
}

impl MockTexture {
    pub fn new(handle: u64, aspects: vk::ImageAspectFlags, mips: u32, layers: u32) -> Rc<MockTexture> {
        Rc::new(MockTexture {
            handle: Cell::new(handle),
            aspects,
            mips,
            layers,
            cpu_readback: false,
            transitions: RefCell::new(Vec::new()),
        })
    }

    pub fn color(handle: u64, mips: u32, layers: u32) -> Rc<MockTexture> {
        MockTexture::new(handle, vk::ImageAspectFlags::COLOR, mips, layers)
    }

    pub fn depth_stencil(handle: u64) -> Rc<MockTexture> {
        MockTexture::new(
            handle,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            1,
            1,
        )
    }

    pub fn cpu_readback(handle: u64) -> Rc<MockTexture> {
        Rc::new(MockTexture {
            handle: Cell::new(handle),
            aspects: vk::ImageAspectFlags::COLOR,
            mips: 1,
            layers: 1,
            cpu_readback: true,
            transitions: RefCell::new(Vec::new()),
        })
    }
}

impl Texture for MockTexture {
    fn image(&self) -> vk::Image {
        vk::Image::from_raw(self.handle.get())
    }

    fn full_aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspects
    }

    fn mip_levels(&self) -> u32 {
        self.mips
    }

    fn array_layers(&self) -> u32 {
        self.layers
    }

    fn is_cpu_readback(&self) -> bool {
        self.cpu_readback
    }

    fn on_layout_transition(&self, new_layout: vk::ImageLayout) {
        self.transitions.borrow_mut().push(new_layout);
    }
}

pub fn texture_ref(texture: &Rc<MockTexture>) -> TextureRef {
    texture.clone()
}
