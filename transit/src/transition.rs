//! Building transitions from lists of resource accesses.
use crate::{
    access::{classify, classify_depth_stencil},
    barrier::add_memory_barrier,
    resource::ResolvedResource,
    vk, Access, Error, ImageSubresourceRange, Pipeline, QueueFamilies, ResourceState, SemaphorePool,
    SignaledSemaphore, TextureRef, TransitionResource, UnsignaledSemaphore,
};
use tracing::trace;

/// A resource that changes from one access to another.
#[derive(Clone, Debug)]
pub struct TransitionInfo {
    /// The resource. Entries without a resource are ignored.
    pub resource: Option<TransitionResource>,
    pub access_before: Access,
    pub access_after: Access,
    /// Affected subresources, for textures. Ignored for buffers.
    pub subresources: ImageSubresourceRange,
}

impl TransitionInfo {
    pub fn new(resource: TransitionResource, access_before: Access, access_after: Access) -> TransitionInfo {
        TransitionInfo {
            resource: Some(resource),
            access_before,
            access_after,
            subresources: ImageSubresourceRange::ALL,
        }
    }

    pub fn texture(texture: TextureRef, access_before: Access, access_after: Access) -> TransitionInfo {
        TransitionInfo::new(TransitionResource::Texture(texture), access_before, access_after)
    }

    /// Restricts the transition to a subset of the subresources of a texture.
    pub fn with_subresources(mut self, subresources: ImageSubresourceRange) -> TransitionInfo {
        self.subresources = subresources;
        self
    }
}

/// An image barrier of a pending transition.
///
/// The image handle is fetched from the texture when the barrier is recorded, since it can
/// change on `Texture::on_layout_transition`.
#[derive(Clone, Debug)]
pub struct PendingImageBarrier {
    pub texture: TextureRef,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    /// Layout before the transition, or `None` if it must be taken from the tracked layout.
    pub old_layout: Option<vk::ImageLayout>,
    pub new_layout: vk::ImageLayout,
    pub subresource_range: vk::ImageSubresourceRange,
    pub src_queue_family_index: u32,
    pub dst_queue_family_index: u32,
}

#[derive(Debug)]
pub(crate) enum TransitionState {
    Built(Option<UnsignaledSemaphore>),
    Begun(Option<SignaledSemaphore>),
}

/// A batch of resource transitions, ready to be begun and ended.
///
/// Transitions between different pipelines own a semaphore, signaled by
/// `TransitionExecutor::begin_transitions` on the source pipeline, and waited on by
/// `TransitionExecutor::end_transitions` on the destination pipeline.
#[derive(Debug)]
pub struct PendingTransition {
    pub(crate) src_pipeline: Pipeline,
    pub(crate) dst_pipeline: Pipeline,
    pub(crate) src_stage_mask: vk::PipelineStageFlags,
    pub(crate) dst_stage_mask: vk::PipelineStageFlags,
    pub(crate) memory_barrier: vk::MemoryBarrier,
    pub(crate) buffer_barriers: Vec<vk::BufferMemoryBarrier>,
    pub(crate) image_barriers: Vec<PendingImageBarrier>,
    pub(crate) state: TransitionState,
}

impl PendingTransition {
    pub fn src_pipeline(&self) -> Pipeline {
        self.src_pipeline
    }

    pub fn dst_pipeline(&self) -> Pipeline {
        self.dst_pipeline
    }

    /// Whether the transition moves resources between pipelines.
    pub fn is_cross_pipeline(&self) -> bool {
        self.src_pipeline != self.dst_pipeline
    }

    pub fn src_stage_mask(&self) -> vk::PipelineStageFlags {
        self.src_stage_mask
    }

    pub fn dst_stage_mask(&self) -> vk::PipelineStageFlags {
        self.dst_stage_mask
    }

    /// Global memory barrier accumulated from the transitions that need neither a layout
    /// transition nor an ownership transfer.
    pub fn memory_barrier(&self) -> &vk::MemoryBarrier {
        &self.memory_barrier
    }

    pub fn buffer_barriers(&self) -> &[vk::BufferMemoryBarrier] {
        &self.buffer_barriers
    }

    pub fn image_barriers(&self) -> &[PendingImageBarrier] {
        &self.image_barriers
    }

    /// Whether no resource was transitioned.
    pub fn is_empty(&self) -> bool {
        self.src_stage_mask.is_empty() || self.dst_stage_mask.is_empty()
    }

    /// Returns the semaphore used to synchronize the pipelines, for cross-pipeline transitions
    /// that have not been ended yet.
    pub fn semaphore(&self) -> Option<vk::Semaphore> {
        match self.state {
            TransitionState::Built(ref semaphore) => semaphore.as_ref().map(UnsignaledSemaphore::handle),
            TransitionState::Begun(ref semaphore) => semaphore.as_ref().map(SignaledSemaphore::handle),
        }
    }

    pub fn is_begun(&self) -> bool {
        matches!(self.state, TransitionState::Begun(_))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Copy, Clone, Debug)]
struct AspectAccess {
    before: Access,
    after: Access,
}

/// Separate transitions of the depth and stencil aspects of one image, merged into a single
/// barrier since both aspects must be in the same combined layout.
#[derive(Debug)]
struct DepthStencilAspectTransition {
    texture: TextureRef,
    depth: Option<AspectAccess>,
    stencil: Option<AspectAccess>,
}

/// Access of the aspect that wasn't specified, assuming it is only read.
fn other_aspect_access(explicit: Access) -> Access {
    if explicit.intersects(Access::DSV_READ | Access::DSV_WRITE) {
        Access::DSV_READ
    } else {
        explicit
    }
}

/// Builds a `PendingTransition` from a list of resource accesses.
pub struct TransitionBuilder {
    src_pipeline: Pipeline,
    dst_pipeline: Pipeline,
    queue_families: QueueFamilies,
    infos: Vec<TransitionInfo>,
}

impl TransitionBuilder {
    pub fn new(src_pipeline: Pipeline, dst_pipeline: Pipeline, queue_families: QueueFamilies) -> TransitionBuilder {
        TransitionBuilder {
            src_pipeline,
            dst_pipeline,
            queue_families,
            infos: Vec::new(),
        }
    }

    pub fn add(&mut self, info: TransitionInfo) -> &mut Self {
        self.infos.push(info);
        self
    }

    pub fn add_all(&mut self, infos: impl IntoIterator<Item = TransitionInfo>) -> &mut Self {
        self.infos.extend(infos);
        self
    }

    /// Builds the barriers of the transition, and allocates a semaphore if the transition moves
    /// resources between pipelines.
    ///
    /// # Panics
    ///
    /// If an access is invalid for its resource (see `classify`), if the destination access of an
    /// entry is unknown, or if the same aspect of a depth-stencil image is transitioned twice.
    pub fn build(self, semaphores: &mut impl SemaphorePool) -> Result<PendingTransition, Error> {
        let semaphore = if self.src_pipeline != self.dst_pipeline {
            Some(semaphores.get_or_create_semaphore()?)
        } else {
            None
        };

        let mut transition = PendingTransition {
            src_pipeline: self.src_pipeline,
            dst_pipeline: self.dst_pipeline,
            src_stage_mask: vk::PipelineStageFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::empty(),
            memory_barrier: vk::MemoryBarrier::default(),
            buffer_barriers: Vec::new(),
            image_barriers: Vec::new(),
            state: TransitionState::Built(semaphore),
        };
        let (src_queue_family_index, dst_queue_family_index) = self
            .queue_families
            .ownership_transfer(self.src_pipeline, self.dst_pipeline);
        let mut barriers = BarrierSink {
            transition: &mut transition,
            src_queue_family_index,
            dst_queue_family_index,
        };

        let mut depth_stencil_transitions: Vec<DepthStencilAspectTransition> = Vec::new();

        for info in self.infos.iter() {
            let Some(ref resource) = info.resource else {
                continue;
            };
            assert!(
                info.access_after != Access::UNKNOWN,
                "transitioning a resource to an unknown access is not allowed"
            );

            let (resource, kind) = resource.resolve();
            match resource {
                ResolvedResource::Buffer(buffer) => {
                    let src = classify(info.access_before, kind, false, true);
                    let dst = classify(info.access_after, kind, false, false);
                    barriers.add_buffer(buffer, src, dst);
                }
                ResolvedResource::Texture(texture) => {
                    let full_aspect_mask = texture.full_aspect_mask();
                    let is_depth_stencil = texture.is_depth_or_stencil();
                    let aspect_mask = info.subresources.aspect_mask;
                    assert!(
                        full_aspect_mask.contains(aspect_mask),
                        "aspects {:?} are not present in the image ({:?})",
                        aspect_mask,
                        full_aspect_mask
                    );

                    let combined_depth_stencil =
                        full_aspect_mask.contains(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);
                    if combined_depth_stencil && !info.subresources.is_all_aspects() && aspect_mask != full_aspect_mask {
                        let aspect_access = AspectAccess {
                            before: info.access_before,
                            after: info.access_after,
                        };
                        let image = texture.image();
                        let index = match depth_stencil_transitions
                            .iter()
                            .position(|t| t.texture.image() == image)
                        {
                            Some(index) => index,
                            None => {
                                depth_stencil_transitions.push(DepthStencilAspectTransition {
                                    texture: texture.clone(),
                                    depth: None,
                                    stencil: None,
                                });
                                depth_stencil_transitions.len() - 1
                            }
                        };
                        let pending = &mut depth_stencil_transitions[index];

                        if aspect_mask == vk::ImageAspectFlags::DEPTH {
                            assert!(pending.depth.is_none(), "depth aspect transitioned twice in the same batch");
                            pending.depth = Some(aspect_access);
                        } else {
                            assert!(
                                aspect_mask == vk::ImageAspectFlags::STENCIL,
                                "invalid aspect mask for a depth-stencil image: {:?}",
                                aspect_mask
                            );
                            assert!(
                                pending.stencil.is_none(),
                                "stencil aspect transitioned twice in the same batch"
                            );
                            pending.stencil = Some(aspect_access);
                        }

                        if let (Some(depth), Some(stencil)) = (pending.depth, pending.stencil) {
                            let src = classify_depth_stencil(depth.before, stencil.before, true);
                            let dst = classify_depth_stencil(depth.after, stencil.after, false);
                            let range = info.subresources.to_vk(full_aspect_mask);
                            let range = vk::ImageSubresourceRange {
                                aspect_mask: full_aspect_mask,
                                ..range
                            };
                            barriers.add_image(&texture, src, dst, range);
                            depth_stencil_transitions.swap_remove(index);
                        }
                        continue;
                    }

                    let src = classify(info.access_before, kind, is_depth_stencil, true);
                    let dst = classify(info.access_after, kind, is_depth_stencil, false);
                    barriers.add_image(&texture, src, dst, info.subresources.to_vk(full_aspect_mask));
                }
            }
        }

        // Depth-stencil images with only one aspect specified.
        for pending in depth_stencil_transitions {
            let (depth, stencil, aspect_mask) = match (pending.depth, pending.stencil) {
                (Some(depth), None) => (
                    depth,
                    AspectAccess {
                        before: other_aspect_access(depth.before),
                        after: other_aspect_access(depth.after),
                    },
                    vk::ImageAspectFlags::DEPTH,
                ),
                (None, Some(stencil)) => (
                    AspectAccess {
                        before: other_aspect_access(stencil.before),
                        after: other_aspect_access(stencil.after),
                    },
                    stencil,
                    vk::ImageAspectFlags::STENCIL,
                ),
                _ => unreachable!("depth-stencil transitions are flushed when both aspects are set"),
            };

            let mut src = classify_depth_stencil(depth.before, stencil.before, true);
            let dst = classify_depth_stencil(depth.after, stencil.after, false);
            // the actual layout of the other aspect is only known from the tracked state
            src.layout = None;
            barriers.add_image(&pending.texture, src, dst, ImageSubresourceRange::ALL.to_vk(aspect_mask));
        }

        trace!(
            "built transition {:?}->{:?}: {} buffer barriers, {} image barriers",
            transition.src_pipeline,
            transition.dst_pipeline,
            transition.buffer_barriers.len(),
            transition.image_barriers.len()
        );
        Ok(transition)
    }
}

/// Adds the barriers of each entry to the transition.
struct BarrierSink<'a> {
    transition: &'a mut PendingTransition,
    src_queue_family_index: u32,
    dst_queue_family_index: u32,
}

impl<'a> BarrierSink<'a> {
    /// Applies the async compute restrictions and accumulates the stage masks.
    fn add_stages(&mut self, src: &mut ResourceState, dst: &mut ResourceState) {
        let shader_access = vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
        if self.transition.src_pipeline == Pipeline::AsyncCompute {
            src.stages = vk::PipelineStageFlags::COMPUTE_SHADER;
            src.access &= shader_access;
        }
        if self.transition.dst_pipeline == Pipeline::AsyncCompute {
            dst.stages = vk::PipelineStageFlags::COMPUTE_SHADER;
            dst.access &= shader_access;
        }
        self.transition.src_stage_mask |= src.stages;
        self.transition.dst_stage_mask |= dst.stages;
    }

    fn add_buffer(&mut self, buffer: vk::Buffer, mut src: ResourceState, mut dst: ResourceState) {
        self.add_stages(&mut src, &mut dst);

        if !self.transition.is_cross_pipeline() {
            add_memory_barrier(&mut self.transition.memory_barrier, src.access, dst.access);
            return;
        }

        self.transition.buffer_barriers.push(vk::BufferMemoryBarrier {
            src_access_mask: src.access,
            dst_access_mask: dst.access,
            src_queue_family_index: self.src_queue_family_index,
            dst_queue_family_index: self.dst_queue_family_index,
            buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        });
    }

    fn add_image(
        &mut self,
        texture: &TextureRef,
        mut src: ResourceState,
        mut dst: ResourceState,
        range: vk::ImageSubresourceRange,
    ) {
        self.add_stages(&mut src, &mut dst);

        let Some(new_layout) = dst.layout else {
            panic!("could not determine the layout of {:?} after the transition", texture);
        };

        if !self.transition.is_cross_pipeline() && src.layout == Some(new_layout) {
            add_memory_barrier(&mut self.transition.memory_barrier, src.access, dst.access);
            return;
        }

        self.transition.image_barriers.push(PendingImageBarrier {
            texture: texture.clone(),
            src_access_mask: src.access,
            dst_access_mask: dst.access,
            old_layout: src.layout,
            new_layout,
            subresource_range: range,
            src_queue_family_index: self.src_queue_family_index,
            dst_queue_family_index: self.dst_queue_family_index,
        });
    }
}
