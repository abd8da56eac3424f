//! Recording of pending transitions into command buffers.
use crate::{
    access_mask_for_layout,
    barrier::{add_memory_barrier, adjust_depth_stencil_layout, image_barrier},
    stage_flags_for_layout,
    transition::TransitionState,
    vk, CommandBufferManager, Error, ImageLayout, LayoutManager, PendingImageBarrier, PendingTransition, Pipeline,
    PipelineBarrier, SignaledSemaphore,
};
use std::mem;
use tracing::{trace, trace_span};

/// Begins and ends transitions on one pipeline.
///
/// Transitions between pipelines are begun on the source pipeline, which releases ownership of
/// the resources and signals the semaphore of the transition, then ended on the destination
/// pipeline, which waits on the semaphore and acquires the resources. Transitions within a
/// pipeline only need to be ended.
pub struct TransitionExecutor<'a, C> {
    layouts: &'a mut LayoutManager,
    commands: &'a mut C,
    pipeline: Pipeline,
}

impl<'a, C: CommandBufferManager> TransitionExecutor<'a, C> {
    pub fn new(layouts: &'a mut LayoutManager, commands: &'a mut C, pipeline: Pipeline) -> TransitionExecutor<'a, C> {
        TransitionExecutor {
            layouts,
            commands,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Records the release barriers of cross-pipeline transitions, signals their semaphores and
    /// submits the active command buffer.
    ///
    /// Transitions within a pipeline are only marked as begun.
    ///
    /// # Panics
    ///
    /// If a transition was already begun.
    pub fn begin_transitions(&mut self, transitions: &mut [PendingTransition]) -> Result<(), Error> {
        let config = *self.layouts.config();
        let _span = config
            .show_transition_events
            .then(|| trace_span!("begin_transitions").entered());

        let mut signal_semaphores = Vec::new();

        for transition in transitions.iter_mut() {
            let semaphore = match mem::replace(&mut transition.state, TransitionState::Begun(None)) {
                TransitionState::Built(semaphore) => semaphore,
                TransitionState::Begun(_) => panic!("transition was already begun"),
            };

            if !transition.is_cross_pipeline() {
                continue;
            }
            let semaphore = semaphore.expect("cross-pipeline transition without a semaphore");

            if config.verify_layouts {
                assert_eq!(
                    transition.src_pipeline, self.pipeline,
                    "attempted to begin a {:?} -> {:?} transition on the {:?} pipeline",
                    transition.src_pipeline, transition.dst_pipeline, self.pipeline
                );
            }

            if transition.is_empty() {
                assert!(transition.buffer_barriers.is_empty() && transition.image_barriers.is_empty());
            } else {
                let barrier = self.release_barrier(transition, config.verify_layouts);
                barrier.execute(&mut *self.commands);
            }

            signal_semaphores.push(semaphore.0);
            transition.state = TransitionState::Begun(Some(SignaledSemaphore(semaphore.0)));
        }

        if !signal_semaphores.is_empty() {
            trace!("signaling {} semaphores", signal_semaphores.len());
            self.commands.submit_active_command_buffer(&signal_semaphores)?;
            self.commands.prepare_new_active_command_buffer()?;
        }
        Ok(())
    }

    /// Builds the barrier that releases the resources of a cross-pipeline transition from the
    /// source queue. The tracked layouts are not updated: this is done when the transition ends.
    fn release_barrier(&mut self, transition: &PendingTransition, verify_layouts: bool) -> PipelineBarrier {
        let mut barrier = PipelineBarrier {
            src_stage_mask: transition.src_stage_mask,
            dst_stage_mask: transition.dst_stage_mask,
            ..Default::default()
        };

        barrier.buffer_barriers = transition
            .buffer_barriers
            .iter()
            .map(|buffer_barrier| vk::BufferMemoryBarrier {
                dst_access_mask: vk::AccessFlags::empty(),
                ..*buffer_barrier
            })
            .collect();

        for pending in transition.image_barriers.iter() {
            let texture = &pending.texture;
            let image = texture.image();
            assert!(image != vk::Image::null(), "image of {:?} is not allocated", texture);
            let layout = self.layouts.get_or_add_full_layout(texture.as_ref());

            let (old_layout, src_access_mask) = match pending.old_layout {
                None => {
                    let old_layout = layout.main_layout();
                    barrier.src_stage_mask |= stage_flags_for_layout(old_layout);
                    (old_layout, access_mask_for_layout(old_layout))
                }
                Some(old_layout) => {
                    if verify_layouts {
                        assert!(
                            layout.are_subresources_same_layout(old_layout, &pending.subresource_range),
                            "subresources of {:?} are not in layout {:?}",
                            texture,
                            old_layout
                        );
                    }
                    (old_layout, pending.src_access_mask)
                }
            };

            let mut release = pending_to_vk(pending, image, src_access_mask, old_layout);
            release.dst_access_mask = vk::AccessFlags::empty();
            adjust_depth_stencil_layout(&mut release, texture.full_aspect_mask());
            barrier.image_barriers.push(release);
        }

        barrier
    }

    /// Waits on the semaphores of cross-pipeline transitions, records the barriers of all
    /// transitions, and updates the tracked layouts.
    ///
    /// # Panics
    ///
    /// If a cross-pipeline transition was not begun.
    pub fn end_transitions(&mut self, transitions: impl IntoIterator<Item = PendingTransition>) -> Result<(), Error> {
        let config = *self.layouts.config();
        let _span = config
            .show_transition_events
            .then(|| trace_span!("end_transitions").entered());

        let mut transitions: Vec<PendingTransition> = transitions.into_iter().collect();

        let mut seen_wait_semaphore = false;
        for transition in transitions.iter_mut() {
            match mem::replace(&mut transition.state, TransitionState::Begun(None)) {
                TransitionState::Built(semaphore) => {
                    assert!(
                        semaphore.is_none(),
                        "cross-pipeline transition {:?} -> {:?} ended before it was begun",
                        transition.src_pipeline,
                        transition.dst_pipeline
                    );
                }
                TransitionState::Begun(Some(semaphore)) => {
                    if !seen_wait_semaphore {
                        // the wait must come before anything already recorded
                        if self.commands.has_pending_active_command_buffer() {
                            self.commands.submit_active_command_buffer(&[])?;
                            self.commands.prepare_new_active_command_buffer()?;
                        }
                        seen_wait_semaphore = true;
                    }
                    self.commands
                        .add_wait_semaphore(vk::PipelineStageFlags::TOP_OF_PIPE, semaphore);
                }
                TransitionState::Begun(None) => {}
            }
        }

        for transition in transitions.iter() {
            if transition.is_empty() {
                assert!(transition.buffer_barriers.is_empty() && transition.image_barriers.is_empty());
                continue;
            }
            if config.verify_layouts {
                assert_eq!(
                    transition.dst_pipeline, self.pipeline,
                    "attempted to end a {:?} -> {:?} transition on the {:?} pipeline",
                    transition.src_pipeline, transition.dst_pipeline, self.pipeline
                );
            }

            let barrier = self.acquire_barrier(transition, config.verify_layouts);
            barrier.execute(&mut *self.commands);
        }

        Ok(())
    }

    /// Builds the barrier that ends a transition, and commits the new layouts.
    fn acquire_barrier(&mut self, transition: &PendingTransition, verify_layouts: bool) -> PipelineBarrier {
        let cross_pipeline = transition.is_cross_pipeline();
        let mut barrier = PipelineBarrier {
            src_stage_mask: transition.src_stage_mask,
            dst_stage_mask: transition.dst_stage_mask,
            memory_barrier: transition.memory_barrier,
            ..Default::default()
        };

        barrier.buffer_barriers = transition
            .buffer_barriers
            .iter()
            .map(|buffer_barrier| vk::BufferMemoryBarrier {
                src_access_mask: vk::AccessFlags::empty(),
                ..*buffer_barrier
            })
            .collect();

        for pending in transition.image_barriers.iter() {
            let texture = &pending.texture;
            if texture.is_cpu_readback() {
                continue;
            }

            texture.on_layout_transition(pending.new_layout);
            let image = texture.image();
            assert!(image != vk::Image::null(), "image of {:?} is not allocated", texture);
            let full_aspect_mask = texture.full_aspect_mask();
            let layout = self.layouts.get_or_add_full_layout(texture.as_ref());

            let (old_layout, src_access_mask) = match pending.old_layout {
                None if layout.are_all_subresources_same_layout() => {
                    let old_layout = layout.main_layout();
                    barrier.src_stage_mask |= stage_flags_for_layout(old_layout);
                    (old_layout, access_mask_for_layout(old_layout))
                }
                None => {
                    assert!(
                        !cross_pipeline,
                        "subresources of {:?} must all be in the same layout to be transferred to another pipeline",
                        texture
                    );
                    add_subresource_transitions(&mut barrier, pending, image, full_aspect_mask, layout);
                    continue;
                }
                Some(old_layout) => {
                    if verify_layouts {
                        assert!(
                            layout.are_subresources_same_layout(old_layout, &pending.subresource_range),
                            "subresources of {:?} are not in layout {:?}",
                            texture,
                            old_layout
                        );
                    }
                    (old_layout, pending.src_access_mask)
                }
            };

            let mut acquire = pending_to_vk(pending, image, src_access_mask, old_layout);
            adjust_depth_stencil_layout(&mut acquire, full_aspect_mask);

            if cross_pipeline {
                acquire.src_access_mask = vk::AccessFlags::empty();
            } else if acquire.old_layout == acquire.new_layout {
                // no layout transition needed after all
                add_memory_barrier(
                    &mut barrier.memory_barrier,
                    acquire.src_access_mask,
                    acquire.dst_access_mask,
                );
                continue;
            }

            layout.set(acquire.new_layout, &acquire.subresource_range);
            barrier.image_barriers.push(acquire);
        }

        barrier
    }
}

fn pending_to_vk(
    pending: &PendingImageBarrier,
    image: vk::Image,
    src_access_mask: vk::AccessFlags,
    old_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier {
        src_queue_family_index: pending.src_queue_family_index,
        dst_queue_family_index: pending.dst_queue_family_index,
        ..image_barrier(
            image,
            src_access_mask,
            pending.dst_access_mask,
            old_layout,
            pending.new_layout,
            pending.subresource_range,
        )
    }
}

/// Adds one barrier per run of consecutive mips of each layer that are in the same layout, for
/// images whose subresources are not all in the same layout. Subresources already in the
/// destination layout are skipped.
fn add_subresource_transitions(
    barrier: &mut PipelineBarrier,
    pending: &PendingImageBarrier,
    image: vk::Image,
    full_aspect_mask: vk::ImageAspectFlags,
    layout: &mut ImageLayout,
) {
    let range = pending.subresource_range;
    let first_layer = range.base_array_layer;
    let last_layer = first_layer + layout.range_layer_count(&range);
    let first_mip = range.base_mip_level;
    let last_mip = first_mip + layout.range_mip_count(&range);

    let first_barrier = barrier.image_barriers.len();

    for layer in first_layer..last_layer {
        // barrier covering the previous mip of this layer
        let mut prev: Option<usize> = None;

        for mip in first_mip..last_mip {
            let src_layout = layout.subresource_layout(layer, mip);

            if let Some(index) = prev {
                let prev_barrier = &mut barrier.image_barriers[index];
                if prev_barrier.old_layout == src_layout {
                    prev_barrier.subresource_range.level_count += 1;
                    continue;
                }
            }

            let mut subresource_barrier = image_barrier(
                image,
                access_mask_for_layout(src_layout),
                pending.dst_access_mask,
                src_layout,
                pending.new_layout,
                vk::ImageSubresourceRange {
                    aspect_mask: range.aspect_mask,
                    base_mip_level: mip,
                    level_count: 1,
                    base_array_layer: layer,
                    layer_count: 1,
                },
            );
            adjust_depth_stencil_layout(&mut subresource_barrier, full_aspect_mask);

            if subresource_barrier.old_layout == subresource_barrier.new_layout {
                prev = None;
                continue;
            }

            barrier.src_stage_mask |= stage_flags_for_layout(src_layout);
            barrier.image_barriers.push(subresource_barrier);
            prev = Some(barrier.image_barriers.len() - 1);
        }
    }

    for subresource_barrier in barrier.image_barriers[first_barrier..].iter() {
        layout.set(subresource_barrier.new_layout, &subresource_barrier.subresource_range);
    }
}
