//! Tracked image layouts, and the render pass and framebuffer caches that depend on them.
use crate::{
    add_memory_barrier, vk, ColorEntry, CommandBufferManager, DepthStencilEntry, Error, Framebuffer, FramebufferId,
    ImageLayout, LoadAction, PipelineBarrier, RenderObjectFactory, RenderPassInfo, RenderTargetLayout, RenderTargets,
    Texture, TransitionConfig,
};
use fxhash::FxHashMap;
use slotmap::SlotMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// Owns the layout tracking state of every image of a device, and the render pass and
/// framebuffer objects created for them.
///
/// Layouts are tracked from the first time an image is transitioned until `notify_deleted_image`
/// is called.
pub struct LayoutManager {
    config: TransitionConfig,
    layouts: FxHashMap<vk::Image, ImageLayout>,
    render_passes: FxHashMap<u64, vk::RenderPass>,
    framebuffers: SlotMap<FramebufferId, Framebuffer>,
    framebuffers_by_key: FxHashMap<u64, Vec<FramebufferId>>,
    current_framebuffer: Option<FramebufferId>,
}

impl LayoutManager {
    pub fn new(config: TransitionConfig) -> LayoutManager {
        LayoutManager {
            config,
            layouts: Default::default(),
            render_passes: Default::default(),
            framebuffers: SlotMap::with_key(),
            framebuffers_by_key: Default::default(),
            current_framebuffer: None,
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Layouts

    /// Returns the layout tracking state of the texture, creating it if the texture was never
    /// transitioned.
    ///
    /// The subresources of a newly tracked texture are in the `UNDEFINED` layout.
    pub fn get_or_add_full_layout(&mut self, texture: &dyn Texture) -> &mut ImageLayout {
        match self.layouts.entry(texture.image()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(
                    "tracking layout of image {:?} ({} mips, {} layers)",
                    entry.key(),
                    texture.mip_levels(),
                    texture.array_layers()
                );
                entry.insert(ImageLayout::new(
                    vk::ImageLayout::UNDEFINED,
                    texture.mip_levels(),
                    texture.array_layers(),
                ))
            }
        }
    }

    pub fn layout(&self, image: vk::Image) -> Option<&ImageLayout> {
        self.layouts.get(&image)
    }

    /// Stops tracking the layout of a deleted image.
    pub fn notify_deleted_image(&mut self, image: vk::Image) {
        if self.layouts.remove(&image).is_some() {
            debug!("stopped tracking layout of image {:?}", image);
        }
    }

    /// Stops tracking the layout of a deleted render target, and destroys every cached
    /// framebuffer that uses it.
    pub fn notify_deleted_render_target(&mut self, factory: &mut impl RenderObjectFactory, image: vk::Image) {
        self.notify_deleted_image(image);

        let mut evicted = Vec::new();
        self.framebuffers.retain(|id, framebuffer| {
            if framebuffer.contains_render_target(image) {
                evicted.push((id, framebuffer.handle));
                false
            } else {
                true
            }
        });

        for (id, handle) in evicted {
            debug!("destroying framebuffer {:?} of deleted render target {:?}", handle, image);
            factory.destroy_framebuffer(handle);
            if self.current_framebuffer == Some(id) {
                self.current_framebuffer = None;
            }
            for ids in self.framebuffers_by_key.values_mut() {
                ids.retain(|other| *other != id);
            }
        }
        self.framebuffers_by_key.retain(|_, ids| !ids.is_empty());
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Render pass entry

    /// Transitions one subresource of an attachment to the layout expected when the render pass
    /// begins, if it isn't already in that layout.
    fn fix_attachment_layout(
        &mut self,
        barrier: &mut PipelineBarrier,
        texture: &dyn Texture,
        mip_index: u32,
        array_slice: u32,
        expected_layout: vk::ImageLayout,
    ) {
        let full_aspect_mask = texture.full_aspect_mask();
        let layout = self.get_or_add_full_layout(texture);

        let (current_layout, range) = if layout.are_all_subresources_same_layout() {
            (
                layout.main_layout(),
                PipelineBarrier::make_subresource_range(
                    full_aspect_mask,
                    0,
                    layout.num_mips(),
                    0,
                    layout.num_layers(),
                ),
            )
        } else {
            (
                layout.subresource_layout(array_slice, mip_index),
                PipelineBarrier::make_subresource_range(full_aspect_mask, mip_index, 1, array_slice, 1),
            )
        };

        if current_layout == expected_layout {
            return;
        }

        warn!(
            "attachment {:?} (mip {}, layer {}) is in layout {:?} instead of {:?}, transitioning",
            texture, mip_index, array_slice, current_layout, expected_layout
        );
        layout.set(expected_layout, &range);
        texture.on_layout_transition(expected_layout);
        barrier.add_image_layout_transition(texture.image(), current_layout, expected_layout, range);
    }

    /// Checks that a color attachment and its resolve target are in the `COLOR_ATTACHMENT_OPTIMAL`
    /// layout, and adds the transitions to this layout to `barrier` if they aren't.
    pub fn validate_render_pass_color_entry(&mut self, barrier: &mut PipelineBarrier, entry: &ColorEntry) {
        self.fix_attachment_layout(
            barrier,
            entry.render_target.as_ref(),
            entry.mip_index,
            entry.array_slice,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        if let Some(ref resolve_target) = entry.resolve_target {
            self.fix_attachment_layout(
                barrier,
                resolve_target.as_ref(),
                entry.mip_index,
                entry.array_slice,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            );
        }
    }

    /// Checks that the depth-stencil attachment is in the layout matching the depth and stencil
    /// accesses of the render pass, and adds the transition to this layout to `barrier` if it
    /// isn't.
    ///
    /// Images with a single aspect use the combined layouts, driven by the access of that aspect.
    pub fn validate_render_pass_depth_entry(&mut self, barrier: &mut PipelineBarrier, entry: &DepthStencilEntry) {
        let aspects = entry.target.full_aspect_mask();
        let depth_write = entry.depth.is_write() && aspects.contains(vk::ImageAspectFlags::DEPTH);
        let stencil_write = entry.stencil.is_write() && aspects.contains(vk::ImageAspectFlags::STENCIL);
        let both_aspects = aspects.contains(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL);

        let expected_layout = match (depth_write, stencil_write) {
            (true, true) => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            (true, false) | (false, true) if !both_aspects => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            (true, false) => vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
            (false, true) => vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
            (false, false) => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        };
        self.fix_attachment_layout(barrier, entry.target.as_ref(), 0, 0, expected_layout);
    }

    /// Validates the layouts of all attachments of a render pass and records the barrier that
    /// orders the render pass after previous accesses to its attachments.
    pub fn prepare_render_pass(&mut self, info: &RenderPassInfo, commands: &mut impl CommandBufferManager) {
        let mut barrier = PipelineBarrier::new();

        for entry in info.color_targets.iter() {
            self.validate_render_pass_color_entry(&mut barrier, entry);
            if entry.load == LoadAction::Load {
                barrier.src_stage_mask |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
                barrier.dst_stage_mask |= vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
                add_memory_barrier(
                    &mut barrier.memory_barrier,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                );
            }
        }

        if let Some(ref entry) = info.depth_stencil {
            self.validate_render_pass_depth_entry(&mut barrier, entry);
            if entry.depth.is_read() || entry.stencil.is_read() {
                let stages =
                    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
                let access = vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
                barrier.src_stage_mask |= stages;
                barrier.dst_stage_mask |= stages;
                add_memory_barrier(&mut barrier.memory_barrier, access, access);
            }
        }

        if let Some(ref foveation) = info.foveation {
            self.fix_attachment_layout(
                &mut barrier,
                foveation.as_ref(),
                0,
                0,
                vk::ImageLayout::FRAGMENT_DENSITY_MAP_OPTIMAL_EXT,
            );
        }

        barrier.execute(commands);
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Render pass and framebuffer caches

    /// Returns a render pass compatible with the specified layout, creating it if necessary.
    pub fn get_or_create_render_pass(
        &mut self,
        factory: &mut impl RenderObjectFactory,
        layout: &RenderTargetLayout,
    ) -> Result<vk::RenderPass, Error> {
        let key = layout.render_pass_compatible_hash();
        if let Some(render_pass) = self.render_passes.get(&key) {
            return Ok(*render_pass);
        }
        let render_pass = factory.create_render_pass(layout)?;
        debug!("created render pass {:?} for {:?}", render_pass, layout);
        self.render_passes.insert(key, render_pass);
        Ok(render_pass)
    }

    /// Returns a framebuffer for the specified render targets, creating it if necessary.
    pub fn get_or_create_framebuffer(
        &mut self,
        factory: &mut impl RenderObjectFactory,
        targets: &RenderTargets,
        layout: &RenderTargetLayout,
        render_pass: vk::RenderPass,
    ) -> Result<FramebufferId, Error> {
        let key = targets.framebuffer_key(layout);
        let ids = self.framebuffers_by_key.entry(key).or_default();

        if let Some(id) = ids.iter().copied().find(|id| self.framebuffers[*id].matches(targets)) {
            return Ok(id);
        }

        let handle = factory.create_framebuffer(targets, layout, render_pass)?;
        debug!("created framebuffer {:?} ({} color targets)", handle, targets.color.len());
        let id = self.framebuffers.insert(Framebuffer {
            handle,
            render_pass,
            targets: targets.clone(),
        });
        ids.push(id);
        Ok(id)
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Option<&Framebuffer> {
        self.framebuffers.get(id)
    }

    /// Marks the framebuffer as the one used by the current render pass.
    pub fn begin_render_pass(&mut self, id: FramebufferId) {
        assert!(self.framebuffers.contains_key(id), "unknown framebuffer");
        assert!(self.current_framebuffer.is_none(), "a render pass is already active");
        self.current_framebuffer = Some(id);
    }

    pub fn end_render_pass(&mut self) {
        assert!(self.current_framebuffer.take().is_some(), "no render pass is active");
    }

    /// The framebuffer of the current render pass. `None` if no render pass is active, or if its
    /// framebuffer was destroyed.
    pub fn current_framebuffer(&self) -> Option<FramebufferId> {
        self.current_framebuffer
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////

    /// Releases the cached render passes and framebuffers.
    ///
    /// If `immediate` is specified, the objects are moved into its caches instead of being
    /// destroyed.
    pub fn destroy(&mut self, factory: &mut impl RenderObjectFactory, immediate: Option<&mut LayoutManager>) {
        self.current_framebuffer = None;
        let render_passes = std::mem::take(&mut self.render_passes);
        let mut framebuffers = std::mem::replace(&mut self.framebuffers, SlotMap::with_key());
        let framebuffers_by_key = std::mem::take(&mut self.framebuffers_by_key);

        match immediate {
            Some(immediate) => {
                debug!(
                    "donating {} render passes and {} framebuffers",
                    render_passes.len(),
                    framebuffers.len()
                );
                // duplicates of render passes already owned by `immediate`
                let mut replaced: FxHashMap<vk::RenderPass, vk::RenderPass> = FxHashMap::default();
                for (key, render_pass) in render_passes {
                    match immediate.render_passes.entry(key) {
                        Entry::Occupied(entry) => {
                            replaced.insert(render_pass, *entry.get());
                            factory.destroy_render_pass(render_pass);
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(render_pass);
                        }
                    }
                }
                for (key, ids) in framebuffers_by_key {
                    for id in ids {
                        if let Some(mut framebuffer) = framebuffers.remove(id) {
                            if let Some(&surviving) = replaced.get(&framebuffer.render_pass) {
                                framebuffer.render_pass = surviving;
                            }
                            let new_id = immediate.framebuffers.insert(framebuffer);
                            immediate.framebuffers_by_key.entry(key).or_default().push(new_id);
                        }
                    }
                }
            }
            None => {
                debug!(
                    "destroying {} render passes and {} framebuffers",
                    render_passes.len(),
                    framebuffers.len()
                );
                for (_, framebuffer) in framebuffers.drain() {
                    factory.destroy_framebuffer(framebuffer.handle);
                }
                for (_, render_pass) in render_passes {
                    factory.destroy_render_pass(render_pass);
                }
            }
        }
    }
}
