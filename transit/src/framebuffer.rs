//! Render pass and framebuffer objects cached by the layout manager.
use crate::vk;
use ash::prelude::VkResult;
use fxhash::FxHasher;
use slotmap::new_key_type;
use std::hash::{Hash, Hasher};

new_key_type! {
    /// Identifies a framebuffer cached by a `LayoutManager`.
    pub struct FramebufferId;
}

/// Formats and sample count of the attachments of a render pass.
///
/// Render passes with the same layout are compatible, and can be used with the same framebuffers.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RenderTargetLayout {
    pub color_formats: Vec<vk::Format>,
    pub resolve: bool,
    pub depth_stencil_format: Option<vk::Format>,
    pub samples: u32,
    pub extent: vk::Extent2D,
    pub layers: u32,
}

impl RenderTargetLayout {
    /// Hash of the properties that determine render pass compatibility.
    pub fn render_pass_compatible_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.color_formats.hash(&mut hasher);
        self.resolve.hash(&mut hasher);
        self.depth_stencil_format.hash(&mut hasher);
        self.samples.hash(&mut hasher);
        hasher.finish()
    }
}

/// One mip level of one array layer of an image, used as an attachment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RenderTargetView {
    pub image: vk::Image,
    pub mip_index: u32,
    pub array_slice: u32,
}

/// Images bound to a framebuffer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RenderTargets {
    pub color: Vec<RenderTargetView>,
    pub resolve: Vec<vk::Image>,
    pub depth_stencil: Option<vk::Image>,
}

impl RenderTargets {
    /// Cache key of a framebuffer: the render pass compatibility hash, combined with the mip
    /// level and array layer of each color target.
    pub(crate) fn framebuffer_key(&self, layout: &RenderTargetLayout) -> u64 {
        let mut hasher = FxHasher::default();
        layout.render_pass_compatible_hash().hash(&mut hasher);
        for view in self.color.iter() {
            ((view.array_slice as u64) << 32 | view.mip_index as u64).hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn contains_image(&self, image: vk::Image) -> bool {
        self.color.iter().any(|view| view.image == image)
            || self.resolve.contains(&image)
            || self.depth_stencil == Some(image)
    }
}

/// A cached framebuffer.
#[derive(Clone, Debug)]
pub struct Framebuffer {
    pub handle: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub targets: RenderTargets,
}

impl Framebuffer {
    pub fn matches(&self, targets: &RenderTargets) -> bool {
        self.targets == *targets
    }

    pub fn contains_render_target(&self, image: vk::Image) -> bool {
        self.targets.contains_image(image)
    }
}

/// Creates and destroys the render pass and framebuffer objects of the caches.
pub trait RenderObjectFactory {
    fn create_render_pass(&mut self, layout: &RenderTargetLayout) -> VkResult<vk::RenderPass>;

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &mut self,
        targets: &RenderTargets,
        layout: &RenderTargetLayout,
        render_pass: vk::RenderPass,
    ) -> VkResult<vk::Framebuffer>;

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);
}
