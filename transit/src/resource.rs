//! Resources that can be transitioned (textures, buffers and storage views).
use crate::{is_depth_or_stencil_aspect, vk};
use std::{fmt, rc::Rc};

/// Independent execution queue that commands are submitted to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Pipeline {
    Graphics,
    AsyncCompute,
}

/// Kind of resource being transitioned.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Texture,
    VertexBuffer,
    IndexBuffer,
    StructuredBuffer,
    /// Untyped storage view. Resolves to the kind of the resource the view was created from.
    StorageView,
}

/// Interface to the image objects whose layout is tracked.
pub trait Texture: fmt::Debug {
    /// Returns the current image handle.
    ///
    /// The handle may change after `on_layout_transition` is called (e.g. swapchain images that
    /// are acquired lazily).
    fn image(&self) -> vk::Image;

    /// All the aspects of the image.
    fn full_aspect_mask(&self) -> vk::ImageAspectFlags;

    fn mip_levels(&self) -> u32;

    fn array_layers(&self) -> u32;

    /// Images used for CPU readback are not layout-tracked.
    fn is_cpu_readback(&self) -> bool {
        false
    }

    /// Called just before a layout transition of the image is recorded.
    fn on_layout_transition(&self, _new_layout: vk::ImageLayout) {}

    fn is_depth_or_stencil(&self) -> bool {
        is_depth_or_stencil_aspect(self.full_aspect_mask())
    }
}

pub type TextureRef = Rc<dyn Texture>;

/// A resource to transition.
#[derive(Clone, Debug)]
pub enum TransitionResource {
    Texture(TextureRef),
    VertexBuffer(vk::Buffer),
    IndexBuffer(vk::Buffer),
    StructuredBuffer(vk::Buffer),
    StorageView(StorageView),
}

/// An untyped storage view, and the resource it was created from.
#[derive(Clone, Debug)]
pub struct StorageView {
    source: Box<TransitionResource>,
}

impl StorageView {
    /// Creates a storage view over `source`.
    ///
    /// # Panics
    ///
    /// If `source` is itself a storage view.
    pub fn new(source: TransitionResource) -> StorageView {
        assert!(
            !matches!(source, TransitionResource::StorageView(_)),
            "storage views cannot be created from another storage view"
        );
        StorageView {
            source: Box::new(source),
        }
    }

    pub fn source(&self) -> &TransitionResource {
        &self.source
    }
}

/// A transitioned resource, after storage views have been resolved.
#[derive(Clone, Debug)]
pub(crate) enum ResolvedResource {
    Texture(TextureRef),
    Buffer(vk::Buffer),
}

impl TransitionResource {
    /// Returns the underlying resource and its kind. Storage views resolve to their source.
    pub(crate) fn resolve(&self) -> (ResolvedResource, ResourceKind) {
        match self {
            TransitionResource::Texture(texture) => (ResolvedResource::Texture(texture.clone()), ResourceKind::Texture),
            TransitionResource::VertexBuffer(buffer) => (ResolvedResource::Buffer(*buffer), ResourceKind::VertexBuffer),
            TransitionResource::IndexBuffer(buffer) => (ResolvedResource::Buffer(*buffer), ResourceKind::IndexBuffer),
            TransitionResource::StructuredBuffer(buffer) => {
                (ResolvedResource::Buffer(*buffer), ResourceKind::StructuredBuffer)
            }
            TransitionResource::StorageView(view) => view.source.resolve(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Describe a subresource range of an image.
///
/// An empty `aspect_mask` designates all the aspects of the image. Counts equal to
/// `vk::REMAINING_MIP_LEVELS` or `vk::REMAINING_ARRAY_LAYERS` designate all the remaining
/// mip levels or array layers, whatever the size of the image.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ImageSubresourceRange {
    pub aspect_mask: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl ImageSubresourceRange {
    /// All aspects, mip levels and array layers.
    pub const ALL: ImageSubresourceRange = ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::empty(),
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    };

    /// One mip level in all array layers.
    pub const fn mip(mip_level: u32) -> ImageSubresourceRange {
        ImageSubresourceRange {
            base_mip_level: mip_level,
            level_count: 1,
            ..Self::ALL
        }
    }

    /// One mip level of one array layer.
    pub const fn subresource(array_layer: u32, mip_level: u32) -> ImageSubresourceRange {
        ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::empty(),
            base_mip_level: mip_level,
            level_count: 1,
            base_array_layer: array_layer,
            layer_count: 1,
        }
    }

    /// Restricts the range to the specified aspects (e.g. the depth plane of a depth-stencil image).
    pub const fn with_aspects(self, aspect_mask: vk::ImageAspectFlags) -> ImageSubresourceRange {
        ImageSubresourceRange { aspect_mask, ..self }
    }

    /// Whether the range designates all the aspects of the image.
    pub fn is_all_aspects(&self) -> bool {
        self.aspect_mask.is_empty()
    }

    /// Converts to a `vk::ImageSubresourceRange`, replacing an empty aspect mask by `full_aspect_mask`.
    pub fn to_vk(&self, full_aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: if self.is_all_aspects() {
                full_aspect_mask
            } else {
                self.aspect_mask
            },
            base_mip_level: self.base_mip_level,
            level_count: self.level_count,
            base_array_layer: self.base_array_layer,
            layer_count: self.layer_count,
        }
    }
}

impl Default for ImageSubresourceRange {
    fn default() -> Self {
        ImageSubresourceRange::ALL
    }
}
