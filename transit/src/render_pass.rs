//! Description of the attachments of a render pass, for layout validation on pass entry.
use crate::TextureRef;

/// What happens to the contents of an attachment at the beginning of a render pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum LoadAction {
    #[default]
    DontCare,
    Clear,
    Load,
}

/// Access to the depth or stencil aspect of a depth-stencil attachment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum DepthStencilAccess {
    #[default]
    None,
    Read,
    Write,
}

impl DepthStencilAccess {
    pub fn is_read(self) -> bool {
        self == DepthStencilAccess::Read
    }

    pub fn is_write(self) -> bool {
        self == DepthStencilAccess::Write
    }
}

/// A color attachment.
#[derive(Clone, Debug)]
pub struct ColorEntry {
    pub render_target: TextureRef,
    /// Multisample resolve target.
    pub resolve_target: Option<TextureRef>,
    pub mip_index: u32,
    pub array_slice: u32,
    pub load: LoadAction,
}

/// The depth-stencil attachment.
#[derive(Clone, Debug)]
pub struct DepthStencilEntry {
    pub target: TextureRef,
    pub depth: DepthStencilAccess,
    pub stencil: DepthStencilAccess,
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassInfo {
    pub color_targets: Vec<ColorEntry>,
    pub depth_stencil: Option<DepthStencilEntry>,
    /// Fragment density map.
    pub foveation: Option<TextureRef>,
}
