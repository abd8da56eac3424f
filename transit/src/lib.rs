//! Resource state transitions and image layout tracking for Vulkan.
//!
//! Converts engine-level access intents (`Access`) into pipeline barriers, tracks the layout of
//! every subresource of every image, and performs queue ownership transfers between the graphics
//! and async compute queues.
pub use ash::{self, vk};

pub use access::*;
pub use barrier::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use executor::*;
pub use framebuffer::*;
pub use layout::*;
pub use layout_manager::*;
pub use render_pass::*;
pub use resource::*;
pub use transition::*;

mod access;
mod barrier;
mod command;
mod config;
mod error;
mod executor;
mod framebuffer;
mod layout;
mod layout_manager;
mod render_pass;
mod resource;
mod transition;

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Returns whether the aspect mask designates a depth and/or stencil image.
pub fn is_depth_or_stencil_aspect(aspects: vk::ImageAspectFlags) -> bool {
    aspects.intersects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_or_stencil_aspects() {
        assert!(is_depth_or_stencil_aspect(vk::ImageAspectFlags::DEPTH));
        assert!(is_depth_or_stencil_aspect(vk::ImageAspectFlags::STENCIL));
        assert!(!is_depth_or_stencil_aspect(vk::ImageAspectFlags::COLOR));
    }
}
