use crate::vk;

/// Errors returned by the collaborators (submission, semaphore and framebuffer creation).
///
/// Invalid uses of the transition API are not errors: they panic.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Vulkan error")]
    Vulkan(#[from] vk::Result),
}
