//! Mapping of access intents to pipeline stages, access masks and image layouts.
use crate::{vk, ResourceKind};
use bitflags::bitflags;

bitflags! {
    /// How a resource is accessed before or after a transition.
    ///
    /// `PRESENT`, `RENDER_TARGET`, `COPY_DEST`, `RESOLVE_DST`, `CPU_READ`, `READABLE`, `WRITABLE`
    /// and `RW_BARRIER` are exclusive: they must be used alone. The other flags can be combined.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const CPU_READ = 1 << 0;
        const PRESENT = 1 << 1;
        const INDIRECT_ARGS = 1 << 2;
        const VERTEX_OR_INDEX_BUFFER = 1 << 3;
        const SRV_COMPUTE = 1 << 4;
        const SRV_GRAPHICS = 1 << 5;
        const COPY_SRC = 1 << 6;
        const RESOLVE_SRC = 1 << 7;
        const DSV_READ = 1 << 8;
        const UAV_COMPUTE = 1 << 9;
        const UAV_GRAPHICS = 1 << 10;
        const RENDER_TARGET = 1 << 11;
        const COPY_DEST = 1 << 12;
        const RESOLVE_DST = 1 << 13;
        const DSV_WRITE = 1 << 14;
        /// Any read by a shader or a depth test. The source layout is taken from the tracked state.
        const READABLE = 1 << 15;
        /// Any write by a shader, attachment or depth test. The source layout is taken from the tracked state.
        const WRITABLE = 1 << 16;
        /// Read/write storage access in any shader stage.
        const RW_BARRIER = 1 << 17;

        const SRV_MASK = Self::SRV_COMPUTE.bits() | Self::SRV_GRAPHICS.bits();
        const UAV_MASK = Self::UAV_COMPUTE.bits() | Self::UAV_GRAPHICS.bits();
    }
}

impl Access {
    /// Unknown previous access. Only valid as the source of a transition.
    pub const UNKNOWN: Access = Access::empty();

    /// Writing to a render target while resolving it through a resolve attachment.
    pub const RESOLVE_ATTACHMENT: Access = Access::RENDER_TARGET.union(Access::RESOLVE_DST);

    /// Accesses that can appear in the access of a single aspect of a depth-stencil image.
    pub const DEPTH_STENCIL_ASPECT_MASK: Access = Access::DSV_WRITE
        .union(Access::DSV_READ)
        .union(Access::SRV_MASK)
        .union(Access::UAV_MASK);
}

/// Pipeline stages, access mask and layout corresponding to an access intent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResourceState {
    /// Stages that access the resource.
    pub stages: vk::PipelineStageFlags,
    /// Access flags for the resource.
    pub access: vk::AccessFlags,
    /// Layout that the image is in, or `None` if it must be taken from the tracked layout.
    pub layout: Option<vk::ImageLayout>,
}

const ALL_SHADER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER.as_raw()
        | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER.as_raw()
        | vk::PipelineStageFlags::GEOMETRY_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
);

const FRAGMENT_TESTS: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS.as_raw(),
);

const SHADER_READ_WRITE: vk::AccessFlags =
    vk::AccessFlags::from_raw(vk::AccessFlags::SHADER_READ.as_raw() | vk::AccessFlags::SHADER_WRITE.as_raw());

const DEPTH_STENCIL_READ_WRITE: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw() | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
);

impl ResourceState {
    const fn new(stages: vk::PipelineStageFlags, access: vk::AccessFlags, layout: vk::ImageLayout) -> ResourceState {
        ResourceState {
            stages,
            access,
            layout: Some(layout),
        }
    }

    /// State used when nothing is known about the previous accesses: waits for everything.
    pub const UNKNOWN: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags::ALL_COMMANDS,
        access: vk::AccessFlags::from_raw(
            vk::AccessFlags::MEMORY_READ.as_raw() | vk::AccessFlags::MEMORY_WRITE.as_raw(),
        ),
        layout: None,
    };
    pub const CPU_READ: ResourceState = ResourceState::new(
        vk::PipelineStageFlags::HOST,
        vk::AccessFlags::HOST_READ,
        vk::ImageLayout::GENERAL,
    );
    pub const RENDER_TARGET: ResourceState = ResourceState::new(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags::from_raw(
            vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );
    pub const TRANSFER_DST: ResourceState = ResourceState::new(
        vk::PipelineStageFlags::TRANSFER,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );
    pub const DEPTH_STENCIL_ATTACHMENT: ResourceState = ResourceState::new(
        FRAGMENT_TESTS,
        DEPTH_STENCIL_READ_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );
}

/// Layout of images read by shaders.
fn srv_layout(is_depth_stencil: bool) -> vk::ImageLayout {
    if is_depth_stencil {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }
}

/// Returns the pipeline stages, access mask and layout corresponding to an access intent.
///
/// `is_source` selects whether `access` describes the state before (`true`) or after (`false`)
/// the transition.
///
/// # Panics
///
/// * if `access` is `UNKNOWN` and `is_source` is false
/// * if an exclusive access is combined with another access
/// * if the access is invalid for the kind of resource (e.g. `VERTEX_OR_INDEX_BUFFER` on a texture,
///   or `DSV_READ` on an image that has no depth or stencil)
pub fn classify(access: Access, kind: ResourceKind, is_depth_stencil: bool, is_source: bool) -> ResourceState {
    let access = if access == Access::RESOLVE_ATTACHMENT {
        Access::RENDER_TARGET
    } else {
        access
    };

    if access == Access::UNKNOWN {
        assert!(is_source, "the destination access of a transition cannot be unknown");
        return ResourceState::UNKNOWN;
    }
    if access == Access::CPU_READ {
        return ResourceState::CPU_READ;
    }
    if access == Access::PRESENT {
        return ResourceState {
            stages: if is_source {
                vk::PipelineStageFlags::TOP_OF_PIPE
            } else {
                vk::PipelineStageFlags::BOTTOM_OF_PIPE
            },
            access: vk::AccessFlags::empty(),
            layout: Some(vk::ImageLayout::PRESENT_SRC_KHR),
        };
    }
    if access == Access::RENDER_TARGET {
        return ResourceState::RENDER_TARGET;
    }
    if access == Access::COPY_DEST || access == Access::RESOLVE_DST {
        return ResourceState::TRANSFER_DST;
    }
    if access == Access::READABLE {
        return ResourceState {
            stages: ALL_SHADER_STAGES | FRAGMENT_TESTS | vk::PipelineStageFlags::COMPUTE_SHADER,
            access: vk::AccessFlags::MEMORY_READ,
            layout: (!is_source).then(|| srv_layout(is_depth_stencil)),
        };
    }
    if access == Access::WRITABLE {
        return ResourceState {
            stages: ALL_SHADER_STAGES
                | FRAGMENT_TESTS
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::COMPUTE_SHADER,
            access: vk::AccessFlags::MEMORY_WRITE,
            layout: (!is_source).then_some(vk::ImageLayout::GENERAL),
        };
    }
    if access == Access::RW_BARRIER {
        return ResourceState::new(
            ALL_SHADER_STAGES | vk::PipelineStageFlags::COMPUTE_SHADER,
            SHADER_READ_WRITE,
            vk::ImageLayout::GENERAL,
        );
    }

    // Composable accesses. The layout is chosen by priority, so that the result does not depend
    // on the order in which flags are visited: depth-stencil write, then storage (GENERAL), then
    // shader or depth reads, then copy source.
    let is_texture = kind == ResourceKind::Texture;
    let mut stages = vk::PipelineStageFlags::empty();
    let mut access_mask = vk::AccessFlags::empty();
    let mut processed = Access::empty();

    let mut depth_stencil_write = false;
    let mut storage = false;
    let mut shader_read = false;

    if access.contains(Access::DSV_WRITE) {
        assert!(is_depth_stencil, "DSV_WRITE access on a resource without depth or stencil");
        stages |= FRAGMENT_TESTS;
        access_mask |= DEPTH_STENCIL_READ_WRITE;
        depth_stencil_write = true;
        processed |= Access::DSV_WRITE;
    }

    if access.contains(Access::INDIRECT_ARGS) {
        assert!(!is_texture, "INDIRECT_ARGS access on a texture");
        stages |= vk::PipelineStageFlags::DRAW_INDIRECT;
        access_mask |= vk::AccessFlags::INDIRECT_COMMAND_READ;
        processed |= Access::INDIRECT_ARGS;
    }

    if access.contains(Access::VERTEX_OR_INDEX_BUFFER) {
        stages |= vk::PipelineStageFlags::VERTEX_INPUT;
        access_mask |= match kind {
            ResourceKind::IndexBuffer => vk::AccessFlags::INDEX_READ,
            ResourceKind::VertexBuffer => vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            _ => panic!("VERTEX_OR_INDEX_BUFFER access on a resource of kind {:?}", kind),
        };
        processed |= Access::VERTEX_OR_INDEX_BUFFER;
    }

    if access.contains(Access::DSV_READ) {
        assert!(is_depth_stencil, "DSV_READ access on a resource without depth or stencil");
        stages |= FRAGMENT_TESTS;
        access_mask |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
        shader_read = true;
        processed |= Access::DSV_READ;
    }

    if access.contains(Access::SRV_GRAPHICS) {
        stages |= ALL_SHADER_STAGES;
        access_mask |= vk::AccessFlags::SHADER_READ;
        shader_read = true;
        processed |= Access::SRV_GRAPHICS;
    }

    if access.contains(Access::SRV_COMPUTE) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
        access_mask |= vk::AccessFlags::SHADER_READ;
        shader_read = true;
        processed |= Access::SRV_COMPUTE;
    }

    if access.contains(Access::UAV_GRAPHICS) {
        stages |= ALL_SHADER_STAGES;
        access_mask |= SHADER_READ_WRITE;
        storage = true;
        processed |= Access::UAV_GRAPHICS;
    }

    if access.contains(Access::UAV_COMPUTE) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
        access_mask |= SHADER_READ_WRITE;
        storage = true;
        processed |= Access::UAV_COMPUTE;
    }

    let copy_src = access.intersects(Access::COPY_SRC | Access::RESOLVE_SRC);
    if copy_src {
        stages |= vk::PipelineStageFlags::TRANSFER;
        access_mask |= vk::AccessFlags::TRANSFER_READ;
        processed |= access & (Access::COPY_SRC | Access::RESOLVE_SRC);
    }

    let remaining = access.difference(processed);
    assert!(
        remaining.is_empty(),
        "some access flags were not processed: access={:?}, remaining={:?}",
        access,
        remaining
    );

    let layout = if depth_stencil_write {
        Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    } else if storage {
        Some(vk::ImageLayout::GENERAL)
    } else if shader_read {
        Some(srv_layout(is_depth_stencil))
    } else {
        None
    };

    let layout = if copy_src && is_texture {
        assert!(
            layout.is_none(),
            "COPY_SRC access on a texture cannot be combined with accesses requiring another layout: {:?}",
            access
        );
        Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
    } else {
        layout
    };

    ResourceState {
        stages,
        access: access_mask,
        layout,
    }
}

/// Returns the pipeline stages, access mask and layout of a combined depth-stencil image whose
/// depth and stencil aspects have separate accesses.
///
/// # Panics
///
/// If one of the accesses contains flags that are not valid on a single aspect of a
/// depth-stencil image.
pub fn classify_depth_stencil(depth: Access, stencil: Access, is_source: bool) -> ResourceState {
    if depth == Access::UNKNOWN || stencil == Access::UNKNOWN {
        assert!(is_source, "the destination access of a transition cannot be unknown");
        return ResourceState::UNKNOWN;
    }

    let layout = match (depth.contains(Access::DSV_WRITE), stencil.contains(Access::DSV_WRITE)) {
        (true, true) => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        (true, false) => vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
        (false, true) => vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
        (false, false) => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    };

    let combined = depth | stencil;
    let mut stages = vk::PipelineStageFlags::empty();
    let mut access_mask = vk::AccessFlags::empty();

    if combined.contains(Access::DSV_WRITE) {
        stages |= FRAGMENT_TESTS;
        access_mask |= DEPTH_STENCIL_READ_WRITE;
    }
    if combined.contains(Access::DSV_READ) {
        stages |= FRAGMENT_TESTS;
        access_mask |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if combined.contains(Access::SRV_GRAPHICS) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER;
        access_mask |= vk::AccessFlags::SHADER_READ;
    }
    if combined.contains(Access::UAV_GRAPHICS) {
        stages |= vk::PipelineStageFlags::FRAGMENT_SHADER;
        access_mask |= SHADER_READ_WRITE;
    }
    if combined.contains(Access::SRV_COMPUTE) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
        access_mask |= vk::AccessFlags::SHADER_READ;
    }
    if combined.contains(Access::UAV_COMPUTE) {
        stages |= vk::PipelineStageFlags::COMPUTE_SHADER;
        access_mask |= SHADER_READ_WRITE;
    }

    let remaining = combined.difference(Access::DEPTH_STENCIL_ASPECT_MASK);
    assert!(
        remaining.is_empty(),
        "some access flags were not processed: depth={:?}, stencil={:?}, remaining={:?}",
        depth,
        stencil,
        remaining
    );

    ResourceState {
        stages,
        access: access_mask,
        layout: Some(layout),
    }
}
