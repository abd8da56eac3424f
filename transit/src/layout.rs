//! Per-subresource image layout tracking.
use crate::vk;

/// Current layout of every subresource of an image.
///
/// Holds a single layout when all subresources are in the same layout (the common case), and
/// a dense `layer * mip` table otherwise.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageLayout {
    num_mips: u32,
    num_layers: u32,
    main_layout: vk::ImageLayout,
    /// Indexed by `layer * num_mips + mip`. Empty when all subresources are in `main_layout`.
    subres_layouts: Vec<vk::ImageLayout>,
}

impl ImageLayout {
    pub fn new(initial_layout: vk::ImageLayout, num_mips: u32, num_layers: u32) -> ImageLayout {
        assert!(num_mips > 0 && num_layers > 0, "image has no subresources");
        ImageLayout {
            num_mips,
            num_layers,
            main_layout: initial_layout,
            subres_layouts: Vec::new(),
        }
    }

    pub fn num_mips(&self) -> u32 {
        self.num_mips
    }

    pub fn num_layers(&self) -> u32 {
        self.num_layers
    }

    /// Whether all subresources are in the same layout.
    pub fn are_all_subresources_same_layout(&self) -> bool {
        self.subres_layouts.is_empty()
    }

    /// Layout of the whole image.
    ///
    /// # Panics
    ///
    /// If the subresources are not all in the same layout.
    pub fn main_layout(&self) -> vk::ImageLayout {
        assert!(
            self.are_all_subresources_same_layout(),
            "image subresources are not all in the same layout"
        );
        self.main_layout
    }

    pub fn subresource_layout(&self, layer: u32, mip: u32) -> vk::ImageLayout {
        assert!(layer < self.num_layers && mip < self.num_mips, "subresource out of range");
        if self.subres_layouts.is_empty() {
            self.main_layout
        } else {
            self.subres_layouts[(layer * self.num_mips + mip) as usize]
        }
    }

    /// Number of mip levels in `range`, resolving `vk::REMAINING_MIP_LEVELS`.
    pub fn range_mip_count(&self, range: &vk::ImageSubresourceRange) -> u32 {
        if range.level_count == vk::REMAINING_MIP_LEVELS {
            self.num_mips - range.base_mip_level
        } else {
            range.level_count
        }
    }

    /// Number of array layers in `range`, resolving `vk::REMAINING_ARRAY_LAYERS`.
    pub fn range_layer_count(&self, range: &vk::ImageSubresourceRange) -> u32 {
        if range.layer_count == vk::REMAINING_ARRAY_LAYERS {
            self.num_layers - range.base_array_layer
        } else {
            range.layer_count
        }
    }

    /// Whether every subresource in `range` is in `layout`.
    pub fn are_subresources_same_layout(&self, layout: vk::ImageLayout, range: &vk::ImageSubresourceRange) -> bool {
        if self.subres_layouts.is_empty() {
            return self.main_layout == layout;
        }

        let first_layer = range.base_array_layer;
        let last_layer = first_layer + self.range_layer_count(range);
        let first_mip = range.base_mip_level;
        let last_mip = first_mip + self.range_mip_count(range);

        (first_layer..last_layer).all(|layer| {
            (first_mip..last_mip).all(|mip| self.subres_layouts[(layer * self.num_mips + mip) as usize] == layout)
        })
    }

    /// Sets the layout of the subresources in `range`.
    pub fn set(&mut self, layout: vk::ImageLayout, range: &vk::ImageSubresourceRange) {
        let first_layer = range.base_array_layer;
        let layer_count = self.range_layer_count(range);
        let first_mip = range.base_mip_level;
        let mip_count = self.range_mip_count(range);
        assert!(
            first_layer + layer_count <= self.num_layers && first_mip + mip_count <= self.num_mips,
            "subresource range out of bounds: {:?}",
            range
        );

        if first_layer == 0 && layer_count == self.num_layers && first_mip == 0 && mip_count == self.num_mips {
            self.main_layout = layout;
            self.subres_layouts.clear();
            return;
        }

        if self.subres_layouts.is_empty() {
            self.subres_layouts = vec![self.main_layout; (self.num_layers * self.num_mips) as usize];
        }

        for layer in first_layer..first_layer + layer_count {
            let start = (layer * self.num_mips + first_mip) as usize;
            self.subres_layouts[start..start + mip_count as usize].fill(layout);
        }

        self.collapse_if_same();
    }

    fn collapse_if_same(&mut self) {
        let Some((&first, rest)) = self.subres_layouts.split_first() else {
            return;
        };
        if rest.iter().all(|&layout| layout == first) {
            self.main_layout = first;
            self.subres_layouts.clear();
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////

/// Returns the accesses that may have been performed on an image in the specified layout.
///
/// # Panics
///
/// If the layout is not one that tracked images can be in.
pub fn access_mask_for_layout(layout: vk::ImageLayout) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL => {
            vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => {
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        }
        vk::ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::MEMORY_READ,
        vk::ImageLayout::FRAGMENT_DENSITY_MAP_OPTIMAL_EXT => vk::AccessFlags::FRAGMENT_DENSITY_MAP_READ_EXT,
        vk::ImageLayout::GENERAL | vk::ImageLayout::UNDEFINED => vk::AccessFlags::empty(),
        _ => panic!("unexpected image layout: {:?}", layout),
    }
}

/// Returns the pipeline stages that may have accessed an image in the specified layout.
///
/// # Panics
///
/// If the layout is not one that tracked images can be in.
pub fn stage_flags_for_layout(layout: vk::ImageLayout) -> vk::PipelineStageFlags {
    match layout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::TRANSFER_DST_OPTIMAL => {
            vk::PipelineStageFlags::TRANSFER
        }
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::STENCIL_ATTACHMENT_OPTIMAL => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL
        | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL
        | vk::ImageLayout::STENCIL_READ_ONLY_OPTIMAL => {
            vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        vk::ImageLayout::PRESENT_SRC_KHR => vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::ImageLayout::FRAGMENT_DENSITY_MAP_OPTIMAL_EXT => vk::PipelineStageFlags::FRAGMENT_DENSITY_PROCESS_EXT,
        vk::ImageLayout::GENERAL | vk::ImageLayout::UNDEFINED => vk::PipelineStageFlags::TOP_OF_PIPE,
        _ => panic!("unexpected image layout: {:?}", layout),
    }
}
