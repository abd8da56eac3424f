mod common;

use common::{init_tracing, texture_ref, CountingSemaphorePool, MockTexture, RecordingCommands};
use transit::{
    vk, Access, ColorEntry, DepthStencilAccess, DepthStencilEntry, LayoutManager, LoadAction, Pipeline,
    QueueFamilies, RenderPassInfo, Texture, TransitionBuilder, TransitionConfig, TransitionExecutor, TransitionInfo,
};

fn color_entry(texture: &std::rc::Rc<MockTexture>, load: LoadAction) -> ColorEntry {
    ColorEntry {
        render_target: texture_ref(texture),
        resolve_target: None,
        mip_index: 0,
        array_slice: 0,
        load,
    }
}

#[test]
fn attachments_are_moved_to_attachment_layouts() {
    init_tracing();
    let mut layouts = LayoutManager::new(TransitionConfig::default());
    let mut commands = RecordingCommands::new();
    let color = MockTexture::color(1, 1, 1);
    let resolve = MockTexture::color(2, 1, 1);
    let depth = MockTexture::depth_stencil(3);
    let density_map = MockTexture::color(4, 1, 1);

    let info = RenderPassInfo {
        color_targets: vec![ColorEntry {
            resolve_target: Some(texture_ref(&resolve)),
            ..color_entry(&color, LoadAction::Load)
        }],
        depth_stencil: Some(DepthStencilEntry {
            target: texture_ref(&depth),
            depth: DepthStencilAccess::Read,
            stencil: DepthStencilAccess::None,
        }),
        foveation: Some(texture_ref(&density_map)),
    };
    layouts.prepare_render_pass(&info, &mut commands);

    let barriers = commands.barriers();
    assert_eq!(barriers.len(), 1);
    let barrier = barriers[0];

    let new_layouts: Vec<_> = barrier
        .image_barriers
        .iter()
        .map(|b| (b.image, b.old_layout, b.new_layout))
        .collect();
    assert_eq!(
        new_layouts,
        vec![
            (
                color.image(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
            (
                resolve.image(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            ),
            (
                depth.image(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            ),
            (
                density_map.image(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::FRAGMENT_DENSITY_MAP_OPTIMAL_EXT
            ),
        ]
    );

    // loaded color and read depth must not be reordered with previous passes
    assert_eq!(barrier.memory_barriers.len(), 1);
    assert!(barrier.memory_barriers[0].src_access_mask.contains(
        vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
    ));
    assert!(barrier
        .src_stage_mask
        .contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    assert!(barrier
        .dst_stage_mask
        .contains(vk::PipelineStageFlags::FRAGMENT_DENSITY_PROCESS_EXT));

    assert_eq!(
        layouts.layout(depth.image()).unwrap().main_layout(),
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    );
    assert_eq!(
        *density_map.transitions.borrow(),
        vec![vk::ImageLayout::FRAGMENT_DENSITY_MAP_OPTIMAL_EXT]
    );

    // second time: only the dependency between passes remains
    commands.clear();
    layouts.prepare_render_pass(&info, &mut commands);
    let barriers = commands.barriers();
    assert_eq!(barriers.len(), 1);
    assert!(barriers[0].image_barriers.is_empty());
    assert_eq!(barriers[0].memory_barriers.len(), 1);
}

#[test]
fn depth_write_layouts() {
    let cases = [
        (
            DepthStencilAccess::Write,
            DepthStencilAccess::Write,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        (
            DepthStencilAccess::Write,
            DepthStencilAccess::None,
            vk::ImageLayout::DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
        ),
        (
            DepthStencilAccess::None,
            DepthStencilAccess::Write,
            vk::ImageLayout::DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
        ),
    ];

    for (depth, stencil, expected) in cases {
        let mut layouts = LayoutManager::new(TransitionConfig::default());
        let mut commands = RecordingCommands::new();
        let texture = MockTexture::depth_stencil(7);
        let info = RenderPassInfo {
            depth_stencil: Some(DepthStencilEntry {
                target: texture_ref(&texture),
                depth,
                stencil,
            }),
            ..Default::default()
        };
        layouts.prepare_render_pass(&info, &mut commands);
        assert_eq!(commands.image_barriers()[0].new_layout, expected);
        // no depth read: no memory dependency
        assert!(commands.barriers()[0].memory_barriers.is_empty());
    }

    // single-aspect images only have the combined layouts
    let single_aspect_cases = [
        (vk::ImageAspectFlags::DEPTH, DepthStencilAccess::Write, DepthStencilAccess::None),
        (vk::ImageAspectFlags::DEPTH, DepthStencilAccess::Write, DepthStencilAccess::Write),
        (vk::ImageAspectFlags::STENCIL, DepthStencilAccess::None, DepthStencilAccess::Write),
    ];
    for (aspects, depth, stencil) in single_aspect_cases {
        let mut layouts = LayoutManager::new(TransitionConfig::default());
        let mut commands = RecordingCommands::new();
        let texture = MockTexture::new(8, aspects, 1, 1);
        let info = RenderPassInfo {
            depth_stencil: Some(DepthStencilEntry {
                target: texture_ref(&texture),
                depth,
                stencil,
            }),
            ..Default::default()
        };
        layouts.prepare_render_pass(&info, &mut commands);
        assert_eq!(
            commands.image_barriers()[0].new_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }
}

#[test]
fn depth_only_target_written_by_transition_needs_no_fix() {
    init_tracing();
    let mut layouts = LayoutManager::new(TransitionConfig::default());
    let mut commands = RecordingCommands::new();
    let mut semaphores = CountingSemaphorePool::default();
    let depth = MockTexture::new(9, vk::ImageAspectFlags::DEPTH, 1, 1);

    let mut builder = TransitionBuilder::new(Pipeline::Graphics, Pipeline::Graphics, QueueFamilies::default());
    builder.add(TransitionInfo::texture(
        texture_ref(&depth),
        Access::UNKNOWN,
        Access::DSV_WRITE,
    ));
    let transition = builder.build(&mut semaphores).unwrap();
    TransitionExecutor::new(&mut layouts, &mut commands, Pipeline::Graphics)
        .end_transitions([transition])
        .unwrap();
    assert_eq!(
        layouts.layout(depth.image()).unwrap().main_layout(),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
    commands.clear();

    let info = RenderPassInfo {
        depth_stencil: Some(DepthStencilEntry {
            target: texture_ref(&depth),
            depth: DepthStencilAccess::Write,
            stencil: DepthStencilAccess::None,
        }),
        ..Default::default()
    };
    layouts.prepare_render_pass(&info, &mut commands);
    assert!(commands.image_barriers().is_empty());
}

#[test]
fn transitioned_render_targets_need_no_fix() {
    init_tracing();
    let mut layouts = LayoutManager::new(TransitionConfig::default());
    let mut commands = RecordingCommands::new();
    let mut semaphores = CountingSemaphorePool::default();
    let color = MockTexture::color(1, 1, 1);

    let mut builder = TransitionBuilder::new(Pipeline::Graphics, Pipeline::Graphics, QueueFamilies::default());
    builder.add(TransitionInfo::texture(
        texture_ref(&color),
        Access::UNKNOWN,
        Access::RENDER_TARGET,
    ));
    let transition = builder.build(&mut semaphores).unwrap();
    TransitionExecutor::new(&mut layouts, &mut commands, Pipeline::Graphics)
        .end_transitions([transition])
        .unwrap();
    commands.clear();

    let info = RenderPassInfo {
        color_targets: vec![color_entry(&color, LoadAction::Clear)],
        ..Default::default()
    };
    layouts.prepare_render_pass(&info, &mut commands);
    assert!(commands.commands.is_empty());
}

#[test]
fn non_uniform_target_is_fixed_per_subresource() {
    let mut layouts = LayoutManager::new(TransitionConfig::default());
    let mut commands = RecordingCommands::new();
    let color = MockTexture::color(1, 3, 2);

    let info = RenderPassInfo {
        color_targets: vec![ColorEntry {
            mip_index: 1,
            array_slice: 1,
            ..color_entry(&color, LoadAction::DontCare)
        }],
        ..Default::default()
    };
    layouts.prepare_render_pass(&info, &mut commands);

    // uniform image: transitioned as a whole
    let range = commands.image_barriers()[0].subresource_range;
    assert_eq!((range.level_count, range.layer_count), (3, 2));
    commands.clear();

    layouts.get_or_add_full_layout(&*color).set(
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        &transit::PipelineBarrier::make_subresource_range(vk::ImageAspectFlags::COLOR, 1, 1, 1, 1),
    );
    layouts.prepare_render_pass(&info, &mut commands);

    let image_barriers = commands.image_barriers();
    assert_eq!(image_barriers.len(), 1);
    let range = image_barriers[0].subresource_range;
    assert_eq!(
        (range.base_mip_level, range.level_count, range.base_array_layer, range.layer_count),
        (1, 1, 1, 1)
    );
    assert_eq!(image_barriers[0].old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert!(layouts
        .layout(color.image())
        .unwrap()
        .are_all_subresources_same_layout());
}
