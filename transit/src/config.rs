use crate::{vk, Pipeline};

/// Options controlling the behavior of the transition executor.
#[derive(Copy, Clone, Debug)]
pub struct TransitionConfig {
    /// Wrap each `begin_transitions`/`end_transitions` call in a tracing span.
    pub show_transition_events: bool,
    /// Check tracked layouts against the layouts asserted by pending transitions, and check that
    /// transitions are begun and ended on the right pipeline.
    ///
    /// Expensive: scans subresource layouts. Defaults to `cfg!(debug_assertions)`.
    pub verify_layouts: bool,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        TransitionConfig {
            show_transition_events: false,
            verify_layouts: cfg!(debug_assertions),
        }
    }
}

/// Queue family indices of the queues backing each pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub async_compute: u32,
}

impl QueueFamilies {
    /// Both pipelines submit to queues of the same family.
    pub const fn single(family_index: u32) -> QueueFamilies {
        QueueFamilies {
            graphics: family_index,
            async_compute: family_index,
        }
    }

    /// Returns the queue family index of the specified pipeline.
    pub fn family_index(&self, pipeline: Pipeline) -> u32 {
        match pipeline {
            Pipeline::Graphics => self.graphics,
            Pipeline::AsyncCompute => self.async_compute,
        }
    }

    /// Returns the (source, destination) queue family indices to put in barriers transferring
    /// ownership from `src` to `dst`.
    ///
    /// Returns `QUEUE_FAMILY_IGNORED` for both if the pipelines are the same.
    pub fn ownership_transfer(&self, src: Pipeline, dst: Pipeline) -> (u32, u32) {
        if src == dst {
            (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
        } else {
            (self.family_index(src), self.family_index(dst))
        }
    }
}

impl Default for QueueFamilies {
    fn default() -> Self {
        QueueFamilies::single(0)
    }
}
