//! Exposes the settings a render graph is compiled with.

use ash::vk;

/// Settings used by every compile of a [`RenderGraph`](crate::RenderGraph).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Initial canvas size. Canvas sized resources follow this, change it later with
    /// [`RenderGraph::set_canvas_size()`](crate::RenderGraph::set_canvas_size).
    pub canvas: vk::Extent2D,
    /// Let resources that are never alive at the same time share memory.
    pub aliasing: bool,
    /// Merge consecutive compatible graphics passes into subpasses of a single render pass.
    pub subpass_merging: bool,
    /// Back attachment-only images with lazily allocated memory, if the device supports it.
    pub lazy_allocation: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            canvas: vk::Extent2D {
                width: 1,
                height: 1,
            },
            aliasing: true,
            subpass_merging: true,
            lazy_allocation: true,
        }
    }
}

/// The config builder is a convenience struct to easily create a [`GraphConfig`].
///
/// For information about each of the fields, see [`GraphConfig`]
/// # Example
/// ```
/// # use vkrg::prelude::*;
/// let config = GraphConfigBuilder::new()
///     .canvas(1920, 1080)
///     .aliasing(false)
///     .build();
/// assert!(config.subpass_merging);
/// ```
#[derive(Debug, Default)]
pub struct GraphConfigBuilder {
    inner: GraphConfig,
}

impl GraphConfigBuilder {
    /// Create a new config builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(mut self, width: u32, height: u32) -> Self {
        self.inner.canvas = vk::Extent2D {
            width,
            height,
        };
        self
    }

    pub fn aliasing(mut self, enabled: bool) -> Self {
        self.inner.aliasing = enabled;
        self
    }

    pub fn subpass_merging(mut self, enabled: bool) -> Self {
        self.inner.subpass_merging = enabled;
        self
    }

    pub fn lazy_allocation(mut self, enabled: bool) -> Self {
        self.inner.lazy_allocation = enabled;
        self
    }

    /// Build the resulting config.
    pub fn build(self) -> GraphConfig {
        self.inner
    }
}
