use crate::graph::key::{GlobalKey, Key};
use crate::graph::resource::ResourceType;

/// Where an [`Alias`] takes its value from.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum AliasSource {
    /// The value a resource holds at the start of the frame, before any pass touched it.
    Raw(GlobalKey),
    /// The value produced by a write input of a pass.
    Output {
        pass: GlobalKey,
        input: Key,
    },
}

/// Non-owning reference to a value of a resource, resolved by key during compilation.
///
/// Aliases are how passes are chained together. A pass that samples the result of a previous pass does not name
/// the image directly, it names the output of the input the previous pass wrote it through:
/// ```
/// use vkrg::prelude::*;
///
/// // The image as it is at the start of the frame.
/// let color = Alias::image("color");
/// // The image after the `draw` pass wrote to it through its `out` input.
/// let drawn = Alias::image_output("draw", Key::new("out"));
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Alias {
    pub(crate) ty: ResourceType,
    pub(crate) source: AliasSource,
}

impl Alias {
    /// Alias to the initial value of an image resource.
    pub fn image(resource: impl Into<GlobalKey>) -> Self {
        Self {
            ty: ResourceType::Image,
            source: AliasSource::Raw(resource.into()),
        }
    }

    /// Alias to the initial value of a buffer resource.
    pub fn buffer(resource: impl Into<GlobalKey>) -> Self {
        Self {
            ty: ResourceType::Buffer,
            source: AliasSource::Raw(resource.into()),
        }
    }

    /// Alias to the image produced by the write input `input` of `pass`.
    pub fn image_output(pass: impl Into<GlobalKey>, input: impl Into<Key>) -> Self {
        Self {
            ty: ResourceType::Image,
            source: AliasSource::Output {
                pass: pass.into(),
                input: input.into(),
            },
        }
    }

    /// Alias to the buffer produced by the write input `input` of `pass`.
    pub fn buffer_output(pass: impl Into<GlobalKey>, input: impl Into<Key>) -> Self {
        Self {
            ty: ResourceType::Buffer,
            source: AliasSource::Output {
                pass: pass.into(),
                input: input.into(),
            },
        }
    }

    pub fn ty(&self) -> ResourceType {
        self.ty
    }

    pub fn source(&self) -> &AliasSource {
        &self.source
    }

    /// The key reported in errors about this alias.
    pub(crate) fn error_key(&self) -> GlobalKey {
        match &self.source {
            AliasSource::Raw(resource) => resource.clone(),
            AliasSource::Output {
                pass,
                input,
            } => pass.child(*input),
        }
    }
}
