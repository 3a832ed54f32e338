//! Render layers and the per-layer solid / fluid split.

use std::fmt;

/// Host render layer an artifact is drawn in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderLayer {
    Solid,
    CutoutMipped,
    Cutout,
    Translucent,
}

impl RenderLayer {
    pub const ALL: [RenderLayer; 4] = [
        RenderLayer::Solid,
        RenderLayer::CutoutMipped,
        RenderLayer::Cutout,
        RenderLayer::Translucent,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            RenderLayer::Solid => "solid",
            RenderLayer::CutoutMipped => "cutout_mipped",
            RenderLayer::Cutout => "cutout",
            RenderLayer::Translucent => "translucent",
        }
    }
}

impl fmt::Display for RenderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render category requested from the geometry emitter: a host layer plus
/// whether the solid or the fluid half of that layer is wanted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChiselRenderType {
    layer: RenderLayer,
    fluid: bool,
}

impl ChiselRenderType {
    pub const fn solid(layer: RenderLayer) -> Self {
        Self { layer, fluid: false }
    }

    pub const fn fluid(layer: RenderLayer) -> Self {
        Self { layer, fluid: true }
    }

    pub const fn layer(self) -> RenderLayer {
        self.layer
    }

    pub const fn is_fluid(self) -> bool {
        self.fluid
    }
}

impl fmt::Display for ChiselRenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fluid {
            write!(f, "{}_fluid", self.layer)
        } else {
            write!(f, "{}_solid", self.layer)
        }
    }
}
