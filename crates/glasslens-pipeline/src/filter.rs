//! Compositing filter graph.
//!
//! A [`FilterGraph`] is an ordered list of image operations over named
//! results, in the style of an SVG `<filter>` chain. Each operation reads
//! the scene, a named source buffer, or the output of an earlier
//! operation, and writes one new result. The last operation's output is
//! the composited lens.
//!
//! Building a graph never touches pixels. Raster buffers are attached as
//! reference-counted [`SourceBuffer`]s, so rebuilding the graph after a
//! scale, opacity, or saturation change reuses the existing maps.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, LensError, LensMaps, LensParameters, MapMode, RasterBuffer};

/// Name of the content behind the lens.
pub const SCENE: &str = "SourceGraphic";

/// Source buffer holding the edge-refraction (or combined) map.
pub const DISPLACEMENT_MAP: &str = "displacement_map";
/// Source buffer holding the magnify-only map.
pub const MAGNIFY_MAP: &str = "magnifying_displacement_map";
/// Source buffer holding the specular highlight.
pub const SPECULAR_LAYER: &str = "specular_layer";

/// Result of the magnify displacement pass.
pub const MAGNIFIED: &str = "magnified_source";
/// Result of the blur between the displacement passes.
pub const BLURRED: &str = "blurred_source";
/// Result of the refraction displacement pass.
pub const DISPLACED: &str = "displaced";
/// Saturated refracted content.
pub const DISPLACED_SATURATED: &str = "displaced_saturated";
/// Saturated content masked by the specular alpha.
pub const SPECULAR_SATURATED: &str = "specular_saturated";
/// Specular layer with its opacity applied.
pub const SPECULAR_FADED: &str = "specular_faded";
/// Refracted content with the saturated highlight on top.
pub const WITH_HIGHLIGHT_BASE: &str = "with_highlight_base";
/// The composited lens.
pub const FINAL: &str = "final";

/// One image operation in a [`FilterGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum FilterOperation {
    /// Offset each pixel of `input` by the decoded displacement in `map`,
    /// scaled by `scale_x` and `scale_y` pixels per unit.
    SampleDisplace {
        /// Image being displaced.
        input: String,
        /// Displacement map (red = x, green = y).
        map: String,
        /// Horizontal scale.
        scale_x: f64,
        /// Vertical scale.
        scale_y: f64,
        /// Result name.
        output: String,
    },
    /// Gaussian blur.
    Blur {
        /// Image being blurred.
        input: String,
        /// Standard deviation in pixels (0 is a pass-through).
        std_deviation: f64,
        /// Result name.
        output: String,
    },
    /// Scale color saturation (1.0 is identity).
    Saturate {
        /// Image being saturated.
        input: String,
        /// Saturation multiplier.
        factor: f64,
        /// Result name.
        output: String,
    },
    /// Keep `input` only where `mask` has alpha.
    MaskComposite {
        /// Content.
        input: String,
        /// Mask whose alpha gates the content.
        mask: String,
        /// Result name.
        output: String,
    },
    /// Multiply the alpha channel by `factor`.
    AlphaScale {
        /// Image whose alpha is scaled.
        input: String,
        /// Alpha multiplier.
        factor: f64,
        /// Result name.
        output: String,
    },
    /// Normal (source-over) blend of `top` onto `bottom`.
    Blend {
        /// Upper layer.
        top: String,
        /// Lower layer.
        bottom: String,
        /// Result name.
        output: String,
    },
}

impl FilterOperation {
    /// Names this operation reads, in argument order.
    #[must_use]
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Self::SampleDisplace { input, map, .. } => vec![input.as_str(), map.as_str()],
            Self::MaskComposite { input, mask, .. } => vec![input.as_str(), mask.as_str()],
            Self::Blend { top, bottom, .. } => vec![top.as_str(), bottom.as_str()],
            Self::Blur { input, .. }
            | Self::Saturate { input, .. }
            | Self::AlphaScale { input, .. } => vec![input.as_str()],
        }
    }

    /// Name of the result this operation writes.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::SampleDisplace { output, .. }
            | Self::Blur { output, .. }
            | Self::Saturate { output, .. }
            | Self::MaskComposite { output, .. }
            | Self::AlphaScale { output, .. }
            | Self::Blend { output, .. } => output,
        }
    }

    /// Short operation name used in reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SampleDisplace { .. } => "sampleDisplace",
            Self::Blur { .. } => "blur",
            Self::Saturate { .. } => "saturate",
            Self::MaskComposite { .. } => "maskComposite",
            Self::AlphaScale { .. } => "alphaScale",
            Self::Blend { .. } => "blend",
        }
    }
}

/// A named raster referenced by the graph.
#[derive(Debug, Clone, Serialize)]
pub struct SourceBuffer {
    /// Name operations use to reference this buffer.
    pub name: String,
    /// Pixel data, shared with the map cache.
    #[serde(skip)]
    pub image: Arc<RasterBuffer>,
}

/// Ordered image operations plus the buffers they reference.
#[derive(Debug, Clone, Serialize)]
pub struct FilterGraph {
    dimensions: Dimensions,
    sources: Vec<SourceBuffer>,
    operations: Vec<FilterOperation>,
}

impl FilterGraph {
    /// Assemble a graph from parts and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidGraph`] if the graph fails
    /// [`FilterGraph::validate`].
    pub fn new(
        dimensions: Dimensions,
        sources: Vec<SourceBuffer>,
        operations: Vec<FilterOperation>,
    ) -> Result<Self, LensError> {
        let graph = Self {
            dimensions,
            sources,
            operations,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Size of the filter region and every source buffer.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Source buffers in declaration order.
    #[must_use]
    pub fn sources(&self) -> &[SourceBuffer] {
        &self.sources
    }

    /// Look up a source buffer by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&SourceBuffer> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Operations in evaluation order.
    #[must_use]
    pub fn operations(&self) -> &[FilterOperation] {
        &self.operations
    }

    /// Name of the final result, or `None` for an empty graph.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.operations.last().map(FilterOperation::output)
    }

    /// Check that the graph is a well-formed DAG.
    ///
    /// Every operation may only read [`SCENE`], a source buffer, or the
    /// output of an earlier operation, and every name is defined once.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidGraph`] naming the first offending
    /// result.
    pub fn validate(&self) -> Result<(), LensError> {
        let mut defined: HashSet<&str> = HashSet::from([SCENE]);
        for source in &self.sources {
            if !defined.insert(source.name.as_str()) {
                return Err(LensError::InvalidGraph(format!(
                    "source `{}` is defined more than once",
                    source.name
                )));
            }
            let (w, h) = source.image.dimensions();
            if (w, h) != (self.dimensions.width, self.dimensions.height) {
                return Err(LensError::InvalidGraph(format!(
                    "source `{}` is {w}x{h}, expected {}x{}",
                    source.name, self.dimensions.width, self.dimensions.height
                )));
            }
        }
        for (index, op) in self.operations.iter().enumerate() {
            if let Some(missing) = op.inputs().into_iter().find(|n| !defined.contains(n)) {
                return Err(LensError::InvalidGraph(format!(
                    "operation {index} ({}) reads `{missing}` before it is defined",
                    op.kind()
                )));
            }
            if !defined.insert(op.output()) {
                return Err(LensError::InvalidGraph(format!(
                    "operation {index} ({}) redefines `{}`",
                    op.kind(),
                    op.output()
                )));
            }
        }
        Ok(())
    }
}

/// Build the compositing graph for `params` over previously generated
/// `maps`.
///
/// # Errors
///
/// Returns an error from [`LensParameters::validate`], or
/// [`LensError::InvalidGraph`] if `maps` were generated for a different
/// size or mode than `params` describes.
#[tracing::instrument(level = "debug", skip(maps))]
pub fn build(params: &LensParameters, maps: &LensMaps) -> Result<FilterGraph, LensError> {
    params.validate()?;
    if maps.dimensions != params.dimensions() {
        return Err(LensError::InvalidGraph(format!(
            "maps are {}x{}, parameters ask for {}x{}",
            maps.dimensions.width, maps.dimensions.height, params.width, params.height
        )));
    }
    if maps.mode != params.mode {
        return Err(LensError::InvalidGraph(format!(
            "maps were generated in {} mode, parameters ask for {}",
            maps.mode.label(),
            params.mode.label()
        )));
    }

    let mut sources = vec![SourceBuffer {
        name: DISPLACEMENT_MAP.to_owned(),
        image: Arc::clone(&maps.refraction),
    }];
    let mut operations = Vec::with_capacity(8);

    let refraction_input = match params.mode {
        MapMode::Dual => {
            let magnify = maps.magnify.as_ref().ok_or_else(|| {
                LensError::InvalidGraph("dual mode requires a magnify map".to_owned())
            })?;
            sources.push(SourceBuffer {
                name: MAGNIFY_MAP.to_owned(),
                image: Arc::clone(magnify),
            });
            operations.push(FilterOperation::SampleDisplace {
                input: SCENE.to_owned(),
                map: MAGNIFY_MAP.to_owned(),
                scale_x: params.magnify_scale,
                scale_y: params.magnify_scale,
                output: MAGNIFIED.to_owned(),
            });
            operations.push(FilterOperation::Blur {
                input: MAGNIFIED.to_owned(),
                std_deviation: params.magnify_blur,
                output: BLURRED.to_owned(),
            });
            BLURRED
        }
        MapMode::Combined => SCENE,
    };

    sources.push(SourceBuffer {
        name: SPECULAR_LAYER.to_owned(),
        image: Arc::clone(&maps.specular),
    });

    operations.extend([
        FilterOperation::SampleDisplace {
            input: refraction_input.to_owned(),
            map: DISPLACEMENT_MAP.to_owned(),
            scale_x: params.refraction_scale,
            scale_y: params.refraction_scale,
            output: DISPLACED.to_owned(),
        },
        FilterOperation::Saturate {
            input: DISPLACED.to_owned(),
            factor: params.saturation,
            output: DISPLACED_SATURATED.to_owned(),
        },
        FilterOperation::MaskComposite {
            input: DISPLACED_SATURATED.to_owned(),
            mask: SPECULAR_LAYER.to_owned(),
            output: SPECULAR_SATURATED.to_owned(),
        },
        FilterOperation::AlphaScale {
            input: SPECULAR_LAYER.to_owned(),
            factor: params.specular_opacity,
            output: SPECULAR_FADED.to_owned(),
        },
        FilterOperation::Blend {
            top: SPECULAR_SATURATED.to_owned(),
            bottom: DISPLACED.to_owned(),
            output: WITH_HIGHLIGHT_BASE.to_owned(),
        },
        FilterOperation::Blend {
            top: SPECULAR_FADED.to_owned(),
            bottom: WITH_HIGHLIGHT_BASE.to_owned(),
            output: FINAL.to_owned(),
        },
    ]);

    let graph = FilterGraph::new(maps.dimensions, sources, operations)?;
    tracing::debug!(
        operations = graph.operations().len(),
        sources = graph.sources().len(),
        "filter graph built"
    );
    Ok(graph)
}
