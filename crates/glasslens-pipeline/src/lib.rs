//! glasslens-pipeline: capsule lens maps and filter graphs (sans-IO).
//!
//! Produces the inputs a compositor needs to render a "liquid glass"
//! lens over arbitrary content:
//!
//! capsule field -> displacement maps + specular layer -> filter graph.
//!
//! The raster maps depend only on the lens size, map mode, and
//! magnification response. Everything else (scales, blur, opacity,
//! saturation) is carried by the [`FilterGraph`] alone, so
//! [`MapCache`] can rebuild a graph without touching pixels.
//!
//! This crate has **no I/O dependencies**. Encoding maps as PNG or
//! serializing the graph as an SVG `<filter>` lives in
//! `glasslens-export`. The interaction controller is driven by caller
//! supplied timestamps and never reads a clock.

use std::sync::Arc;

pub mod cache;
pub mod capsule;
pub mod diagnostics;
pub mod displacement;
pub mod filter;
pub mod interaction;
pub mod specular;
pub mod types;

pub use cache::{LensUpdate, MapCache, MapKey};
pub use capsule::{CapsuleShape, FieldSample};
pub use displacement::{DisplacementMaps, MagnifyField, MagnifyResponse};
pub use filter::{FilterGraph, FilterOperation, SourceBuffer};
pub use interaction::{AnimationPhase, LensInteractionController, WobbleTiming};
pub use types::{
    Dimensions, LensError, LensMaps, LensParameters, MapMode, Point, RasterBuffer, RgbaImage,
    Vector,
};

/// Everything a renderer needs for one lens.
#[derive(Debug, Clone)]
pub struct LensOutput {
    /// Raster maps referenced by the graph's sources.
    pub maps: Arc<LensMaps>,
    /// Compositing operations.
    pub graph: FilterGraph,
}

/// Generate the displacement maps and specular layer for `params`.
///
/// Only the shape-affecting fields are read.
///
/// # Errors
///
/// Returns [`LensError::InvalidShape`] for a zero dimension and
/// [`LensError::SurfaceUnavailable`] if a buffer would exceed
/// [`Dimensions::MAX_SURFACE_BYTES`] or cannot be allocated.
#[tracing::instrument(level = "debug", skip(params), fields(width = params.width, height = params.height, mode = params.mode.label()))]
pub fn generate_maps(params: &LensParameters) -> Result<LensMaps, LensError> {
    let dimensions = params.dimensions();
    let displacement = displacement::build(dimensions, params.mode, params.magnify_response)?;
    let specular = specular::build(dimensions)?;
    Ok(LensMaps::new(displacement, specular))
}

/// Validate `params`, generate maps, and build the filter graph.
///
/// # Errors
///
/// Returns the first [`LensError`] raised by validation, map
/// generation, or graph construction.
#[tracing::instrument(level = "debug")]
pub fn build_lens(params: &LensParameters) -> Result<LensOutput, LensError> {
    params.validate()?;
    let maps = Arc::new(generate_maps(params)?);
    let graph = filter::build(params, &maps)?;
    Ok(LensOutput { maps, graph })
}
