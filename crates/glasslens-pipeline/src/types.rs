//! Shared types for the glasslens map generator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capsule::CapsuleShape;
use crate::displacement::{DisplacementMaps, MagnifyResponse};

/// Re-export `RgbaImage` so downstream crates can reference generated
/// maps without depending on `image` directly.
pub use image::RgbaImage;

/// A width x height grid of straight-alpha RGBA bytes, row-major with the
/// origin at the top-left.
pub type RasterBuffer = RgbaImage;

/// A 2D point in lens coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Vector from `other` to `self`.
    #[must_use]
    pub fn offset_from(self, other: Self) -> Vector {
        Vector::new(self.x - other.x, self.y - other.y)
    }

    /// Translate this point by a vector.
    #[must_use]
    pub fn translate(self, by: Vector) -> Self {
        Self::new(self.x + by.x, self.y + by.y)
    }
}

/// A 2D direction or offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    /// Horizontal component.
    pub x: f64,
    /// Vertical component (positive is down).
    pub y: f64,
}

impl Vector {
    /// The zero vector, used for "no direction".
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Multiply both components by `factor`.
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

impl std::ops::Add for Vector {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Neg for Vector {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Largest RGBA8 buffer, in bytes, any builder will allocate.
    ///
    /// Matches the `i32` row-stride limit of `tiny-skia` surfaces, so
    /// the displacement and specular builders accept the same sizes.
    #[allow(clippy::cast_sign_loss)]
    pub const MAX_SURFACE_BYTES: u64 = i32::MAX as u64;

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Byte length of an RGBA8 buffer of this size.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::SurfaceUnavailable`] if the buffer would be
    /// larger than [`Self::MAX_SURFACE_BYTES`].
    pub fn surface_len(self) -> Result<usize, LensError> {
        self.pixel_count()
            .checked_mul(4)
            .filter(|&bytes| bytes <= Self::MAX_SURFACE_BYTES)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or(LensError::SurfaceUnavailable {
                width: self.width,
                height: self.height,
            })
    }
}

/// How the displacement effect is split across maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MapMode {
    /// Separate edge-refraction and magnification maps, applied in two
    /// displacement passes with a blur pass between them.
    #[default]
    Dual,
    /// One map holding the per-pixel sum of both effects, applied in a
    /// single displacement pass.
    Combined,
}

impl MapMode {
    /// Lowercase name used in reports and CLI output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dual => "dual",
            Self::Combined => "combined",
        }
    }
}

/// Parameters for one lens.
///
/// The shape-affecting fields (`width`, `height`, `mode`,
/// `magnify_response`) determine the raster maps. Every other field is
/// applied by the filter graph only, so changing it never requires new
/// rasters (see [`crate::cache::MapCache`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LensParameters {
    /// Lens width in pixels.
    pub width: u32,

    /// Lens height in pixels. Must be positive; values above `width`
    /// clamp the border radius to `width / 2`.
    pub height: u32,

    /// Single combined map or separate edge and magnify maps.
    pub mode: MapMode,

    /// Which magnification response shapes the center pull.
    pub magnify_response: MagnifyResponse,

    /// Pixel magnitude applied to the edge-refraction (or combined)
    /// displacement map.
    pub refraction_scale: f64,

    /// Pixel magnitude applied to the magnify map. Only used in
    /// [`MapMode::Dual`].
    pub magnify_scale: f64,

    /// Standard deviation of the blur between the two displacement
    /// passes. Only used in [`MapMode::Dual`].
    pub magnify_blur: f64,

    /// Opacity multiplier for the specular layer (0.0 to 1.0).
    pub specular_opacity: f64,

    /// Saturation multiplier for the refracted content (1.0 is identity).
    pub saturation: f64,
}

impl LensParameters {
    /// Default lens width in pixels.
    pub const DEFAULT_WIDTH: u32 = 210;
    /// Default lens height in pixels.
    pub const DEFAULT_HEIGHT: u32 = 150;
    /// Default map mode.
    pub const DEFAULT_MODE: MapMode = MapMode::Dual;
    /// Default magnification response.
    pub const DEFAULT_MAGNIFY_RESPONSE: MagnifyResponse = MagnifyResponse::RadialNormal;
    /// Default refraction displacement scale.
    pub const DEFAULT_REFRACTION_SCALE: f64 = 100.0;
    /// Default magnify displacement scale.
    pub const DEFAULT_MAGNIFY_SCALE: f64 = 24.0;
    /// Default inter-pass blur (none).
    pub const DEFAULT_MAGNIFY_BLUR: f64 = 0.0;
    /// Default specular opacity.
    pub const DEFAULT_SPECULAR_OPACITY: f64 = 0.74;
    /// Default saturation multiplier.
    pub const DEFAULT_SATURATION: f64 = 16.0;

    /// Raster dimensions of the generated maps.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// The capsule described by `width` and `height`.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidShape`] if either dimension is zero.
    pub fn shape(&self) -> Result<CapsuleShape, LensError> {
        CapsuleShape::from_dimensions(self.dimensions())
    }

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidShape`] for a zero dimension and
    /// [`LensError::InvalidParameter`] for a non-finite scale, an opacity
    /// outside `[0, 1]`, or a negative saturation or blur.
    pub fn validate(&self) -> Result<(), LensError> {
        self.shape()?;
        check_finite("refractionScale", self.refraction_scale)?;
        check_finite("magnifyScale", self.magnify_scale)?;
        check_non_negative("magnifyBlur", self.magnify_blur)?;
        check_non_negative("saturation", self.saturation)?;
        if !(0.0..=1.0).contains(&self.specular_opacity) {
            return Err(LensError::InvalidParameter(format!(
                "specularOpacity must be within [0, 1], got {}",
                self.specular_opacity
            )));
        }
        Ok(())
    }
}

impl Default for LensParameters {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            mode: Self::DEFAULT_MODE,
            magnify_response: Self::DEFAULT_MAGNIFY_RESPONSE,
            refraction_scale: Self::DEFAULT_REFRACTION_SCALE,
            magnify_scale: Self::DEFAULT_MAGNIFY_SCALE,
            magnify_blur: Self::DEFAULT_MAGNIFY_BLUR,
            specular_opacity: Self::DEFAULT_SPECULAR_OPACITY,
            saturation: Self::DEFAULT_SATURATION,
        }
    }
}

fn check_finite(name: &str, value: f64) -> Result<(), LensError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LensError::InvalidParameter(format!(
            "{name} must be finite, got {value}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), LensError> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(LensError::InvalidParameter(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    Ok(())
}

/// The raster maps generated for one set of shape-affecting parameters.
///
/// Buffers are reference counted so a [`crate::filter::FilterGraph`] and
/// a [`crate::cache::MapCache`] can share them without copying pixels.
#[derive(Debug, Clone)]
pub struct LensMaps {
    /// Size shared by every buffer.
    pub dimensions: Dimensions,
    /// Mode the displacement buffers were generated for.
    pub mode: MapMode,
    /// Edge-refraction map in dual mode, the combined map otherwise.
    pub refraction: Arc<RasterBuffer>,
    /// Magnify-only map (`Some` only in [`MapMode::Dual`]).
    pub magnify: Option<Arc<RasterBuffer>>,
    /// Capsule-clipped highlight with real alpha.
    pub specular: Arc<RasterBuffer>,
}

impl LensMaps {
    /// Bundle freshly generated buffers.
    #[must_use]
    pub fn new(displacement: DisplacementMaps, specular: RasterBuffer) -> Self {
        let mode = displacement.mode();
        let (refraction, magnify) = match displacement {
            DisplacementMaps::Dual { edge, magnify } => (edge, Some(Arc::new(magnify))),
            DisplacementMaps::Combined(map) => (map, None),
        };
        Self {
            dimensions: Dimensions {
                width: refraction.width(),
                height: refraction.height(),
            },
            mode,
            refraction: Arc::new(refraction),
            magnify,
            specular: Arc::new(specular),
        }
    }

    /// Total bytes held by the buffers.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.refraction.as_raw().len()
            + self.magnify.as_ref().map_or(0, |m| m.as_raw().len())
            + self.specular.as_raw().len()
    }
}

/// Errors that can occur while generating maps or assembling a graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum LensError {
    /// Width or height is zero, negative, or not finite.
    #[error("invalid capsule shape: {0}")]
    InvalidShape(String),

    /// A non-shape parameter is out of range.
    #[error("invalid lens parameter: {0}")]
    InvalidParameter(String),

    /// The drawing surface for a buffer could not be allocated.
    #[error("drawing surface unavailable for a {width}x{height} buffer")]
    SurfaceUnavailable {
        /// Requested buffer width.
        width: u32,
        /// Requested buffer height.
        height: u32,
    },

    /// The operation graph references unknown results or repeats a name.
    #[error("invalid filter graph: {0}")]
    InvalidGraph(String),
}
