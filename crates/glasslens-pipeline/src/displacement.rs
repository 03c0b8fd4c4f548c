//! Displacement maps: encode per-pixel 2D offsets as RGBA.
//!
//! Red carries the horizontal offset and green the vertical offset, both
//! centered on 128 (no displacement). Blue is fixed at 128 and alpha is
//! the capsule mask: 255 inside, 0 outside. Pixels outside the capsule
//! stay neutral gray.
//!
//! Two effect terms are combined per pixel:
//!
//! - **Edge refraction** pushes along the outward normal with a strength
//!   of `(1 - edge_distance)^2.5`, which is concentrated in a thin band
//!   near the boundary and negligible in the interior.
//! - **Magnification** pulls inward with strength growing toward the
//!   center. Its exact response is pluggable, see [`MagnifyResponse`].
//!
//! # Strategy pattern
//!
//! Both magnification responses are valid and produce visibly different
//! pulls. They share the capsule geometry and differ only in how a field
//! sample turns into an offset, so the choice is a [`MagnifyResponse`]
//! value implementing [`MagnifyField`] rather than a second copy of the
//! geometry code.
//!
//! Scale parameters are deliberately not baked into the maps: the
//! consuming displacement operation applies them, so a scale change never
//! requires regenerating rasters.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::capsule::{CapsuleShape, FieldSample};
use crate::types::{Dimensions, LensError, MapMode, Point, RasterBuffer, Vector};

/// Channel value meaning "no displacement".
pub const NEUTRAL: u8 = 128;

/// Exponent shaping the edge-refraction falloff.
const EDGE_EXPONENT: f64 = 2.5;
/// Peak edge-refraction offset in channel units.
const EDGE_STRENGTH: f64 = 80.0;

const RADIAL_GAIN: f64 = 0.25;
const RADIAL_STRENGTH: f64 = 30.0;

const ELLIPTICAL_GAIN: f64 = 0.12;
const ELLIPTICAL_STRENGTH: f64 = 20.0;

/// Selects how the magnification term responds to the capsule field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MagnifyResponse {
    /// Pull against the capsule's own normal field with strength
    /// `sqrt(edge_distance)`, so magnification follows the stadium
    /// contour rather than a circle.
    #[default]
    RadialNormal,

    /// Pull toward the center along the pixel offset normalized by the
    /// half-width and half-height, with strength `edge_distance^2`.
    EllipticalCenter,
}

impl MagnifyResponse {
    /// Every response, in declaration order.
    pub const ALL: [Self; 2] = [Self::RadialNormal, Self::EllipticalCenter];

    /// Human-readable name used in reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RadialNormal => "radial-normal",
            Self::EllipticalCenter => "elliptical-center",
        }
    }
}

/// Trait for magnification strategies.
///
/// Input: the capsule, the sampled point, and its field sample (only
/// called for points inside the capsule). Output: an offset in channel
/// units, added to 128 when encoded.
pub trait MagnifyField {
    /// Magnification offset at `p`.
    fn magnify(&self, shape: &CapsuleShape, p: Point, sample: &FieldSample) -> Vector;
}

impl MagnifyField for MagnifyResponse {
    fn magnify(&self, shape: &CapsuleShape, p: Point, sample: &FieldSample) -> Vector {
        match *self {
            Self::RadialNormal => {
                let factor = sample.edge_distance.sqrt() * RADIAL_GAIN;
                -sample.normal.scale(factor * RADIAL_STRENGTH)
            }
            Self::EllipticalCenter => {
                let center = shape.center();
                let offset = p.offset_from(center);
                let normalized = Vector::new(
                    offset.x / (shape.width() / 2.0),
                    offset.y / (shape.height() / 2.0),
                );
                let factor = sample.edge_distance.powi(2) * ELLIPTICAL_GAIN;
                -normalized.scale(factor * ELLIPTICAL_STRENGTH)
            }
        }
    }
}

/// Edge-refraction offset for a sample inside the capsule.
#[must_use]
pub fn edge_refraction(sample: &FieldSample) -> Vector {
    let factor = (1.0 - sample.edge_distance).powf(EDGE_EXPONENT);
    sample.normal.scale(factor * EDGE_STRENGTH)
}

/// Displacement buffers for one shape, in either mode.
#[derive(Debug, Clone)]
pub enum DisplacementMaps {
    /// Edge-only and magnify-only maps, for two displacement passes.
    Dual {
        /// Edge-refraction map.
        edge: RasterBuffer,
        /// Magnification map.
        magnify: RasterBuffer,
    },
    /// One map holding the sum of both terms.
    Combined(RasterBuffer),
}

impl DisplacementMaps {
    /// The mode these maps were generated for.
    #[must_use]
    pub const fn mode(&self) -> MapMode {
        match self {
            Self::Dual { .. } => MapMode::Dual,
            Self::Combined(_) => MapMode::Combined,
        }
    }

    /// The map applied with the refraction scale: the edge map in dual
    /// mode, the combined map otherwise.
    #[must_use]
    pub const fn refraction(&self) -> &RasterBuffer {
        match self {
            Self::Dual { edge, .. } => edge,
            Self::Combined(map) => map,
        }
    }

    /// The magnify-only map, present in dual mode.
    #[must_use]
    pub const fn magnify(&self) -> Option<&RasterBuffer> {
        match self {
            Self::Dual { magnify, .. } => Some(magnify),
            Self::Combined(_) => None,
        }
    }
}

/// Build the displacement maps for a capsule filling `dimensions`.
///
/// The output depends only on the arguments, so repeated calls produce
/// byte-identical buffers.
///
/// # Errors
///
/// Returns [`LensError::InvalidShape`] if either dimension is zero and
/// [`LensError::SurfaceUnavailable`] if the buffer exceeds
/// [`Dimensions::MAX_SURFACE_BYTES`] or cannot be allocated.
#[tracing::instrument(level = "debug")]
pub fn build(
    dimensions: Dimensions,
    mode: MapMode,
    response: MagnifyResponse,
) -> Result<DisplacementMaps, LensError> {
    let shape = CapsuleShape::from_dimensions(dimensions)?;
    dimensions.surface_len()?;
    match mode {
        MapMode::Dual => {
            let edge = rasterize(dimensions, &shape, |_, sample| edge_refraction(sample))?;
            let magnify = rasterize(dimensions, &shape, |p, sample| {
                response.magnify(&shape, p, sample)
            })?;
            Ok(DisplacementMaps::Dual { edge, magnify })
        }
        MapMode::Combined => {
            let combined = rasterize(dimensions, &shape, |p, sample| {
                edge_refraction(sample) + response.magnify(&shape, p, sample)
            })?;
            Ok(DisplacementMaps::Combined(combined))
        }
    }
}

/// Evaluate `offset` at every pixel inside the capsule and encode it.
///
/// Pixels are sampled at their integer coordinates. Rows are independent
/// and filled in parallel.
fn rasterize<F>(
    dimensions: Dimensions,
    shape: &CapsuleShape,
    offset: F,
) -> Result<RasterBuffer, LensError>
where
    F: Fn(Point, &FieldSample) -> Vector + Sync,
{
    let unavailable = LensError::SurfaceUnavailable {
        width: dimensions.width,
        height: dimensions.height,
    };
    let len = dimensions.surface_len()?;
    let row_bytes = usize::try_from(dimensions.width)
        .ok()
        .and_then(|w| w.checked_mul(4))
        .ok_or_else(|| unavailable.clone())?;

    let mut data: Vec<u8> = Vec::new();
    data.try_reserve_exact(len).map_err(|_| unavailable.clone())?;
    data.resize(len, 0);
    data.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            #[allow(clippy::cast_precision_loss)]
            let py = y as f64;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let p = Point::new(x as f64, py);
                let sample = shape.sample(p);
                let encoded = if sample.inside {
                    encode(offset(p, &sample))
                } else {
                    [NEUTRAL, NEUTRAL, NEUTRAL, 0]
                };
                pixel.copy_from_slice(&encoded);
            }
        });

    RasterBuffer::from_raw(dimensions.width, dimensions.height, data).ok_or(unavailable)
}

/// Encode an offset for a pixel inside the capsule.
fn encode(offset: Vector) -> [u8; 4] {
    [
        to_channel(f64::from(NEUTRAL) + offset.x),
        to_channel(f64::from(NEUTRAL) + offset.y),
        NEUTRAL,
        u8::MAX,
    ]
}

/// Round to the nearest integer and clamp into a byte.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f64) -> u8 {
    if value.is_nan() {
        return NEUTRAL;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Decode a displacement pixel back into a signed offset in channel units.
#[must_use]
pub fn decode(pixel: image::Rgba<u8>) -> Vector {
    Vector::new(
        f64::from(pixel.0[0]) - f64::from(NEUTRAL),
        f64::from(pixel.0[1]) - f64::from(NEUTRAL),
    )
}

/// Length of the largest encoded offset inside the capsule, in channel
/// units. Zero for a map with no inside pixels.
#[must_use]
pub fn peak_offset(map: &RasterBuffer) -> f64 {
    map.pixels()
        .filter(|pixel| pixel.0[3] == u8::MAX)
        .map(|pixel| decode(*pixel).length())
        .fold(0.0, f64::max)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const REFERENCE: Dimensions = Dimensions {
        width: 210,
        height: 150,
    };

    fn combined(response: MagnifyResponse) -> RasterBuffer {
        match build(REFERENCE, MapMode::Combined, response).unwrap() {
            DisplacementMaps::Combined(map) => map,
            DisplacementMaps::Dual { .. } => unreachable!("requested combined mode"),
        }
    }

    #[test]
    fn default_is_radial_normal() {
        assert_eq!(MagnifyResponse::default(), MagnifyResponse::RadialNormal);
    }

    #[test]
    fn center_pixel_is_neutral_and_opaque() {
        for response in MagnifyResponse::ALL {
            let map = combined(response);
            assert_eq!(map.get_pixel(105, 75).0, [128, 128, 128, 255]);
        }
    }

    #[test]
    fn alpha_matches_capsule_mask_exactly() {
        let shape = CapsuleShape::from_dimensions(REFERENCE).unwrap();
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::RadialNormal).unwrap();
        for map in [maps.refraction(), maps.magnify().unwrap()] {
            for (x, y, pixel) in map.enumerate_pixels() {
                let inside = shape.contains(Point::new(f64::from(x), f64::from(y)));
                let expected = if inside { 255 } else { 0 };
                assert_eq!(pixel.0[3], expected, "alpha at ({x},{y})");
            }
        }
    }

    #[test]
    fn outside_pixels_are_neutral_gray() {
        let map = combined(MagnifyResponse::RadialNormal);
        assert_eq!(map.get_pixel(0, 0).0, [128, 128, 128, 0]);
        assert_eq!(map.get_pixel(209, 149).0, [128, 128, 128, 0]);
    }

    #[test]
    fn blue_channel_is_always_neutral() {
        let map = combined(MagnifyResponse::EllipticalCenter);
        assert!(map.pixels().all(|p| p.0[2] == NEUTRAL));
    }

    #[test]
    fn regeneration_is_byte_identical() {
        for mode in [MapMode::Dual, MapMode::Combined] {
            let a = build(REFERENCE, mode, MagnifyResponse::RadialNormal).unwrap();
            let b = build(REFERENCE, mode, MagnifyResponse::RadialNormal).unwrap();
            assert_eq!(a.refraction().as_raw(), b.refraction().as_raw());
            assert_eq!(
                a.magnify().map(|m| m.as_raw().clone()),
                b.magnify().map(|m| m.as_raw().clone()),
            );
        }
    }

    #[test]
    fn left_edge_pushes_outward() {
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::RadialNormal).unwrap();
        // At (0, 75) the edge distance is 0 and the normal is (-1, 0), so
        // the full edge strength applies: 128 - 80 = 48.
        assert_eq!(maps.refraction().get_pixel(0, 75).0, [48, 128, 128, 255]);
        // Radial magnification vanishes on the boundary.
        assert_eq!(
            maps.magnify().unwrap().get_pixel(0, 75).0,
            [128, 128, 128, 255]
        );
    }

    #[test]
    fn top_edge_pushes_upward() {
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::RadialNormal).unwrap();
        assert_eq!(maps.refraction().get_pixel(105, 0).0, [128, 48, 128, 255]);
    }

    #[test]
    fn radial_magnify_pulls_inward() {
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::RadialNormal).unwrap();
        // (105, 30): normal (0, -1), edge distance 30/75.
        let expected = 128.0 + (30.0_f64 / 75.0).sqrt() * 0.25 * 30.0;
        let pixel = maps.magnify().unwrap().get_pixel(105, 30);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let expected = expected.round() as u8;
        assert_eq!(pixel.0, [128, expected, 128, 255]);
    }

    #[test]
    fn elliptical_magnify_pulls_toward_center() {
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::EllipticalCenter).unwrap();
        let magnify = maps.magnify().unwrap();
        // Right of center: pull points left (red below neutral).
        let right = decode(*magnify.get_pixel(135, 75));
        assert!(right.x < 0.0, "expected leftward pull, got {right:?}");
        assert!(right.y.abs() < f64::EPSILON);

        // The vertical term stays below half a channel step, so check it
        // before encoding.
        let shape = CapsuleShape::from_dimensions(REFERENCE).unwrap();
        let p = Point::new(105.0, 100.0);
        let below = MagnifyResponse::EllipticalCenter.magnify(&shape, p, &shape.sample(p));
        assert!(below.y < 0.0, "expected upward pull, got {below:?}");
        assert!(below.x.abs() < f64::EPSILON);
    }

    #[test]
    fn combined_equals_sum_of_dual_terms_before_rounding() {
        let shape = CapsuleShape::from_dimensions(REFERENCE).unwrap();
        let map = combined(MagnifyResponse::RadialNormal);
        for (x, y) in [(10, 75), (40, 30), (105, 5), (190, 120)] {
            let p = Point::new(f64::from(x), f64::from(y));
            let sample = shape.sample(p);
            assert!(sample.inside);
            let sum =
                edge_refraction(&sample) + MagnifyResponse::RadialNormal.magnify(&shape, p, &sample);
            assert_eq!(map.get_pixel(x, y).0, encode(sum), "pixel ({x},{y})");
        }
    }

    #[test]
    fn combined_mode_has_no_magnify_map() {
        let maps = build(REFERENCE, MapMode::Combined, MagnifyResponse::RadialNormal).unwrap();
        assert_eq!(maps.mode(), MapMode::Combined);
        assert!(maps.magnify().is_none());
    }

    #[test]
    fn zero_dimension_is_invalid_shape() {
        let result = build(
            Dimensions {
                width: 0,
                height: 10,
            },
            MapMode::Combined,
            MagnifyResponse::RadialNormal,
        );
        assert!(matches!(result, Err(LensError::InvalidShape(_))));
    }

    #[test]
    fn oversized_surface_is_unavailable() {
        for (width, height) in [(1 << 30, 4), (1 << 31, 8), (100, 1 << 24)] {
            for mode in [MapMode::Dual, MapMode::Combined] {
                let result = build(
                    Dimensions { width, height },
                    mode,
                    MagnifyResponse::RadialNormal,
                );
                assert!(
                    matches!(result, Err(LensError::SurfaceUnavailable { width: w, height: h }) if w == width && h == height),
                    "{width}x{height} {mode:?}",
                );
            }
        }
    }

    #[test]
    fn peak_offset_reaches_full_edge_strength() {
        let maps = build(REFERENCE, MapMode::Dual, MagnifyResponse::RadialNormal).unwrap();
        // (0, 75) carries the full 80-unit edge push.
        assert!((peak_offset(maps.refraction()) - 80.0).abs() < 1.0);

        let blank = RasterBuffer::from_pixel(4, 4, image::Rgba([0, 0, 128, 0]));
        assert!(peak_offset(&blank).abs() < f64::EPSILON);
    }

    #[test]
    fn channel_encoding_clamps_and_rounds() {
        assert_eq!(to_channel(-40.0), 0);
        assert_eq!(to_channel(300.0), 255);
        assert_eq!(to_channel(127.5), 128);
        assert_eq!(to_channel(f64::NAN), NEUTRAL);
    }

    #[test]
    fn single_pixel_capsule() {
        let maps = build(
            Dimensions {
                width: 1,
                height: 1,
            },
            MapMode::Combined,
            MagnifyResponse::RadialNormal,
        )
        .unwrap();
        assert_eq!(maps.refraction().dimensions(), (1, 1));
    }
}
