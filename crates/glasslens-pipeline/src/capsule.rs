//! Capsule (stadium) distance field.
//!
//! A capsule is the Minkowski sum of a horizontal medial segment and a
//! disc. Every query clamps the sample point onto that segment and
//! measures the distance to the clamped point, which handles the rounded
//! ends and the straight middle section with the same formula:
//!
//! - in the rounded ends the clamped point is the semicircle center, so
//!   the normal is radial;
//! - in the straight middle the clamped point sits directly above or
//!   below the sample, so the normal is purely vertical.
//!
//! On the medial segment itself the distance is zero and the normal is
//! undefined; it is reported as [`Vector::ZERO`] and callers treat it as
//! "no directional displacement, maximal interior distance".

use crate::types::{Dimensions, LensError, Point, Vector};

/// Distances at or below this are treated as lying on the medial axis.
const MEDIAL_EPSILON: f64 = 1e-9;

/// A capsule filling a `width` x `height` box anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleShape {
    width: f64,
    height: f64,
}

/// Result of sampling the capsule field at one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    /// Whether the point lies inside or on the boundary.
    pub inside: bool,
    /// Normalized distance to the boundary: 0 on the boundary (and
    /// everywhere outside), 1 on the medial axis.
    pub edge_distance: f64,
    /// Outward unit normal, or [`Vector::ZERO`] on the medial axis.
    pub normal: Vector,
}

impl CapsuleShape {
    /// Create a capsule from its bounding box size.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidShape`] if either dimension is not a
    /// positive finite number.
    pub fn new(width: f64, height: f64) -> Result<Self, LensError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(LensError::InvalidShape(format!(
                "width must be positive, got {width}"
            )));
        }
        if !(height.is_finite() && height > 0.0) {
            return Err(LensError::InvalidShape(format!(
                "height must be positive, got {height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Create a capsule covering a raster of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`LensError::InvalidShape`] if either dimension is zero.
    pub fn from_dimensions(dimensions: Dimensions) -> Result<Self, LensError> {
        Self::new(f64::from(dimensions.width), f64::from(dimensions.height))
    }

    /// Bounding box width.
    #[must_use]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Bounding box height.
    #[must_use]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Border radius: half the height, clamped to half the width when the
    /// capsule is taller than it is wide.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.height.min(self.width) / 2.0
    }

    /// Geometric center of the bounding box.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Endpoints of the medial segment, both at `y = height / 2`.
    #[must_use]
    pub fn medial_segment(&self) -> (Point, Point) {
        let r = self.radius();
        let y0 = self.height / 2.0;
        (Point::new(r, y0), Point::new(self.width - r, y0))
    }

    /// Nearest point on the medial segment.
    #[must_use]
    pub fn nearest_medial_point(&self, p: Point) -> Point {
        let (start, end) = self.medial_segment();
        Point::new(p.x.clamp(start.x, end.x), start.y)
    }

    /// Whether `p` lies inside or on the boundary.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        self.sample(p).inside
    }

    /// Sample the field at `p`.
    #[must_use]
    pub fn sample(&self, p: Point) -> FieldSample {
        let r = self.radius();
        let medial = self.nearest_medial_point(p);
        let d = p.distance(medial);

        let normal = if d > MEDIAL_EPSILON {
            p.offset_from(medial).scale(1.0 / d)
        } else {
            Vector::ZERO
        };

        FieldSample {
            inside: d <= r,
            edge_distance: clamp01((r - d) / r),
            normal,
        }
    }
}

/// Sample the capsule filling a `width` x `height` box at `(x, y)`.
///
/// # Errors
///
/// Returns [`LensError::InvalidShape`] if either dimension is not a
/// positive finite number.
pub fn sample(x: f64, y: f64, width: f64, height: f64) -> Result<FieldSample, LensError> {
    Ok(CapsuleShape::new(width, height)?.sample(Point::new(x, y)))
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
