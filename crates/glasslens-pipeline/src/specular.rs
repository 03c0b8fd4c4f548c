//! Specular highlight layer.
//!
//! The highlight is a soft white radial gradient offset toward the upper
//! left, plus a faint rim stroke following the capsule outline. Both are
//! clipped to the capsule so the result carries real alpha: transparent
//! outside, translucent white inside.
//!
//! The capsule outline is built with `kurbo` and rasterized with
//! `tiny-skia`, which provides anti-aliased clip coverage and sub-pixel
//! stroking. The gradient itself is evaluated analytically per pixel and
//! multiplied by the clip coverage.

use std::f64::consts::{FRAC_PI_2, PI};

use kurbo::{Arc, BezPath, PathEl, RoundedRect, Shape, Vec2};
use rayon::prelude::*;
use tiny_skia::{FillRule, Mask, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::capsule::{CapsuleShape, clamp01};
use crate::types::{Dimensions, LensError, Point, RasterBuffer};

/// Gradient center as fractions of the lens width and height.
const GRADIENT_CENTER: (f64, f64) = (0.35, 0.25);
/// Gradient radius as a fraction of the lens width.
const GRADIENT_RADIUS: f64 = 0.5;
/// Gradient stops as `(offset, opacity)` pairs, sorted by offset.
const GRADIENT_STOPS: [(f64, f64); 3] = [(0.0, 0.9), (0.3, 0.4), (1.0, 0.0)];

const RIM_INSET: f64 = 1.0;
const RIM_WIDTH: f32 = 2.0;
/// Rim opacity as a byte (0.2 of full).
const RIM_ALPHA: u8 = 51;

/// Flattening tolerance for the outline arcs, in pixels.
const PATH_TOLERANCE: f64 = 0.1;

/// Render the specular layer for a capsule filling `dimensions`.
///
/// # Errors
///
/// Returns [`LensError::InvalidShape`] if either dimension is zero and
/// [`LensError::SurfaceUnavailable`] if the drawing surface or clip mask
/// exceeds [`Dimensions::MAX_SURFACE_BYTES`] or cannot be created.
#[tracing::instrument(level = "debug")]
pub fn build(dimensions: Dimensions) -> Result<RasterBuffer, LensError> {
    let shape = CapsuleShape::from_dimensions(dimensions)?;
    dimensions.surface_len()?;
    let unavailable = || LensError::SurfaceUnavailable {
        width: dimensions.width,
        height: dimensions.height,
    };

    let mut pixmap = Pixmap::new(dimensions.width, dimensions.height).ok_or_else(unavailable)?;
    let mut clip = Mask::new(dimensions.width, dimensions.height).ok_or_else(unavailable)?;
    let clip_path = to_skia_path(&outline(&shape)).ok_or_else(unavailable)?;
    clip.fill_path(&clip_path, FillRule::Winding, true, Transform::identity());

    let width = usize::try_from(dimensions.width).map_err(|_| unavailable())?;
    let row_bytes = width.checked_mul(4).ok_or_else(unavailable)?;
    let (lens_width, lens_height) = (shape.width(), shape.height());
    pixmap
        .data_mut()
        .par_chunks_mut(row_bytes)
        .zip(clip.data().par_chunks(width))
        .enumerate()
        .for_each(|(y, (row, coverage))| {
            #[allow(clippy::cast_precision_loss)]
            let py = y as f64 + 0.5;
            for (x, (pixel, &cover)) in row.chunks_exact_mut(4).zip(coverage).enumerate() {
                if cover == 0 {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let p = Point::new(x as f64 + 0.5, py);
                let alpha = gradient_alpha(p, lens_width, lens_height) * f64::from(cover) / 255.0;
                // Premultiplied white: every channel equals alpha.
                pixel.fill(to_byte(alpha));
            }
        });

    let radius = shape.radius() - RIM_INSET;
    if radius > 0.0
        && let Some(rim) = to_skia_path(&rim_path(&shape))
    {
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, RIM_ALPHA);
        paint.anti_alias = true;
        let stroke = Stroke {
            width: RIM_WIDTH,
            ..Stroke::default()
        };
        pixmap.stroke_path(&rim, &paint, &stroke, Transform::identity(), Some(&clip));
    }

    demultiply(&pixmap, dimensions).ok_or_else(unavailable)
}

/// Capsule outline.
///
/// The outline spans the band `[h/2 - r, h/2 + r]`, which is the full
/// height unless the capsule is taller than it is wide.
fn outline(shape: &CapsuleShape) -> RoundedRect {
    let r = shape.radius();
    let y0 = shape.height() / 2.0;
    RoundedRect::new(0.0, y0 - r, shape.width(), y0 + r, r)
}

/// Rim light path: the straight edges lie on the outline while the end
/// caps are arcs of radius `r - 1`, joined to the edges by short
/// vertical steps.
fn rim_path(shape: &CapsuleShape) -> BezPath {
    let r = shape.radius();
    let w = shape.width();
    let cy = shape.height() / 2.0;
    let (top, bottom) = (cy - r, cy + r);
    let cap_radius = r - RIM_INSET;
    let cap = |center_x: f64, start_angle: f64| Arc {
        center: kurbo::Point::new(center_x, cy),
        radii: Vec2::new(cap_radius, cap_radius),
        start_angle,
        sweep_angle: PI,
        x_rotation: 0.0,
    };

    let mut path = BezPath::new();
    path.move_to((r, top));
    path.line_to((w - r, top));
    path.line_to((w - r, top + RIM_INSET));
    path.extend(cap(w - r, -FRAC_PI_2).append_iter(PATH_TOLERANCE));
    path.line_to((w - r, bottom));
    path.line_to((r, bottom));
    path.line_to((r, bottom - RIM_INSET));
    path.extend(cap(r, FRAC_PI_2).append_iter(PATH_TOLERANCE));
    path.close_path();
    path
}

#[allow(clippy::cast_possible_truncation)]
fn to_skia_path(shape: &impl Shape) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in shape.path_elements(PATH_TOLERANCE) {
        match el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => pb.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

/// Gradient opacity at `p`, before clipping.
fn gradient_alpha(p: Point, width: f64, height: f64) -> f64 {
    let center = Point::new(width * GRADIENT_CENTER.0, height * GRADIENT_CENTER.1);
    let t = clamp01(p.distance(center) / (width * GRADIENT_RADIUS));
    let mut previous = GRADIENT_STOPS[0];
    for stop in GRADIENT_STOPS {
        if t <= stop.0 {
            let span = stop.0 - previous.0;
            if span <= 0.0 {
                return stop.1;
            }
            let local = (t - previous.0) / span;
            return (stop.1 - previous.1).mul_add(local, previous.1);
        }
        previous = stop;
    }
    previous.1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(unit: f64) -> u8 {
    (clamp01(unit) * 255.0).round() as u8
}

/// Convert premultiplied pixmap bytes to a straight-alpha buffer.
#[allow(clippy::cast_possible_truncation)]
fn demultiply(pixmap: &Pixmap, dimensions: Dimensions) -> Option<RasterBuffer> {
    let data = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| {
            let a = px[3];
            if a == 0 {
                return [0, 0, 0, 0];
            }
            let un = |c: u8| {
                let value = (u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a);
                value.min(255) as u8
            };
            [un(px[0]), un(px[1]), un(px[2]), a]
        })
        .collect();
    RasterBuffer::from_raw(dimensions.width, dimensions.height, data)
}
