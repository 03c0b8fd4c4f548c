//! Lens diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation for tuning lens
//! parameters and spotting slow map sizes. [`build_lens_with_diagnostics`]
//! runs the same stages as [`crate::build_lens`] and records what each
//! one did.
//!
//! Timestamps come from an injected [`Clock`] so the library never reads
//! the system time directly. [`WebClock`] uses the `web-time` crate,
//! which maps to `performance.now()` on WASM and `std::time::Instant` on
//! native targets.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::displacement;
use crate::filter::{self, FilterGraph};
use crate::specular;
use crate::types::{LensError, LensMaps, LensParameters, RasterBuffer};
use crate::LensOutput;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Source of monotonic timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from one lens build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LensDiagnostics {
    /// Displacement map generation.
    pub displacement: StageDiagnostics,
    /// Specular layer rendering.
    pub specular: StageDiagnostics,
    /// Filter graph assembly.
    pub filter_graph: StageDiagnostics,
    /// Wall-clock duration of the whole build (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: LensSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Displacement map metrics.
    Displacement {
        /// Map mode label.
        mode: String,
        /// Magnification response label.
        response: String,
        /// Number of maps produced (2 for dual, 1 for combined).
        map_count: usize,
        /// Pixels inside the capsule.
        inside_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
        /// Largest encoded offset in the refraction map, in channel units.
        peak_offset: f64,
    },
    /// Specular layer metrics.
    Specular {
        /// Pixels with non-zero alpha.
        visible_pixel_count: u64,
        /// Highest alpha in the layer.
        peak_alpha: u8,
    },
    /// Filter graph metrics.
    FilterGraph {
        /// Number of operations.
        operation_count: usize,
        /// Number of source buffers.
        source_count: usize,
        /// Number of displacement passes.
        displacement_passes: usize,
        /// Number of blur passes.
        blur_passes: usize,
    },
}

/// High-level summary for the whole build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LensSummary {
    /// Lens width in pixels.
    pub width: u32,
    /// Lens height in pixels.
    pub height: u32,
    /// Pixels per buffer.
    pub pixel_count: u64,
    /// Bytes held by all generated buffers.
    pub map_bytes: usize,
}

impl LensDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Lens Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Lens: {}x{} ({} pixels, {} map bytes)",
            self.summary.width, self.summary.height, self.summary.pixel_count, self.summary.map_bytes,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in [
            ("Displacement", &self.displacement),
            ("Specular", &self.specular),
            ("Filter Graph", &self.filter_graph),
        ] {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Displacement {
            mode,
            response,
            map_count,
            inside_pixel_count,
            total_pixel_count,
            peak_offset,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let coverage = if *total_pixel_count > 0 {
                *inside_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "{mode}/{response} maps={map_count} inside={inside_pixel_count} ({coverage:.1}%) peak={peak_offset:.1}"
            )
        }
        StageMetrics::Specular {
            visible_pixel_count,
            peak_alpha,
        } => format!("visible={visible_pixel_count} peak_alpha={peak_alpha}"),
        StageMetrics::FilterGraph {
            operation_count,
            source_count,
            displacement_passes,
            blur_passes,
        } => format!(
            "{operation_count} ops, {source_count} sources, displace={displacement_passes} blur={blur_passes}"
        ),
    }
}

/// Count pixels with non-zero alpha.
fn count_opaque(image: &RasterBuffer) -> u64 {
    image.pixels().map(|p| u64::from(p.0[3] > 0)).sum()
}

/// Build a lens exactly like [`crate::build_lens`], timing each stage.
///
/// # Errors
///
/// Returns the first [`LensError`] raised by validation or any stage.
pub fn build_lens_with_diagnostics<C: Clock>(
    params: &LensParameters,
    clock: &C,
) -> Result<(LensOutput, LensDiagnostics), LensError> {
    params.validate()?;
    let dimensions = params.dimensions();
    let total_start = clock.now();

    let start = clock.now();
    let maps = displacement::build(dimensions, params.mode, params.magnify_response)?;
    let displacement = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Displacement {
            mode: params.mode.label().to_owned(),
            response: params.magnify_response.label().to_owned(),
            map_count: 1 + usize::from(maps.magnify().is_some()),
            inside_pixel_count: count_opaque(maps.refraction()),
            total_pixel_count: dimensions.pixel_count(),
            peak_offset: displacement::peak_offset(maps.refraction()),
        },
    };

    let start = clock.now();
    let specular_map = specular::build(dimensions)?;
    let specular = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Specular {
            visible_pixel_count: count_opaque(&specular_map),
            peak_alpha: specular_map.pixels().map(|p| p.0[3]).max().unwrap_or(0),
        },
    };

    let maps = Arc::new(LensMaps::new(maps, specular_map));

    let start = clock.now();
    let graph = filter::build(params, &maps)?;
    let filter_graph = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: graph_metrics(&graph),
    };

    let diagnostics = LensDiagnostics {
        displacement,
        specular,
        filter_graph,
        total_duration: clock.elapsed(&total_start),
        summary: LensSummary {
            width: dimensions.width,
            height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            map_bytes: maps.byte_len(),
        },
    };

    Ok((LensOutput { maps, graph }, diagnostics))
}

fn graph_metrics(graph: &FilterGraph) -> StageMetrics {
    let count = |kind: &str| {
        graph
            .operations()
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    };
    StageMetrics::FilterGraph {
        operation_count: graph.operations().len(),
        source_count: graph.sources().len(),
        displacement_passes: count("sampleDisplace"),
        blur_passes: count("blur"),
    }
}
