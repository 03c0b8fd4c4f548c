//! glasslens-bench: CLI tool for lens generation and diagnostics.
//!
//! Builds a lens with configurable parameters, prints per-stage
//! diagnostics, and optionally writes the generated maps and the SVG
//! filter to disk. Useful for:
//!
//! - Comparing map modes (`dual` vs `combined`) and magnification responses
//! - Inspecting the displacement and specular PNGs at a given size
//! - Measuring how generation time scales with lens size
//! - Producing a ready-to-use SVG `<filter>` for a page
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin glasslens-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser, ValueEnum};
use glasslens_pipeline::diagnostics::{Clock, LensDiagnostics, duration_ms};
use glasslens_pipeline::{LensOutput, LensParameters, MagnifyResponse, MapMode};

/// Lens map generation and diagnostics for glasslens.
///
/// Generates the displacement maps, specular layer, and filter graph for
/// one lens and prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "glasslens-bench", version)]
struct Cli {
    /// Lens width in pixels.
    #[arg(long, default_value_t = LensParameters::DEFAULT_WIDTH)]
    width: u32,

    /// Lens height in pixels.
    #[arg(long, default_value_t = LensParameters::DEFAULT_HEIGHT)]
    height: u32,

    /// Map mode.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_MODE)]
    mode: Mode,

    /// Magnification response.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RESPONSE)]
    magnify_response: Response,

    /// Refraction displacement scale in pixels (may be negative).
    #[arg(long, allow_hyphen_values = true, default_value_t = LensParameters::DEFAULT_REFRACTION_SCALE)]
    refraction_scale: f64,

    /// Magnify displacement scale in pixels (dual mode only).
    #[arg(long, allow_hyphen_values = true, default_value_t = LensParameters::DEFAULT_MAGNIFY_SCALE)]
    magnify_scale: f64,

    /// Blur between the displacement passes (dual mode only).
    #[arg(long, default_value_t = LensParameters::DEFAULT_MAGNIFY_BLUR)]
    magnify_blur: f64,

    /// Specular layer opacity (0.0-1.0).
    #[arg(long, default_value_t = LensParameters::DEFAULT_SPECULAR_OPACITY)]
    specular_opacity: f64,

    /// Saturation multiplier for the refracted content.
    #[arg(long, default_value_t = LensParameters::DEFAULT_SATURATION)]
    saturation: f64,

    /// Write maps (PNG), the SVG filter, and the graph (JSON) here.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// `id` attribute of the exported `<filter>` element.
    #[arg(long, default_value = "liquid-glass")]
    filter_id: String,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full lens parameters as a JSON string.
    ///
    /// When provided, all other lens parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Map mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Separate edge and magnify maps with a blur between passes.
    Dual,
    /// One map holding both terms.
    Combined,
}

/// Magnification response selection.
#[derive(Clone, Copy, ValueEnum)]
enum Response {
    /// Pull along the capsule normal, strongest in the middle.
    RadialNormal,
    /// Pull toward the center along the normalized pixel offset.
    EllipticalCenter,
}

const fn mode_from_pipeline(mode: MapMode) -> Mode {
    match mode {
        MapMode::Dual => Mode::Dual,
        MapMode::Combined => Mode::Combined,
    }
}

const fn response_from_pipeline(response: MagnifyResponse) -> Response {
    match response {
        MagnifyResponse::RadialNormal => Response::RadialNormal,
        MagnifyResponse::EllipticalCenter => Response::EllipticalCenter,
    }
}

/// CLI defaults derived from the pipeline constants so the two cannot
/// silently diverge.
const CLI_DEFAULT_MODE: Mode = mode_from_pipeline(LensParameters::DEFAULT_MODE);
const CLI_DEFAULT_RESPONSE: Response =
    response_from_pipeline(LensParameters::DEFAULT_MAGNIFY_RESPONSE);

/// Build [`LensParameters`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn params_from_cli(cli: &Cli) -> Result<LensParameters, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(LensParameters {
        width: cli.width,
        height: cli.height,
        mode: match cli.mode {
            Mode::Dual => MapMode::Dual,
            Mode::Combined => MapMode::Combined,
        },
        magnify_response: match cli.magnify_response {
            Response::RadialNormal => MagnifyResponse::RadialNormal,
            Response::EllipticalCenter => MagnifyResponse::EllipticalCenter,
        },
        refraction_scale: cli.refraction_scale,
        magnify_scale: cli.magnify_scale,
        magnify_blur: cli.magnify_blur,
        specular_opacity: cli.specular_opacity,
        saturation: cli.saturation,
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let params = match params_from_cli(&cli) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Params: {params:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match glasslens_pipeline::diagnostics::build_lens_with_diagnostics(&params, &StdClock) {
            Ok((output, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write artifacts on the first run only.
                if run == 0
                    && let Some(ref out_dir) = cli.out_dir
                    && let Err(msg) = write_artifacts(out_dir, &output, &params, &cli.filter_id)
                {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Lens error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Write every source buffer as `<name>.png`, the SVG filter as
/// `lens.svg`, and the graph as `graph.json` into `out_dir`.
fn write_artifacts(
    out_dir: &Path,
    output: &LensOutput,
    params: &LensParameters,
    filter_id: &str,
) -> Result<(), String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("Error creating {}: {e}", out_dir.display()))?;

    for source in output.graph.sources() {
        let bytes = glasslens_export::encode_png(&source.image)
            .map_err(|e| format!("Error encoding {}: {e}", source.name))?;
        write_file(&out_dir.join(format!("{}.png", source.name)), &bytes)?;
    }

    let params_json =
        serde_json::to_string(params).map_err(|e| format!("Error serializing params: {e}"))?;
    let description = format!(
        "{}x{} {} lens",
        params.width,
        params.height,
        params.mode.label()
    );
    let metadata = glasslens_export::SvgMetadata {
        title: Some(filter_id),
        description: Some(&description),
        params_json: Some(&params_json),
    };
    let svg = glasslens_export::to_svg_filter(&output.graph, filter_id, &metadata)
        .map_err(|e| format!("Error exporting SVG filter: {e}"))?;
    write_file(&out_dir.join("lens.svg"), svg.as_bytes())?;

    let graph_json = serde_json::to_string_pretty(&output.graph)
        .map_err(|e| format!("Error serializing graph: {e}"))?;
    write_file(&out_dir.join("graph.json"), graph_json.as_bytes())?;

    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    std::fs::write(path, bytes).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    eprintln!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&LensDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[LensDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| duration_ms(d.total_duration))
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Displacement", |d| d.displacement.duration),
        ("Specular", |d| d.specular.duration),
        ("Filter Graph", |d| d.filter_graph.duration),
    ];

    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| duration_ms(extractor(d)))
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let cli = Cli::parse_from(["glasslens-bench"]);
        assert_eq!(params_from_cli(&cli).unwrap(), LensParameters::default());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "glasslens-bench",
            "--width",
            "300",
            "--mode",
            "combined",
            "--magnify-response",
            "elliptical-center",
            "--refraction-scale",
            "-40",
        ]);
        let params = params_from_cli(&cli).unwrap();
        assert_eq!(params.width, 300);
        assert_eq!(params.mode, MapMode::Combined);
        assert_eq!(params.magnify_response, MagnifyResponse::EllipticalCenter);
        assert!((params.refraction_scale + 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn config_json_takes_precedence() {
        let cli = Cli::parse_from([
            "glasslens-bench",
            "--width",
            "300",
            "--config-json",
            r#"{"width": 120, "mode": "combined"}"#,
        ]);
        let params = params_from_cli(&cli).unwrap();
        assert_eq!(params.width, 120);
        assert_eq!(params.height, LensParameters::DEFAULT_HEIGHT);
        assert_eq!(params.mode, MapMode::Combined);
    }

    #[test]
    fn malformed_config_json_is_an_error() {
        let cli = Cli::parse_from(["glasslens-bench", "--config-json", "{"]);
        assert!(params_from_cli(&cli).unwrap_err().contains("--config-json"));
    }
}
