// ============================================================================
// BeadFE CLI — headless photo → bead pattern conversion
// ============================================================================
//
// Usage examples:
//   beadfe --input photo.png --width 40 --preview pattern.png
//   beadfe -i shot.jpg --pattern --cell-size 14.5 --rotation -2 --draft heart.bfd
//   beadfe -i "photos/*.jpg" --width 60 --palette hama.txt --output-dir out/
//
// Everything runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::load_source_image;
use crate::ops::pattern_sampler::Calibration;
use crate::ops::rasterize::ResampleFilter;
use crate::palette::Palette;
use crate::project::{ConversionRequest, EditorSession};
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// BeadFE headless pattern converter.
#[derive(Parser, Debug)]
#[command(
    name = "beadfe",
    about = "Convert photos into bead patterns without the editor",
    long_about = "Downsample photos (or digitize photographed patterns) into a grid of\n\
                  palette bead colors, then save an editable draft and/or a\n\
                  one-pixel-per-bead PNG preview.\n\n\
                  Example:\n  \
                  beadfe --input photo.png --width 40 --preview pattern.png\n  \
                  beadfe -i \"photos/*.jpg\" --palette hama.txt --output-dir out/"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Pattern width in beads (photo mode). Height follows the aspect ratio.
    #[arg(short, long, value_name = "CELLS")]
    pub width: Option<u32>,

    /// Palette file with one `id,hex,brand,code` line per color.
    /// The built-in generic palette is used when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub palette: Option<PathBuf>,

    /// Photo resampling: nearest or smooth.
    #[arg(long, value_name = "FILTER")]
    pub resample: Option<String>,

    /// Treat inputs as photos of an existing pattern and sample them through
    /// the calibrated grid given by --cell-size / --offset-* / --rotation.
    #[arg(long)]
    pub pattern: bool,

    /// Pattern cell size in source pixels.
    #[arg(long, default_value_t = 10.0, value_name = "PX")]
    pub cell_size: f64,

    #[arg(long, default_value_t = 0.0, value_name = "PX", allow_hyphen_values = true)]
    pub offset_x: f64,

    #[arg(long, default_value_t = 0.0, value_name = "PX", allow_hyphen_values = true)]
    pub offset_y: f64,

    /// Grid rotation in degrees.
    #[arg(long, default_value_t = 0.0, value_name = "DEG", allow_hyphen_values = true)]
    pub rotation: f64,

    /// Pattern columns/rows. Fitted to the image when omitted.
    #[arg(long)]
    pub cols: Option<u32>,

    #[arg(long)]
    pub rows: Option<u32>,

    /// Run one denoise pass with this deltaE threshold.
    #[arg(long, value_name = "THRESHOLD")]
    pub denoise: Option<f64>,

    /// Draft file to write. Only valid for single-file input.
    #[arg(long, value_name = "FILE.bfd")]
    pub draft: Option<PathBuf>,

    /// PNG preview (one pixel per bead). Only valid for single-file input.
    #[arg(long, value_name = "FILE.png")]
    pub preview: Option<PathBuf>,

    /// Output directory for batch processing; writes `<stem>.bfd` and `<stem>.png`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print per-file timing and bead counts.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where one input's results go.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
struct Outputs {
    draft: Option<PathBuf>,
    preview: Option<PathBuf>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if let Err(e) = check_output_flags(inputs.len(), &args) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    let palette = match &args.palette {
        Some(path) => match Palette::load(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: could not load palette '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Palette::builtin(),
    };

    let mut settings = EditorSettings::load();
    if let Some(name) = &args.resample {
        match ResampleFilter::from_label(name) {
            Some(filter) => settings.resample = filter,
            None => {
                eprintln!("error: unknown resample filter '{}' (use nearest or smooth).", name);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(outputs) = build_outputs(input_path, &args) else {
            eprintln!("  error: cannot determine output paths for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &outputs, &args, &palette, &settings) {
            Ok(session) => {
                if args.verbose || multi {
                    println!(
                        "  → {}x{} beads ({:.0}ms)",
                        session.canvas.bounds.width(),
                        session.canvas.bounds.height(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
                if args.verbose {
                    print_counts(&session);
                }
            }
            Err(e) => {
                crate::log_err!("CLI: {} failed: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    outputs: &Outputs,
    args: &CliArgs,
    palette: &Palette,
    settings: &EditorSettings,
) -> Result<EditorSession, String> {
    // -- Step 1: Load ----------------------------------------------------
    let image = load_source_image(input).map_err(|e| format!("load failed: {}", e))?;

    let title = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Pattern".to_string());
    let mut session = EditorSession::new_fixed(title, 1, 1, palette.clone(), settings.clone());

    // -- Step 2: Convert -------------------------------------------------
    let request = if args.pattern {
        ConversionRequest::Pattern { calibration: calibration_for(args, &image), image }
    } else {
        let target_width = args.width.unwrap_or(settings.default_target_width);
        if target_width == 0 {
            return Err("--width must be at least 1".to_string());
        }
        ConversionRequest::Photo { image, target_width }
    };
    session.queue_conversion(request);
    session
        .process_pending()
        .ok_or_else(|| "conversion produced no canvas".to_string())?;

    if let Some(threshold) = args.denoise {
        session.denoise(Some(threshold));
    }

    // -- Step 3: Save ----------------------------------------------------
    if let Some(path) = &outputs.draft {
        session
            .save_draft(path)
            .map_err(|e| format!("draft save failed: {}", e))?;
    }
    if let Some(path) = &outputs.preview {
        session
            .export()
            .save_preview(session.palette(), path)
            .map_err(|e| format!("preview save failed: {}", e))?;
    }

    Ok(session)
}

fn calibration_for(args: &CliArgs, image: &crate::ops::SourceImage) -> Calibration {
    let mut calibration = Calibration {
        offset_x: args.offset_x,
        offset_y: args.offset_y,
        ..Calibration::default()
    };
    calibration.set_cell_size(args.cell_size);
    calibration.set_rotation(args.rotation);
    calibration.fit_to_image(image.width(), image.height());
    if let Some(cols) = args.cols {
        calibration.cols = cols.max(1);
    }
    if let Some(rows) = args.rows {
        calibration.rows = rows.max(1);
    }
    calibration
}

fn print_counts(session: &EditorSession) {
    let palette = session.palette();
    for (id, count) in session.bead_counts() {
        match palette.get(&id) {
            Some(color) => println!(
                "    {:>6}  {} {} ({})",
                count,
                color.brand(),
                color.code(),
                color.hex()
            ),
            None => println!("    {:>6}  {}", count, id),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--draft` / `--preview` name one file each, so they cannot serve a batch,
/// even alongside `--output-dir`.
fn check_output_flags(input_count: usize, args: &CliArgs) -> Result<(), String> {
    if input_count > 1 && (args.draft.is_some() || args.preview.is_some()) {
        return Err(format!(
            "{} input files given but --draft/--preview only accept a single file path.\n\
             Use --output-dir alone to specify a destination directory for batch processing.",
            input_count
        ));
    }
    Ok(())
}

/// Compute where one input's draft and preview go.
///
/// Priority:
/// 1. `--draft` / `--preview` (explicit paths, single-file input)
/// 2. `--output-dir` (both files, named after the input stem)
/// 3. Neither: nothing is written; the conversion only reports.
fn build_outputs(input: &Path, args: &CliArgs) -> Option<Outputs> {
    if args.draft.is_some() || args.preview.is_some() {
        return Some(Outputs { draft: args.draft.clone(), preview: args.preview.clone() });
    }
    let Some(dir) = &args.output_dir else {
        return Some(Outputs::default());
    };
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    Some(Outputs {
        draft: Some(dir.join(format!("{}.bfd", stem))),
        preview: Some(dir.join(format!("{}.png", stem))),
    })
}
