use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::{ImageFormat, RgbaImage};
use serde_json::json;

use chequemark::background::{count_opaque, estimate_background, remove_background};
use chequemark::compose::compose_scene;
use chequemark::decoding::{load_rgba, read_dimensions};
use chequemark::error_codes::find_coded_error;
use chequemark::manifest::load_and_validate_scene;
use chequemark::text_stamp::{
    render_stamp, StampRequest, TextFace, DEFAULT_FONT_SIZE_PX, DEFAULT_STAMP_COLOR,
    DEFAULT_STAMP_TEXT,
};

#[derive(Debug, Parser)]
#[command(name = "chequemark")]
#[command(version = env!("CHEQUEMARK_VERSION"))]
#[command(about = "Stamp, sign and mark cheque photos")]
struct Cli {
    /// Log debug detail to stderr.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Flatten a scene file into a PNG.
    Compose {
        scene: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Print a JSON report instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Validate a scene file without rendering it.
    Check { scene: PathBuf },
    /// Extract the ink of a photographed mark onto a transparent background.
    Strip {
        image: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Rasterize a text stamp.
    Stamp {
        #[arg(long, default_value = DEFAULT_STAMP_TEXT)]
        text: String,
        #[arg(long = "font-size", default_value_t = DEFAULT_FONT_SIZE_PX)]
        font_size: u32,
        #[arg(long, default_value = DEFAULT_STAMP_COLOR)]
        color: String,
        /// TTF/OTF file; the built-in pixel face is used without one.
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(long = "font-sha256", requires = "font")]
        font_sha256: Option<String>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let result = match cli.command {
        Commands::Compose {
            scene,
            output,
            json,
        } => run_compose(&scene, &output, json),
        Commands::Check { scene } => run_check(&scene),
        Commands::Strip { image, output } => run_strip(&image, &output),
        Commands::Stamp {
            text,
            font_size,
            color,
            font,
            font_sha256,
            output,
        } => run_stamp(
            StampRequest {
                text,
                font_size_px: font_size,
                color,
            },
            font.as_deref(),
            font_sha256.as_deref(),
            &output,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error),
    }
}

fn report_error(error: &anyhow::Error) -> ExitCode {
    if let Some(coded) = find_coded_error(error) {
        match serde_json::to_string(&coded.envelope()) {
            Ok(envelope) => eprintln!("{envelope}"),
            Err(_) => eprintln!("error: {coded}"),
        }
        return ExitCode::from(2);
    }
    eprintln!("error: {error:#}");
    ExitCode::from(1)
}

fn run_compose(scene_path: &Path, output_path: &Path, as_json: bool) -> Result<()> {
    let scene = load_and_validate_scene(scene_path)?;
    let composition = compose_scene(&scene)?;
    fs::write(output_path, &composition.png)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    let report = &composition.report;
    if as_json {
        let payload = json!({
            "ok": true,
            "output": output_path.display().to_string(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for element in &report.elements {
        eprintln!(
            "{:<14} {:>7.1},{:<7.1} {:>7.1}x{:<7.1} {:>3}°",
            element.label,
            element.rect.x,
            element.rect.y,
            element.rect.width,
            element.rect.height,
            element.rotation_degrees
        );
    }
    if report.dropped > 0 {
        eprintln!("dropped {} element(s) that failed to decode", report.dropped);
    }
    println!(
        "Wrote {} ({}x{}, {} elements, sha256 {})",
        output_path.display(),
        report.width,
        report.height,
        report.elements.len(),
        report.png_sha256
    );
    Ok(())
}

fn run_check(scene_path: &Path) -> Result<()> {
    let scene = load_and_validate_scene(scene_path)?;
    let base = fs::read(&scene.base)
        .with_context(|| format!("failed to read base image {}", scene.base.display()))?;
    let (width, height) = read_dimensions(&base)
        .with_context(|| format!("unreadable base image {}", scene.base.display()))?;

    println!(
        "OK: {} (base {}x{}, viewport {})",
        scene_path.display(),
        width,
        height,
        scene.viewport_width
    );
    println!("Elements: {}", scene.elements.len());
    Ok(())
}

fn run_strip(image_path: &Path, output_path: &Path) -> Result<()> {
    let source = load_rgba(image_path)?;
    let estimate = estimate_background(&source);
    let stripped = remove_background(&source);

    save_png(&stripped, output_path)?;
    eprintln!(
        "background rgb({:.0}, {:.0}, {:.0}) from {} samples{}",
        estimate.r,
        estimate.g,
        estimate.b,
        estimate.sample_count,
        if estimate.is_fallback() { " (fallback)" } else { "" }
    );
    println!(
        "Wrote {} ({} ink pixels)",
        output_path.display(),
        count_opaque(&stripped)
    );
    Ok(())
}

fn run_stamp(
    request: StampRequest,
    font: Option<&Path>,
    font_sha256: Option<&str>,
    output_path: &Path,
) -> Result<()> {
    let stamp = request.validate()?;
    let face = match font {
        Some(path) => TextFace::from_font_file(path, font_sha256)?,
        None => TextFace::Pixel,
    };
    let image = render_stamp(&stamp, &face)?;

    save_png(&image, output_path)?;
    println!(
        "Wrote {} ({}x{}, {} face)",
        output_path.display(),
        image.width(),
        image.height(),
        face.name()
    );
    Ok(())
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}
