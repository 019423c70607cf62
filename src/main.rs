use clap::{Parser, Subcommand};
use pixload::config::{self, LoaderConfig};
use pixload::imaging::AutoZoomMode;
use pixload::{ImageLoader, ViewParams, format, metadata, output, scan};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

#[derive(Parser)]
#[command(name = "pixload")]
#[command(about = "Decode and inspect images through the pixload pipeline")]
#[command(long_about = "\
Decode and inspect images through the pixload pipeline

Files are identified by their leading bytes (falling back to the extension),
decoded through a per-format fallback chain and laid out for a viewport the
way an image viewer would show them.

Configuration is read from <config>/config.toml when present. Run
'pixload gen-config' to print a documented stock file.

Set RUST_LOG=debug to trace every decode step.")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct DecodeArgs {
    /// Image file to decode
    path: PathBuf,

    /// Frame of an animated image (clamped to the last frame)
    #[arg(long, default_value_t = 0)]
    frame: u32,

    /// Zoom factor; negative selects auto-zoom
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    zoom: f64,

    /// Auto-zoom policy: fit, fit-no-zoom, fill, fill-no-zoom
    #[arg(long, value_parser = parse_auto_zoom)]
    auto_zoom: Option<AutoZoomMode>,

    /// Viewport size as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080", value_parser = parse_size)]
    viewport: (u32, u32),

    /// Pan offset as X,Y
    #[arg(long, default_value = "0,0", value_parser = parse_offset, allow_hyphen_values = true)]
    offset: (i32, i32),

    /// Extra clockwise rotation in degrees (multiple of 90)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    rotate: i32,

    /// Apply the EXIF orientation before displaying
    #[arg(long)]
    auto_orient: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Decode one image and report what came out
    Decode(DecodeArgs),
    /// Identify every image under the given paths without decoding
    Identify {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Decode(args) => {
            let config = config::load_config(&cli.config)?;
            decode(config, &args)?;
        }
        Command::Identify { paths, json } => {
            let config = config::load_config(&cli.config)?;
            let entries = scan::scan(&paths, &config.decode)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                output::print_scan_entries(&entries);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn decode(config: LoaderConfig, args: &DecodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let view = ViewParams {
        zoom: args.zoom,
        auto_zoom: args.auto_zoom,
        viewport: args.viewport,
        offset: args.offset,
        rotation: if args.auto_orient {
            exif_rotation(&args.path)
        } else {
            0
        },
        user_rotation: args.rotate,
    };

    let loader = ImageLoader::new(config)?;
    let (tx, rx) = mpsc::channel();
    let handle = loader.submit(&args.path, args.frame, view, Some(tx));
    rx.recv()?;
    let result = loader
        .collect(handle)
        .ok_or("load finished without a result")?;

    if args.json {
        let summary = output::decode_summary(&args.path, &result);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_decode_result(&args.path, &result);
    }

    if result.image.is_none() {
        return Err(format!("cannot decode {}", args.path.display()).into());
    }
    Ok(())
}

/// Rotation the file's EXIF orientation asks for, or 0.
fn exif_rotation(path: &Path) -> i32 {
    let Ok(data) = std::fs::read(path) else {
        return 0;
    };
    metadata::for_format(format::identify(path), &data)
        .and_then(|meta| meta.orientation_degrees())
        .unwrap_or(0)
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok((w, h))
}

fn parse_offset(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("bad x '{x}': {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y '{y}': {e}"))?;
    Ok((x, y))
}

fn parse_auto_zoom(s: &str) -> Result<AutoZoomMode, String> {
    match s {
        "fit" => Ok(AutoZoomMode::Fit),
        "fit-no-zoom" => Ok(AutoZoomMode::FitNoZoom),
        "fill" => Ok(AutoZoomMode::Fill),
        "fill-no-zoom" => Ok(AutoZoomMode::FillNoZoom),
        other => Err(format!(
            "unknown auto-zoom mode '{other}' (fit, fit-no-zoom, fill, fill-no-zoom)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parsing() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("800X600"), Ok((800, 600)));
        assert!(parse_size("800").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_offset("-10,20"), Ok((-10, 20)));
        assert!(parse_offset("10").is_err());
    }

    #[test]
    fn auto_zoom_parsing() {
        assert_eq!(parse_auto_zoom("fill-no-zoom"), Ok(AutoZoomMode::FillNoZoom));
        assert!(parse_auto_zoom("stretch").is_err());
    }

    #[test]
    fn cli_parses_decode_flags() {
        let cli = Cli::try_parse_from([
            "pixload",
            "decode",
            "a.jpg",
            "--zoom",
            "2.5",
            "--viewport",
            "640x480",
            "--offset",
            "-5,5",
            "--rotate",
            "-90",
        ])
        .unwrap();
        let Command::Decode(args) = cli.command else {
            panic!("expected decode");
        };
        assert_eq!(args.zoom, 2.5);
        assert_eq!(args.viewport, (640, 480));
        assert_eq!(args.offset, (-5, 5));
        assert_eq!(args.rotate, -90);
        assert_eq!(cli.config, PathBuf::from("."));
    }
}
