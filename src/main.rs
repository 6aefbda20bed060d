//! Check OCR
//!
//! Reads a scanned check, normalizes its geometry, crops the amount, check
//! number and MICR fields and runs the configured recognition engines on them.
//! Prints one JSON payload on stdout.

mod align;
mod arbitrate;
mod config;
mod ink;
mod micr;
mod ocr;
mod paths;
mod pipeline;
mod preprocess;
mod refine;
mod region;

use anyhow::{Result, anyhow};
use chrono::Local;
use clap::Parser;
use clap::error::ErrorKind;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use config::{CheckOcrConfig, default_config_path, load_config};
use ocr::EngineSet;

/// Logs a message to stderr and the log file with timestamp.
///
/// stdout is reserved for the JSON payload. The file is only written when
/// `<exe_dir>/logs/` exists.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    eprint!("{}", line);
    if !paths::get_logs_dir().is_dir() {
        return;
    }
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::get_log_path())
    {
        let _ = file.write_all(line.as_bytes());
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "check-ocr",
    about = "Read the amount, check number and MICR fields from a scanned check"
)]
struct Args {
    /// Scanned check image
    image_path: PathBuf,

    /// Override the configuration file path
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    match Args::try_parse() {
        Ok(args) => Ok(args),
        Err(err)
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) =>
        {
            err.exit()
        }
        Err(err) => Err(anyhow!(err.to_string().trim().to_string())),
    }
}

fn run() -> Result<String> {
    let args = parse_args()?;
    let config_path = args.config.unwrap_or_else(default_config_path);
    let config: CheckOcrConfig = load_config(&config_path)?.with_process_env();

    let mut errors = Vec::new();
    let engines = EngineSet::from_config(&config, &mut errors);
    let payload = pipeline::build_payload(&args.image_path, &config, &engines, errors)?;
    Ok(serde_json::to_string(&payload)?)
}

fn main() {
    match run() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log(&format!("Fatal: {:#}", e));
            let payload = serde_json::json!({ "error": format!("{:#}", e), "lines": [] });
            println!("{}", payload);
            std::process::exit(1);
        }
    }
}
