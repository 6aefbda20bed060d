use std::path::{Path, PathBuf};
use std::process::Command;

use super::engine::EngineError;
use crate::log;

/// Returns the directory for a locally provisioned Tesseract.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("check-ocr")
        .join("tesseract")
}

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    }
}

/// Installed locations checked after the local dir and `PATH`.
const COMMON_PATHS: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

fn responds_to_version(program: &Path) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Finds the Tesseract executable.
///
/// Checks the configured path, then the local app dir, then `PATH`, then
/// common install locations.
pub fn find_tesseract_executable(configured: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(path) = configured {
        if path.exists() || responds_to_version(path) {
            return Ok(path.to_path_buf());
        }
        log(&format!("Configured Tesseract not found: {}", path.display()));
    }

    let local_exe = get_tesseract_dir().join(executable_name());
    if local_exe.exists() {
        return Ok(local_exe);
    }

    let on_path = PathBuf::from("tesseract");
    if responds_to_version(&on_path) {
        return Ok(on_path);
    }

    COMMON_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            EngineError::unavailable("Tesseract not found. Please install Tesseract-OCR.")
        })
}

/// Local tessdata directory, if one was provisioned next to a local install.
///
/// `None` lets Tesseract use its built-in search (including `TESSDATA_PREFIX`).
pub fn find_tessdata_dir() -> Option<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    local_tessdata.join("eng.traineddata").exists().then_some(local_tessdata)
}
