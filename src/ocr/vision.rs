use image::RgbImage;
use std::process::Command;
use tempfile::NamedTempFile;

use super::engine::{EngineError, TextRecognizer};

/// Placeholder in configured arguments replaced by the model name.
const MODEL_PLACEHOLDER: &str = "{model}";

/// Vision model served by an external command.
///
/// The command receives the crop as a PNG path appended to its arguments and
/// prints the recognized text on stdout.
#[derive(Clone, Debug)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Builds the recognizer from `[program, args...]`.
    pub fn from_command(command: &[String], model: &str) -> Result<Self, EngineError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::unavailable("no vision command configured"))?;
        if program.trim().is_empty() {
            return Err(EngineError::unavailable("no vision command configured"));
        }
        Ok(Self {
            program: program.clone(),
            args: args.iter().map(|a| a.replace(MODEL_PLACEHOLDER, model)).collect(),
        })
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&self, crop: &RgbImage) -> Result<String, EngineError> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        crop.save(temp_input.path())?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(temp_input.path())
            .output()
            .map_err(|e| EngineError::unavailable(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
