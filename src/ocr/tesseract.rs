use image::RgbImage;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use super::engine::{DetectedLine, EngineError, LineDetector, NumeralRecognizer};
use super::setup::{find_tessdata_dir, find_tesseract_executable};

/// Language hint that turns on the digits-only configuration.
pub const DEFAULT_NUMERAL_LANGUAGE: &str = "eng";

/// A located Tesseract installation.
#[derive(Clone, Debug)]
pub struct Tesseract {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
}

impl Tesseract {
    pub fn locate(configured: Option<&Path>) -> Result<Self, EngineError> {
        Ok(Self {
            executable: find_tesseract_executable(configured)?,
            tessdata: find_tessdata_dir(),
        })
    }

    /// Saves the crop to a temporary PNG and runs Tesseract on it, returning
    /// stdout.
    fn run(&self, img: &RgbImage, args: &[String]) -> Result<String, EngineError> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        let mut command = Command::new(&self.executable);
        command.arg(temp_input.path()).arg("stdout");
        if let Some(tessdata) = &self.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command.args(args).output()?;

        if !output.status.success() {
            return Err(EngineError::Failed {
                program: self.executable.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Arguments for single-line numeral recognition.
///
/// The digit whitelist only applies to the default language; a dedicated MICR
/// traineddata is trusted to produce its own symbols.
pub fn numeral_args(language: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-l", language, "--psm", "7", "--oem", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if language == DEFAULT_NUMERAL_LANGUAGE {
        args.extend(
            [
                "-c",
                "tessedit_char_whitelist=0123456789",
                "-c",
                "classify_bln_numeric_mode=1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    args
}

/// Digits-only recognizer for MICR lines and check numbers.
pub struct TesseractNumeral(pub Tesseract);

impl NumeralRecognizer for TesseractNumeral {
    fn recognize(&self, crop: &RgbImage, language: &str) -> Result<String, EngineError> {
        let language = if language.trim().is_empty() {
            DEFAULT_NUMERAL_LANGUAGE
        } else {
            language.trim()
        };
        Ok(self.0.run(crop, &numeral_args(language))?.trim().to_string())
    }
}

/// General detector: Tesseract in block mode with TSV output.
pub struct TesseractDetector(pub Tesseract);

impl LineDetector for TesseractDetector {
    fn detect(&self, crop: &RgbImage) -> Result<Vec<DetectedLine>, EngineError> {
        let args: Vec<String> = ["-l", "eng", "--psm", "6", "tsv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Ok(parse_tsv_output(&self.0.run(crop, &args)?))
    }
}

struct LineBuilder {
    key: (i32, i32, i32),
    words: Vec<String>,
    bbox: [u32; 4],
    conf_sum: f32,
    conf_count: usize,
}

impl LineBuilder {
    fn finish(self) -> DetectedLine {
        let confidence = if self.conf_count > 0 {
            self.conf_sum / self.conf_count as f32
        } else {
            0.0
        };
        DetectedLine {
            bbox: self.bbox,
            text: self.words.join(" "),
            confidence,
        }
    }
}

/// Parses Tesseract TSV output into lines with boxes and mean word confidence.
pub fn parse_tsv_output(tsv: &str) -> Vec<DetectedLine> {
    let mut lines = Vec::new();
    let mut current: Option<LineBuilder> = None;

    // Skip header
    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // level, page_num, block_num, par_num, line_num, word_num,
        // left, top, width, height, conf, text
        let num = |i: usize| fields[i].trim().parse::<i32>().unwrap_or(-1);
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        // Level 5 = word
        if num(0) != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (num(2), num(3), num(4));
        let (left, top) = (num(6).max(0) as u32, num(7).max(0) as u32);
        let (right, bottom) = (left + num(8).max(0) as u32, top + num(9).max(0) as u32);

        match current.as_mut() {
            Some(line) if line.key == key => {
                line.words.push(text.to_string());
                line.bbox = [
                    line.bbox[0].min(left),
                    line.bbox[1].min(top),
                    line.bbox[2].max(right),
                    line.bbox[3].max(bottom),
                ];
                line.conf_sum += conf;
                line.conf_count += 1;
            }
            _ => {
                if let Some(done) = current.take() {
                    lines.push(done.finish());
                }
                current = Some(LineBuilder {
                    key,
                    words: vec![text.to_string()],
                    bbox: [left, top, right, bottom],
                    conf_sum: conf,
                    conf_count: 1,
                });
            }
        }
    }

    if let Some(done) = current {
        lines.push(done.finish());
    }
    lines
}

/// Joins detected lines into one string with single spaces.
pub fn join_lines(lines: &[DetectedLine]) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    let joined = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    match WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()) {
        Some(whitespace) => whitespace.replace_all(joined.trim(), " ").into_owned(),
        None => joined.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\t\
                          left\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, left: u32, top: u32, conf: f32, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t1\t{left}\t{top}\t20\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "4\t1\t1\t1\t1\t0\t0\t0\t100\t10\t-1\t".to_string(),
            word(1, 1, 10, 5, 90.0, "One"),
            word(1, 1, 40, 6, 70.0, "hundred"),
            word(1, 2, 12, 30, 80.0, "dollars"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "One hundred");
        assert_eq!(lines[0].bbox, [10, 5, 60, 16]);
        assert!((lines[0].confidence - 80.0).abs() < 1e-4);
        assert_eq!(lines[1].text, "dollars");
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_low_level_rows() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 0, 0, -1.0, ""),
            "short\trow".to_string(),
        ]
        .join("\n");
        assert!(parse_tsv_output(&tsv).is_empty());
    }

    #[test]
    fn test_same_line_number_in_new_block_is_new_line() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 0, 0, 90.0, "a"),
            word(2, 1, 0, 50, 90.0, "b"),
        ]
        .join("\n");
        assert_eq!(parse_tsv_output(&tsv).len(), 2);
    }

    #[test]
    fn test_numeral_args_whitelist_only_for_default_language() {
        let eng = numeral_args("eng");
        assert!(eng.contains(&"tessedit_char_whitelist=0123456789".to_string()));
        assert_eq!(&eng[..6], &["-l", "eng", "--psm", "7", "--oem", "1"]);

        let micr = numeral_args("e13b");
        assert_eq!(micr.len(), 6);
        assert_eq!(micr[1], "e13b");
    }

    #[test]
    fn test_join_lines_collapses_whitespace() {
        let lines = vec![
            DetectedLine {
                bbox: [0, 0, 1, 1],
                text: "Pay  to".into(),
                confidence: 90.0,
            },
            DetectedLine {
                bbox: [0, 0, 1, 1],
                text: " the order ".into(),
                confidence: 90.0,
            },
        ];
        assert_eq!(join_lines(&lines), "Pay to the order");
        assert_eq!(join_lines(&[]), "");
    }
}
