//! Choosing one text per field from several engines' outputs.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ocr::{DetectedLine, EngineError, EngineKind};
use crate::region::{CHECK_NUMBER, MICR, NUMERIC_AMOUNT};

/// Raw texts per engine for one field, in the order engines ran.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    entries: Vec<(String, String)>,
    /// Line detections from the general detector, if it ran
    pub detections: Vec<DetectedLine>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an engine's text.
    pub fn insert(&mut self, engine: &str, text: impl Into<String>) {
        let text = text.into();
        match self.entries.iter_mut().find(|(name, _)| name == engine) {
            Some(entry) => entry.1 = text,
            None => self.entries.push((engine.to_string(), text)),
        }
    }

    /// Records one engine call. Failures become a diagnostic in `errors` and
    /// leave no candidate behind.
    pub fn record(
        &mut self,
        engine: EngineKind,
        result: Result<String, EngineError>,
        errors: &mut Vec<String>,
    ) {
        match result {
            Ok(text) => self.insert(engine.name(), text),
            Err(e) => errors.push(format!("{}: {}", engine.name(), e)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(e, t)| (e.as_str(), t.as_str()))
    }

    #[cfg(test)]
    pub fn get(&self, engine: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == engine)
            .map(|(_, text)| text.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CandidateSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (engine, text) in &self.entries {
            map.serialize_entry(engine, text)?;
        }
        map.end()
    }
}

/// Arbitration winner for one field, with everything it was chosen from.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultField {
    pub text: String,
    pub engine: String,
    pub candidates: CandidateSet,
    /// Detector lines found in the field's crop, in crop pixels
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<DetectedLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_base64: Option<String>,
}

fn digits_of(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Picks the winning candidate for `key`.
///
/// - `micr`, `checkNumber`: most digits wins (first on ties); the text is the
///   digit string.
/// - `numericAmount`: longest candidate containing a digit; a later candidate
///   of equal length replaces an earlier one. Digit-free candidates never win.
/// - anything else: strictly longest raw text.
///
/// No usable candidate gives empty text and engine.
pub fn arbitrate(key: &str, mut candidates: CandidateSet) -> ResultField {
    let lines = std::mem::take(&mut candidates.detections);
    let mut chosen_engine = "";
    let mut chosen_text = String::new();

    match key {
        MICR | CHECK_NUMBER => {
            let mut best_digits = 0;
            for (engine, text) in candidates.iter() {
                let digits = digits_of(text);
                let count = digits.chars().count();
                if count > best_digits {
                    best_digits = count;
                    chosen_engine = engine;
                    chosen_text = digits;
                }
            }
        }
        NUMERIC_AMOUNT => {
            for (engine, text) in candidates.iter() {
                let has_digit = text.chars().any(|c| c.is_ascii_digit());
                if has_digit && text.chars().count() >= chosen_text.chars().count() {
                    chosen_engine = engine;
                    chosen_text = text.to_string();
                }
            }
        }
        _ => {
            for (engine, text) in candidates.iter() {
                if text.chars().count() > chosen_text.chars().count() {
                    chosen_engine = engine;
                    chosen_text = text.to_string();
                }
            }
        }
    }

    ResultField {
        text: chosen_text.trim().to_string(),
        engine: chosen_engine.to_string(),
        candidates,
        lines,
        preview_base64: None,
    }
}
