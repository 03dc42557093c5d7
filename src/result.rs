use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::alphabet::MicrSymbol;
use crate::buffer::Region;
use crate::error::{MicrError, MicrResult};

/// A candidate MICR band, ordered by descending detection score.
#[derive(Debug, Clone)]
pub struct BandCandidate {
    pub region: Region,
    pub score: f32,
}

/// One ranked classification hypothesis for a glyph; score in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub symbol: MicrSymbol,
    pub score: f32,
}

/// A segmented character inside a band. The crop is owned and outlives the
/// source buffer.
#[derive(Debug, Clone)]
pub struct Glyph {
    /// Left-to-right order within the band.
    pub index: usize,
    /// Position in source-image coordinates.
    pub region: Region,
    pub crop: GrayImage,
    /// Sorted by strictly non-increasing score; empty until classified.
    pub candidates: Vec<Candidate>,
}

impl Glyph {
    /// Best hypothesis meeting `min_score`, if any.
    pub fn resolved(&self, min_score: f32) -> Option<Candidate> {
        self.candidates
            .first()
            .filter(|c| c.score >= min_score)
            .copied()
    }
}

/// A fully assembled MICR line.
#[derive(Debug, Clone)]
pub struct RecognizedLine {
    pub text: String,
    /// Arithmetic mean of per-glyph resolved scores; unresolved glyphs
    /// contribute zero.
    pub confidence: f32,
    pub glyph_confidences: Vec<f32>,
    pub region: Region,
}

const PAYLOAD_VERSION: u32 = 1;
const STATUS_OK: i32 = 0;

/// The versioned, JSON-serializable result contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status_code: i32,
    pub status_message: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub version: u32,
    pub lines: Vec<LineRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecord {
    pub text: String,
    pub confidence: f32,
    pub glyph_confidences: Vec<f32>,
    pub region: Region,
}

impl ProcessResult {
    pub fn ok(lines: Vec<RecognizedLine>) -> Self {
        Self {
            status_code: STATUS_OK,
            status_message: "OK".to_string(),
            payload: Payload {
                version: PAYLOAD_VERSION,
                lines: lines
                    .into_iter()
                    .map(|line| LineRecord {
                        text: line.text,
                        confidence: line.confidence,
                        glyph_confidences: line.glyph_confidences,
                        region: line.region,
                    })
                    .collect(),
            },
        }
    }

    pub fn failure(error: &MicrError) -> Self {
        Self {
            status_code: error.status_code(),
            status_message: error.to_string(),
            payload: Payload {
                version: PAYLOAD_VERSION,
                lines: Vec::new(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == STATUS_OK
    }

    pub fn to_json(&self) -> MicrResult<String> {
        serde_json::to_string(self)
            .map_err(|e| MicrError::resource(format!("result serialization failed: {e}")))
    }

    pub fn from_json(json: &str) -> MicrResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| MicrError::config(format!("malformed result JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_text_and_scores() {
        let result = ProcessResult::ok(vec![RecognizedLine {
            text: "0123456789T".to_string(),
            confidence: 0.8734219,
            glyph_confidences: vec![0.91, 0.833_333_3, 1.0],
            region: Region::new(17, 212, 451, 33),
        }]);
        let parsed = ProcessResult::from_json(&result.to_json().unwrap()).unwrap();
        assert!(parsed.is_ok());
        assert_eq!(parsed.payload.version, result.payload.version);
        let (a, b) = (&parsed.payload.lines[0], &result.payload.lines[0]);
        assert_eq!(a.text, b.text);
        assert_eq!(a.region, b.region);
        assert!((a.confidence - b.confidence).abs() < 1e-6);
        for (x, y) in a.glyph_confidences.iter().zip(&b.glyph_confidences) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn failure_envelope_carries_the_error() {
        let result = ProcessResult::failure(&MicrError::invalid_image(String::from("zero dimension")));
        assert!(!result.is_ok());
        assert!(result.status_message.contains("zero dimension"));
        assert!(result.payload.lines.is_empty());
    }
}
