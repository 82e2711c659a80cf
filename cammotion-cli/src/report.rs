//! Output formatting.

use crate::loader::Sequence;
use cammotion::prelude::v1::*;
use serde::Serialize;
use std::fmt;

/// JSON output of a single sequence.
#[derive(Serialize)]
pub struct SequenceOutput<'a> {
    pub input: &'a str,
    pub frames_analysed: usize,
    /// Flagged image indices within the input directory.
    pub movement_indices: Vec<usize>,
    pub movement_scores: Vec<f64>,
    pub transformation_matrices: Vec<Option<Homography>>,
    pub records: &'a [MovementRecord],
}

impl<'a> SequenceOutput<'a> {
    pub fn new(seq: &'a Sequence, result: &'a DetectionResult) -> Self {
        Self {
            input: &seq.name,
            frames_analysed: seq.frames.len(),
            movement_indices: result
                .movement_indices()
                .iter()
                .map(|&i| seq.original_index(i))
                .collect(),
            movement_scores: result.movement_scores(),
            transformation_matrices: result.transformation_matrices(),
            records: result.records(),
        }
    }
}

/// One CSV row per transition.
#[derive(Serialize)]
pub struct TransitionRow<'a> {
    pub input: &'a str,
    pub frame: usize,
    pub score: f64,
    pub flagged: bool,
    pub route: String,
    pub good_matches: usize,
    pub has_transform: bool,
    pub translation_x: f64,
    pub translation_y: f64,
    pub rotation_degrees: f64,
    pub scaling: f64,
    pub perspective: f64,
}

pub fn transition_rows<'a>(
    seq: &'a Sequence,
    result: &'a DetectionResult,
) -> impl Iterator<Item = TransitionRow<'a>> + 'a {
    result.records().iter().enumerate().map(move |(i, r)| {
        let b = classify(r.transform.as_ref());
        TransitionRow {
            input: &seq.name,
            frame: seq.original_index(i + 1),
            score: r.score,
            flagged: r.flagged,
            route: r.route.to_string(),
            good_matches: r.good_matches,
            has_transform: r.transform.is_some(),
            translation_x: b.translation_x,
            translation_y: b.translation_y,
            rotation_degrees: b.rotation_degrees,
            scaling: b.scaling,
            perspective: b.perspective,
        }
    })
}

/// Plain text summary of a sequence.
pub struct Summary<'a> {
    seq: &'a Sequence,
    result: &'a DetectionResult,
}

impl<'a> Summary<'a> {
    pub fn new(seq: &'a Sequence, result: &'a DetectionResult) -> Self {
        Self { seq, result }
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (seq, result) = (self.seq, self.result);
        let flagged = result.movement_indices();

        // Share of transitions, not frames.
        let percentage = if result.is_empty() {
            0.0
        } else {
            flagged.len() as f64 / result.len() as f64 * 100.0
        };

        writeln!(f, "# Camera movement: {}", seq.name)?;
        writeln!(f)?;
        writeln!(
            f,
            "Frames analysed: {} (of {} images)",
            seq.frames.len(),
            seq.total_images
        )?;
        writeln!(f, "Movement detected frames: {}", flagged.len())?;
        writeln!(f, "Movement percentage: {percentage:.1}%")?;

        if flagged.is_empty() {
            return writeln!(f, "Status: no movement detected");
        }

        let indices = flagged
            .iter()
            .map(|&i| seq.original_index(i).to_string())
            .collect::<Vec<_>>();

        writeln!(f, "Status: movement detected")?;
        writeln!(f, "Frames with movement: {}", indices.join(", "))?;
        writeln!(f)?;

        for &i in flagged {
            let record = &result.records()[i - 1];
            let frame = seq.original_index(i);

            match &record.transform {
                Some(h) => {
                    let b = classify(Some(h));
                    writeln!(
                        f,
                        "Frame {frame}: {} (tx {:.2}, ty {:.2}, rotation {:.2} deg, scaling {:.3}, perspective {:.5}), score {:.2} via {}",
                        b.dominant(),
                        b.translation_x,
                        b.translation_y,
                        b.rotation_degrees,
                        b.scaling,
                        b.perspective,
                        record.score,
                        record.route,
                    )?;
                }
                None => {
                    writeln!(
                        f,
                        "Frame {frame}: score {:.2} via {}",
                        record.score, record.route
                    )?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(values: &[u8]) -> Sequence {
        Sequence {
            name: "synthetic".into(),
            frames: values
                .iter()
                .map(|&v| Frame::gray(64, 48, vec![v; 64 * 48]).unwrap())
                .collect(),
            sample_rate: 2,
            total_images: values.len() * 2,
        }
    }

    #[test]
    fn summary_lists_flagged_frames() {
        let seq = sequence(&[0, 0, 200]);
        let result = Detector::new(DetectorConfig::default())
            .unwrap()
            .detect(&seq.frames)
            .unwrap();

        let text = Summary::new(&seq, &result).to_string();

        assert!(text.contains("Frames analysed: 3 (of 6 images)"));
        assert!(text.contains("Movement detected frames: 1"));
        // 1 of 2 transitions.
        assert!(text.contains("Movement percentage: 50.0%"));
        assert!(text.contains("Frames with movement: 4"));
        assert!(text.contains("via fallback"));

        let rows = transition_rows(&seq, &result).collect::<Vec<_>>();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].frame, 4);
        assert!(rows[1].flagged);
        assert_eq!(rows[1].scaling, 1.0);
    }

    #[test]
    fn summary_without_movement() {
        let seq = sequence(&[5]);
        let text = Summary::new(&seq, &DetectionResult::default()).to_string();
        assert!(text.contains("Movement percentage: 0.0%"));
        assert!(text.contains("no movement detected"));
    }
}
