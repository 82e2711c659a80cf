//! Detect camera movement in image sequences

use cammotion::prelude::v1::{Result, *};
use clap::*;
use log::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

mod loader;
mod report;

use loader::Sequence;

/// Settings loadable from a JSON file.
#[derive(Default, Deserialize)]
#[serde(default)]
struct Settings {
    detector: DetectorConfig,
    estimator: HomographyEstimator,
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("cammotion")
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .help("Directories of images, each forming one sequence")
                .takes_value(true)
                .multiple_values(true)
                .required(true),
        )
        .arg(
            Arg::new("feature-threshold")
                .long("feature-threshold")
                .short('f')
                .help("Sensitivity of the fallback path")
                .takes_value(true),
        )
        .arg(
            Arg::new("homography-threshold")
                .long("homography-threshold")
                .short('t')
                .help("Sensitivity of the geometric path")
                .takes_value(true),
        )
        .arg(
            Arg::new("min-matches")
                .long("min-matches")
                .short('m')
                .help("Good matches required to fit a homography")
                .takes_value(true),
        )
        .arg(
            Arg::new("sample-rate")
                .long("sample-rate")
                .short('s')
                .help("Analyse every Nth image")
                .takes_value(true)
                .default_value("1"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON settings file")
                .takes_value(true),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .help("JSON output file, stdout by default")
                .takes_value(true),
        )
        .arg(
            Arg::new("csv")
                .long("csv")
                .help("Per-transition CSV output file")
                .takes_value(true),
        )
        .arg(
            Arg::new("report")
                .long("report")
                .short('r')
                .help("Plain text summary output file")
                .takes_value(true),
        )
        .get_matches();

    let mut settings = match matches.value_of("config") {
        Some(path) => {
            let file = BufReader::new(File::open(path)?);
            serde_json::from_reader::<_, Settings>(file)?
        }
        None => Settings::default(),
    };

    if let Some(v) = matches.value_of("feature-threshold") {
        settings.detector.feature_threshold = v.parse()?;
    }

    if let Some(v) = matches.value_of("homography-threshold") {
        settings.detector.homography_threshold = v.parse()?;
    }

    if let Some(v) = matches.value_of("min-matches") {
        settings.detector.min_match_count = v.parse()?;
    }

    let sample_rate: usize = matches.value_of("sample-rate").unwrap_or("1").parse()?;

    settings.estimator.validate()?;
    let detector = Detector::with_estimator(settings.detector, settings.estimator)?;

    let sequences = matches
        .values_of("input")
        .into_iter()
        .flatten()
        .map(|input| loader::load_sequence(input, sample_rate))
        .collect::<Result<Vec<_>>>()?;

    let frames = sequences
        .iter()
        .map(|s| s.frames.as_slice())
        .collect::<Vec<_>>();

    let results = detector
        .detect_batch(&frames)
        .into_iter()
        .zip(&sequences)
        .map(|(r, s)| r.map_err(|e| anyhow!("{}: {}", s.name, e)))
        .collect::<Result<Vec<_>>>()?;

    for (seq, result) in sequences.iter().zip(&results) {
        info!(
            "{}: {} of {} transitions flagged",
            seq.name,
            result.movement_indices().len(),
            result.len()
        );
    }

    write_json(matches.value_of("output"), &sequences, &results)?;

    if let Some(path) = matches.value_of("csv") {
        write_csv(path, &sequences, &results)?;
    }

    if let Some(path) = matches.value_of("report") {
        let mut out = BufWriter::new(File::create(path)?);
        for (seq, result) in sequences.iter().zip(&results) {
            writeln!(out, "{}", report::Summary::new(seq, result))?;
        }
    }

    Ok(())
}

fn write_json(path: Option<&str>, sequences: &[Sequence], results: &[DetectionResult]) -> Result<()> {
    let output = sequences
        .iter()
        .zip(results)
        .map(|(s, r)| report::SequenceOutput::new(s, r))
        .collect::<Vec<_>>();

    match path {
        Some(path) => {
            let out = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(out, &output)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &output)?;
            writeln!(out)?;
        }
    }

    Ok(())
}

fn write_csv(path: &str, sequences: &[Sequence], results: &[DetectionResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    for (seq, result) in sequences.iter().zip(results) {
        for row in report::transition_rows(seq, result) {
            writer.serialize(row)?;
        }
    }

    writer.flush()?;

    Ok(())
}
