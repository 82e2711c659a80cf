//! Image sequence loading.

use cammotion::prelude::v1::*;
use log::*;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Frames of a single input directory.
pub struct Sequence {
    pub name: String,
    pub frames: Vec<Frame>,
    /// Every `sample_rate`-th image was loaded.
    pub sample_rate: usize,
    /// Number of images in the directory, before sampling.
    pub total_images: usize,
}

impl Sequence {
    /// Map an index into the sampled frames back to the image index within the directory.
    pub fn original_index(&self, idx: usize) -> usize {
        idx * self.sample_rate
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List image files of a directory, sorted by file name.
pub fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;

    paths.retain(|p| p.is_file() && has_image_extension(p));
    paths.sort();

    Ok(paths)
}

/// Decode a single image.
///
/// Images are decoded to packed RGB so that every frame of a sequence shares one pixel format.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path)
        .map_err(|e| anyhow!("Failed to decode {}: {}", path.display(), e))?
        .to_rgb8();

    let (w, h) = img.dimensions();

    Frame::rgb(w as usize, h as usize, img.into_raw())
}

/// Load every `sample_rate`-th image of a directory.
pub fn load_sequence(input: &str, sample_rate: usize) -> Result<Sequence> {
    if sample_rate == 0 {
        return Err(anyhow!("Sample rate must be at least 1"));
    }

    let dir = Path::new(input);

    if !dir.is_dir() {
        return Err(anyhow!("{} is not a directory", input));
    }

    let paths = image_paths(dir)?;

    if paths.is_empty() {
        warn!("no images found in {input}");
    }

    let frames = paths
        .iter()
        .step_by(sample_rate)
        .map(|p| {
            trace!("loading {}", p.display());
            load_frame(p)
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "{input}: loaded {} of {} images",
        frames.len(),
        paths.len()
    );

    Ok(Sequence {
        name: input.to_string(),
        frames,
        sample_rate,
        total_images: paths.len(),
    })
}
