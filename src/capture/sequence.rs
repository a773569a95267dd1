use super::{to_model_layout, CaptureSource};
use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tif", "tiff"];

/// Frames read in file name order from a directory of images
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    next: usize,
    grayscale: bool,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P, grayscale: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
                path.is_file() && EXTENSIONS.contains(&ext.to_lowercase().as_str())
            })
            .collect();
        frames.sort();

        let Some(first) = frames.first() else {
            bail!("No image files found in {}", dir.display());
        };
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        tracing::info!(
            "Opened {} frames from {} ({}x{})",
            frames.len(),
            dir.display(),
            width,
            height
        );

        Ok(Self {
            frames,
            next: 0,
            grayscale,
            width,
            height,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<DynamicImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let decoded =
            image::open(path).with_context(|| format!("Failed to decode {}", path.display()))?;
        Ok(Some(to_model_layout(decoded, self.grayscale)))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
