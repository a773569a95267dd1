use super::OutputSink;
use anyhow::{ensure, Context, Result};
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes each mask as a numbered PNG into a directory
pub struct MaskDirectory {
    dir: PathBuf,
    written: usize,
    width: u32,
    height: u32,
}

impl MaskDirectory {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Writing masks to {} ({}x{})", dir.display(), width, height);

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
            width,
            height,
        })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl OutputSink for MaskDirectory {
    fn write_frame(&mut self, mask: &GrayImage) -> Result<()> {
        ensure!(
            mask.dimensions() == (self.width, self.height),
            "Mask is {:?}, output expects {:?}",
            mask.dimensions(),
            (self.width, self.height)
        );

        let path = self.dir.join(format!("mask_{:06}.png", self.written));
        mask.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn masks_are_numbered_in_write_order() {
        let dir = std::env::temp_dir().join(format!("cblbsp-masks-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut sink = MaskDirectory::new(&dir, 5, 3).unwrap();

        sink.write_frame(&GrayImage::new(5, 3)).unwrap();
        sink.write_frame(&GrayImage::from_pixel(5, 3, Luma([255]))).unwrap();
        assert_eq!(sink.written(), 2);

        let second = image::open(dir.join("mask_000001.png")).unwrap().into_luma8();
        assert_eq!(second.get_pixel(4, 2)[0], 255);
        assert!(sink.write_frame(&GrayImage::new(3, 5)).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
