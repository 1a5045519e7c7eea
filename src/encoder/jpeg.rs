use crate::error::IngestError;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use log::{error, info};
use std::io::Write;
use std::path::{Path, PathBuf};

const JPEG_QUALITY: u8 = 75;

/// Writes decoded keyframes as `out<N>.jpg`, numbered from 1.
pub struct ImageStore {
    dir: PathBuf,
    next_index: u64,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_index: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index of the last image attempted, 0 before the first one
    pub fn last_index(&self) -> u64 {
        self.next_index
    }

    /// Encode and write one image.
    ///
    /// The index advances even when encoding or writing fails, so numbering
    /// follows decoded keyframes and not successful writes. Failures are
    /// logged and reported as `None`.
    pub fn persist(&mut self, img: &RgbImage) -> Option<PathBuf> {
        self.next_index += 1;
        let path = self.dir.join(format!("out{}.jpg", self.next_index));

        match Self::write_jpeg(&path, img) {
            Ok(()) => {
                info!("ImageStore: saved {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("ImageStore: {}", e);
                None
            }
        }
    }

    fn write_jpeg(path: &Path, img: &RgbImage) -> Result<(), IngestError> {
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
            .encode_image(img)
            .map_err(|e| IngestError::ImageEncode {
                reason: e.to_string(),
            })?;

        let persist = |source| IngestError::Persist {
            path: path.to_path_buf(),
            source,
        };
        let mut file = std::fs::File::create(path).map_err(persist)?;
        file.write_all(&buffer).map_err(persist)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbering_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ImageStore::new(dir.path());
        let img = RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));

        let first = store.persist(&img).unwrap();
        let second = store.persist(&img).unwrap();

        assert_eq!(first, dir.path().join("out1.jpg"));
        assert_eq!(second, dir.path().join("out2.jpg"));
        let bytes = std::fs::read(&first).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_failed_write_still_advances_index() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let mut store = ImageStore::new(&missing);
        let img = RgbImage::new(4, 4);

        assert!(store.persist(&img).is_none());
        assert_eq!(store.last_index(), 1);

        std::fs::create_dir(&missing).unwrap();
        assert_eq!(store.persist(&img), Some(missing.join("out2.jpg")));
    }
}
