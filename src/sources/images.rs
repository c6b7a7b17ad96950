//! Image file and image directory source

use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

use crate::source::FrameSource;
use crate::types::RawFrame;
use crate::{Result, StreamError};

/// File extensions picked up when the source points at a directory
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Plays a single image or a directory of images in name order
///
/// The source is exhausted after the last image. The producer then reopens
/// it, so playback loops the same way a video file would. A single image
/// therefore repeats forever, one decode per cycle.
pub struct ImageSequenceSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    position: usize,
}

impl ImageSequenceSource {
    /// Open a source for an image file or a directory of images
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let metadata =
            std::fs::metadata(&root).map_err(|e| StreamError::file_error(root.clone(), e))?;

        let files = if metadata.is_dir() {
            list_images(&root)?
        } else {
            vec![root.clone()]
        };

        if files.is_empty() {
            return Err(StreamError::source_unavailable(format!(
                "no .jpg/.jpeg/.png files in {}",
                root.display()
            )));
        }

        debug!("Opened image source {} ({} images)", root.display(), files.len());
        Ok(Self { root, files, position: 0 })
    }

    /// Number of images in one pass
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True if the sequence has no images
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StreamError::file_error(dir.into(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| StreamError::file_error(dir.into(), e))?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)));
        if is_image && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    info!("Found {} images in {}", files.len(), dir.display());
    Ok(files)
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(path) = self.files.get(self.position) else {
            debug!("Image sequence {} finished", self.root.display());
            return Ok(None);
        };
        self.position += 1;

        let image = image::open(path).map_err(|e| {
            StreamError::source_unavailable_with_source(
                format!("failed to decode {}", path.display()),
                Box::new(e),
            )
        })?;
        let rgb = image.to_rgb8();

        trace!("Decoded {} ({}x{})", path.display(), rgb.width(), rgb.height());
        Ok(Some(RawFrame::new(rgb.width(), rgb.height(), rgb.into_raw())))
    }

    fn describe(&self) -> String {
        format!("images at {}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path, width: u32, height: u32, value: u8) {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([value, value, value]));
        image.save(path).expect("failed to write test image");
    }

    #[test]
    fn directory_plays_in_name_order_then_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 4, 4, 20);
        write_png(&dir.path().join("a.png"), 2, 2, 10);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (2, 2));
        assert!(first.is_well_formed());

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!((second.width, second.height), (4, 4));

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn single_file_yields_one_frame_per_instance() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("still.png");
        write_png(&file, 3, 3, 99);

        let mut source = ImageSequenceSource::open(&file).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_path_and_empty_directory_are_errors() {
        let dir = tempfile::tempdir().unwrap();

        assert!(ImageSequenceSource::open(dir.path().join("missing.png")).is_err());
        assert!(matches!(
            ImageSequenceSource::open(dir.path()),
            Err(StreamError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn corrupt_image_is_a_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.jpg");
        std::fs::write(&file, b"definitely not a jpeg").unwrap();

        let mut source = ImageSequenceSource::open(&file).unwrap();
        let err = source.next_frame().unwrap_err();
        assert!(err.is_retryable());
    }
}
