//! Animation frame loading.

use base64::Engine;
use image::imageops::FilterType;
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// One pre-scaled frame, ready for an `<img src>`.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// `data:image/png;base64,...`
    pub data_url: String,
}

/// Anchors a relative frame pattern at `base`; absolute patterns pass through.
///
/// `base` is escaped, so a directory name containing `[` or `*` still matches
/// literally.
pub fn resolve_pattern(pattern: &str, base: &Path) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    let base = glob::Pattern::escape(&base.to_string_lossy());
    Path::new(&base).join(pattern).to_string_lossy().into_owned()
}

/// Loads every image matching `pattern`, sorted by path, each scaled to fit
/// inside `size`×`size` with its aspect ratio kept.
///
/// Unreadable paths and undecodable images are skipped with a warning; a bad
/// pattern yields no frames.
pub fn load_frames(pattern: &str, size: u32) -> Vec<Frame> {
    let mut paths: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    log::warn!("Skipping unreadable frame path: {e}");
                    None
                }
            })
            .collect(),
        Err(e) => {
            log::warn!("Invalid frame pattern '{pattern}': {e}");
            return Vec::new();
        }
    };
    paths.sort();

    let frames: Vec<Frame> = paths
        .iter()
        .filter_map(|path| match load_frame(path, size) {
            Ok(frame) => Some(frame),
            Err(e) => {
                log::warn!("Skipping frame {}: {e}", path.display());
                None
            }
        })
        .collect();
    log::info!("Loaded {} frame(s) from '{pattern}'", frames.len());
    frames
}

fn load_frame(path: &Path, size: u32) -> Result<Frame, image::ImageError> {
    let scaled = image::open(path)?.resize(size, size, FilterType::Lanczos3);
    let mut png = Vec::new();
    scaled.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(Frame {
        path: path.to_path_buf(),
        width: scaled.width(),
        height: scaled.height(),
        data_url: format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32) {
        RgbaImage::from_pixel(w, h, Rgba([200, 120, 40, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn frames_are_sorted_and_scaled_to_fit() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "Dog_Tongue_2.png", 400, 200);
        write_png(dir.path(), "Dog_Tongue_1.png", 300, 300);
        write_png(dir.path(), "Other_1.png", 10, 10);

        let pattern = dir.path().join("Dog_Tongue_*.png");
        let frames = load_frames(pattern.to_str().unwrap(), 100);

        let names: Vec<_> = frames
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Dog_Tongue_1.png", "Dog_Tongue_2.png"]);
        assert_eq!((frames[0].width, frames[0].height), (100, 100));
        assert_eq!((frames[1].width, frames[1].height), (100, 50));
        assert!(frames[0].data_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", 20, 20);
        std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
        let frames = load_frames(dir.path().join("*.png").to_str().unwrap(), 10);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn relative_patterns_load_from_the_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("Resources [app]");
        let frames_dir = base.join("Dog eating");
        std::fs::create_dir_all(&frames_dir).unwrap();
        write_png(&frames_dir, "Dog_Eating_1.png", 20, 20);

        let pattern = resolve_pattern("Dog eating/Dog_Eating_*.png", &base);
        assert_eq!(load_frames(&pattern, 10).len(), 1);

        let absolute = dir.path().join("*.png");
        let absolute = absolute.to_str().unwrap();
        assert_eq!(resolve_pattern(absolute, &base), absolute);
    }

    #[test]
    fn no_matches_and_bad_patterns_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_frames(dir.path().join("*.png").to_str().unwrap(), 10).is_empty());
        assert!(load_frames("[", 10).is_empty());
    }
}
