//! Identity gallery built from a directory of reference photos.
//!
//! One photo per student; the display name comes from the file name
//! (`virat_kohli.jpg` -> `Virat Kohli`). Photos that cannot be decoded or
//! that contain no encodable face are skipped with a warning.

use crate::embedder::FaceEmbedder;
use crate::frame::Frame;
use crate::types::{Embedding, Identity, MatchResult, Matcher};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("cannot read reference photo directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a reference photo was left out of the gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file could not be decoded as an image.
    Unreadable(String),
    /// The embedder found no face.
    NoFace,
    /// A face was found but could not be encoded.
    EncodeFailed,
    /// The embedder itself failed on this photo.
    Embedder(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unreadable(e) => write!(f, "unreadable image: {e}"),
            SkipReason::NoFace => f.write_str("no face detected"),
            SkipReason::EncodeFailed => f.write_str("face could not be encoded"),
            SkipReason::Embedder(e) => write!(f, "embedder error: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPhoto {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Ordered set of known identities. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    identities: Vec<Identity>,
}

impl Gallery {
    pub fn new(identities: Vec<Identity>) -> Self {
        Self { identities }
    }

    /// Build the gallery from every file in `dir`, in file-name order.
    ///
    /// Returns the gallery together with the photos that were skipped.
    pub fn build(
        dir: &Path,
        embedder: &mut dyn FaceEmbedder,
    ) -> Result<(Self, Vec<SkippedPhoto>), GalleryError> {
        let dir_err = |source| GalleryError::Directory {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(dir_err)? {
            let path = entry.map_err(dir_err)?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut identities = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        for (seq, path) in paths.into_iter().enumerate() {
            match encode_photo(&path, seq as u32, embedder) {
                Ok(embedding) => {
                    let name = display_name(&path);
                    tracing::debug!(path = %path.display(), name = %name, "reference photo encoded");
                    identities.push(Identity { name, embedding });
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), %reason, "skipping reference photo");
                    skipped.push(SkippedPhoto { path, reason });
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            identities = identities.len(),
            skipped = skipped.len(),
            "known faces loaded"
        );

        Ok((Self { identities }, skipped))
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Nearest-neighbour lookup. `None` means "unknown".
    pub fn match_name(&self, matcher: &dyn Matcher, probe: &Embedding, threshold: f32) -> Option<&str> {
        let result = self.compare(matcher, probe, threshold);
        result.index.map(|i| self.identities[i].name.as_str())
    }

    pub fn compare(&self, matcher: &dyn Matcher, probe: &Embedding, threshold: f32) -> MatchResult {
        matcher.compare(probe, &self.identities, threshold)
    }
}

/// Decode a photo and encode its single (best) face.
fn encode_photo(path: &Path, seq: u32, embedder: &mut dyn FaceEmbedder) -> Result<Embedding, SkipReason> {
    let frame = Frame::open(path, seq).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let faces = embedder
        .detect(&frame)
        .map_err(|e| SkipReason::Embedder(e.to_string()))?;

    if faces.len() > 1 {
        tracing::debug!(path = %path.display(), faces = faces.len(), "several faces in reference photo; using the most confident");
    }

    let best = faces
        .into_iter()
        .max_by(|a, b| {
            a.bbox
                .confidence
                .partial_cmp(&b.bbox.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or(SkipReason::NoFace)?;

    best.embedding.ok_or(SkipReason::EncodeFailed)
}

/// Derive a display name from a photo path: strip the extension, turn
/// underscores into spaces and title-case every word.
pub fn display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    title_case(&stem.replace('_', " "))
}

/// Upper-case a letter that follows a non-letter, lower-case every other letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderError;
    use crate::types::{BoundingBox, DetectedFace, EuclideanMatcher};

    /// Encodes the first pixel's colour as a 3-dim embedding.
    /// Pure black photos have no face; pure white ones fail to encode.
    struct ColourEmbedder;

    impl FaceEmbedder for ColourEmbedder {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
            let px = &frame.data[..3];
            if px == [0, 0, 0] {
                return Ok(Vec::new());
            }
            let bbox = BoundingBox {
                x: 0.0,
                y: 0.0,
                width: frame.width as f32,
                height: frame.height as f32,
                confidence: 0.9,
            };
            let embedding = (px != [255, 255, 255])
                .then(|| Embedding::new(px.iter().map(|&v| v as f32 / 255.0).collect()));
            Ok(vec![DetectedFace { bbox, embedding }])
        }
    }

    fn write_photo(dir: &Path, name: &str, rgb: [u8; 3]) {
        image::RgbImage::from_pixel(8, 8, image::Rgb(rgb))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("known_faces/virat_kohli.jpg")), "Virat Kohli");
        assert_eq!(display_name(Path::new("ROHIT_sharma.png")), "Rohit Sharma");
        assert_eq!(display_name(Path::new("virat")), "Virat");
    }

    #[test]
    fn test_title_case_word_boundaries() {
        assert_eq!(title_case("mary-jane o'neil"), "Mary-Jane O'Neil");
        assert_eq!(title_case("student 2b"), "Student 2B");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_build_skips_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "anil_kumble.png", [200, 10, 10]);
        write_photo(dir.path(), "virat_kohli.png", [10, 200, 10]);
        std::fs::write(dir.path().join("corrupt.jpg"), b"\xff\xd8 truncated").unwrap();

        let (gallery, skipped) = Gallery::build(dir.path(), &mut ColourEmbedder).unwrap();

        assert_eq!(gallery.len(), 2);
        let names: Vec<_> = gallery.identities().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Anil Kumble", "Virat Kohli"]);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].path.ends_with("corrupt.jpg"));
        assert!(matches!(skipped[0].reason, SkipReason::Unreadable(_)));
    }

    #[test]
    fn test_build_skips_faceless_and_unencodable() {
        let dir = tempfile::tempdir().unwrap();
        write_photo(dir.path(), "empty_room.png", [0, 0, 0]);
        write_photo(dir.path(), "overexposed.png", [255, 255, 255]);
        write_photo(dir.path(), "rohit.png", [10, 10, 200]);
        std::fs::create_dir(dir.path().join("archive")).unwrap();

        let (gallery, skipped) = Gallery::build(dir.path(), &mut ColourEmbedder).unwrap();

        assert_eq!(gallery.len(), 1);
        let reasons: Vec<_> = skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(reasons, [SkipReason::NoFace, SkipReason::EncodeFailed]);
    }

    #[test]
    fn test_build_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(Gallery::build(&missing, &mut ColourEmbedder).is_err());
    }

    #[test]
    fn test_match_name() {
        let gallery = Gallery::new(vec![Identity {
            name: "Virat Kohli".into(),
            embedding: Embedding::new(vec![0.1, 0.8, 0.1]),
        }]);
        let near = Embedding::new(vec![0.1, 0.75, 0.1]);
        let far = Embedding::new(vec![0.9, 0.0, 0.9]);
        assert_eq!(gallery.match_name(&EuclideanMatcher, &near, 0.6), Some("Virat Kohli"));
        assert_eq!(gallery.match_name(&EuclideanMatcher, &far, 0.6), None);
    }
}
