//! Face detection + embedding contract.
//!
//! The models themselves live outside this crate; anything that can turn a
//! frame into face regions with embeddings implements [`FaceEmbedder`].

use crate::frame::Frame;
use crate::types::DetectedFace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("failed to start embedder: {0}")]
    Spawn(String),
    #[error("embedder exited")]
    Exited,
    #[error("embedder I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed embedder response: {0}")]
    Protocol(String),
    #[error("detection failed: {0}")]
    Detection(String),
}

/// Locates faces in a frame and encodes each one.
///
/// Order of the returned faces is arbitrary. A face that was located but
/// could not be encoded carries `embedding: None`.
pub trait FaceEmbedder {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError>;
}

impl<E: FaceEmbedder + ?Sized> FaceEmbedder for Box<E> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
        (**self).detect(frame)
    }
}
