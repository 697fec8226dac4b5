//! Out-of-process face embedder.
//!
//! Spawns a helper program that owns the detection and encoding models and
//! talks to it over stdio, one request per frame:
//!
//! ```text
//! -> {"width":640,"height":480,"channels":3}\n<width*height*3 raw RGB bytes>
//! <- {"faces":[{"x":..,"y":..,"width":..,"height":..,"confidence":..,"embedding":[..]}]}\n
//! <- {"error":"..."}\n
//! ```
//!
//! A face whose `embedding` is `null` or missing was found but not encoded.

use facebeam_core::{BoundingBox, DetectedFace, EmbedderError, Embedding, FaceEmbedder, Frame};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Debug, Serialize)]
struct RequestHeader {
    width: u32,
    height: u32,
    channels: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Response {
    Faces { faces: Vec<WireFace> },
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct WireFace {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

fn default_confidence() -> f32 {
    1.0
}

impl From<WireFace> for DetectedFace {
    fn from(face: WireFace) -> Self {
        DetectedFace {
            bbox: BoundingBox {
                x: face.x,
                y: face.y,
                width: face.width,
                height: face.height,
                confidence: face.confidence,
            },
            embedding: face.embedding.filter(|v| !v.is_empty()).map(Embedding::new),
        }
    }
}

/// Face embedder backed by a child process.
pub struct ProcessEmbedder {
    program: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessEmbedder {
    /// Spawn `command` (program followed by whitespace-separated arguments).
    pub fn spawn(command: &str) -> Result<Self, EmbedderError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| EmbedderError::Spawn("empty embedder command".into()))?
            .to_string();

        let mut child = Command::new(&program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EmbedderError::Spawn(format!("{program}: {e}")))?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(EmbedderError::Spawn(format!("{program}: stdio not captured")));
        };

        tracing::info!(program = %program, pid = child.id(), "face embedder started");

        Ok(Self {
            program,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

}

impl FaceEmbedder for ProcessEmbedder {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedFace>, EmbedderError> {
        write_request(&mut self.stdin, frame).map_err(pipe_error)?;

        let mut line = String::new();
        let n = self.stdout.read_line(&mut line)?;
        if n == 0 {
            return Err(EmbedderError::Exited);
        }

        let faces = parse_response(&line)?;
        tracing::debug!(seq = frame.sequence, faces = faces.len(), "embedder response");
        Ok(faces)
    }
}

impl Drop for ProcessEmbedder {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(program = %self.program, error = %e, "embedder already exited");
        }
        let _ = self.child.wait();
    }
}

fn pipe_error(e: std::io::Error) -> EmbedderError {
    if e.kind() == std::io::ErrorKind::BrokenPipe {
        EmbedderError::Exited
    } else {
        EmbedderError::Io(e)
    }
}

/// Write one request: JSON header line, then the raw RGB payload.
fn write_request(out: &mut impl Write, frame: &Frame) -> std::io::Result<()> {
    let header = RequestHeader {
        width: frame.width,
        height: frame.height,
        channels: Frame::CHANNELS,
    };
    serde_json::to_writer(&mut *out, &header)?;
    out.write_all(b"\n")?;
    out.write_all(&frame.data)?;
    out.flush()
}

fn parse_response(line: &str) -> Result<Vec<DetectedFace>, EmbedderError> {
    let response: Response =
        serde_json::from_str(line.trim()).map_err(|e| EmbedderError::Protocol(e.to_string()))?;
    match response {
        Response::Faces { faces } => Ok(faces.into_iter().map(DetectedFace::from).collect()),
        Response::Error { error } => Err(EmbedderError::Detection(error)),
    }
}
