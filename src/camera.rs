//! Terminal camera: frames arrive as lines of text from a file or stdin, the
//! way a hardware scanner in keyboard mode delivers codes it has already
//! decoded.

use crate::scanner::{Camera, CameraError, Facing, Frame, QrDecoder, VideoStream};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum FrameSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LineCamera {
    source: FrameSource,
    eof_closes: bool,
}

impl LineCamera {
    pub fn new(source: FrameSource) -> Self {
        Self {
            source,
            eof_closes: false,
        }
    }

    /// End of input dismisses the scanner instead of failing the camera.
    /// Used for interactive input where EOF is the user closing the scan.
    pub fn closing_on_eof(mut self, closes: bool) -> Self {
        self.eof_closes = closes;
        self
    }
}

impl Camera for LineCamera {
    fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
        tracing::debug!(?facing, source = ?self.source, "opening line camera");
        let reader: Box<dyn BufRead> = match &self.source {
            FrameSource::Stdin => Box::new(BufReader::new(std::io::stdin())),
            FrameSource::File(path) => match File::open(path) {
                Ok(file) => Box::new(BufReader::new(file)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(CameraError::Unavailable(path.display().to_string()))
                }
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(CameraError::Denied)
                }
                Err(e) => return Err(CameraError::Io(e)),
            },
        };
        Ok(Box::new(LineStream {
            reader: Some(reader),
            playing: false,
            eof_closes: self.eof_closes,
        }))
    }
}

struct LineStream {
    reader: Option<Box<dyn BufRead>>,
    playing: bool,
    eof_closes: bool,
}

impl VideoStream for LineStream {
    fn play(&mut self) -> Result<(), CameraError> {
        if self.reader.is_none() {
            return Err(CameraError::Ended);
        }
        self.playing = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.playing {
            return Ok(None);
        }
        let reader = self.reader.as_mut().ok_or(CameraError::Ended)?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(if self.eof_closes {
                CameraError::Dismissed
            } else {
                CameraError::Ended
            });
        }
        let data = line.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
        Ok(Some(Frame {
            width: data.len() as u32,
            height: 1,
            data,
        }))
    }

    fn stop_tracks(&mut self) {
        self.playing = false;
        self.reader = None;
    }
}

/// Reads a frame's bytes as the already-decoded payload
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl QrDecoder for TextDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let text = std::str::from_utf8(&frame.data).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}
