//! QR connect flow.
//!
//! ```text
//! select -> requesting -> scanning -> connecting -> success
//!               |             |
//!               +--> error <--+
//! ```
//!
//! The camera and the image decoder are collaborators behind [`Camera`],
//! [`VideoStream`] and [`QrDecoder`]. The scanner owns the open stream and is
//! the only thing that stops its tracks. The frame loop checks a shared
//! "still scanning" flag each iteration; a [`CloseHandle`] clears it from any
//! thread.

use crate::clock::Clock;
use crate::i18n::{Language, Message};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Select,
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Requesting,
    Scanning,
    Connecting,
    Success,
    Error,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Which way the requested camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Environment,
    User,
}

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    Denied,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera stream ended")]
    Ended,
    /// The user ended the stream on purpose; handled as a close, not a failure
    #[error("scanner dismissed")]
    Dismissed,
    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One captured frame of pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub trait Camera {
    fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError>;
}

pub trait VideoStream {
    /// Start playback; frames are only read after this succeeds
    fn play(&mut self) -> Result<(), CameraError>;

    /// The next frame, or `None` if the stream doesn't have enough data yet
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Release every track of the stream
    fn stop_tracks(&mut self);
}

/// Opaque QR decode routine: pixel data in, decoded text or nothing out
pub trait QrDecoder {
    fn decode(&self, frame: &Frame) -> Option<String>;
}

/// Payloads that count as a connect target
pub fn accepts_payload(data: &str) -> bool {
    data.to_lowercase().contains("goti") || data.starts_with("WIFI:")
}

/// Cancels a running scan from another thread
#[derive(Debug, Clone)]
pub struct CloseHandle {
    scanning: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.scanning.store(false, Ordering::SeqCst);
    }
}

pub struct QrScanner {
    lang: Language,
    clock: Arc<dyn Clock>,
    connect_delay: Duration,
    frame_interval: Duration,
    mode: ScanMode,
    status: ScanStatus,
    error_message: Option<String>,
    payload: Option<String>,
    stream: Option<Box<dyn VideoStream>>,
    scanning: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl QrScanner {
    pub fn new(
        lang: Language,
        clock: Arc<dyn Clock>,
        connect_delay: Duration,
        frame_interval: Duration,
    ) -> Self {
        Self {
            lang,
            clock,
            connect_delay,
            frame_interval,
            mode: ScanMode::Select,
            status: ScanStatus::Idle,
            error_message: None,
            payload: None,
            stream: None,
            scanning: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// The accepted payload once the scan reached `connecting`
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            scanning: Arc::clone(&self.scanning),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Switch to camera mode and request the environment-facing camera
    pub fn select_camera(&mut self, camera: &dyn Camera) -> ScanStatus {
        if self.mode != ScanMode::Select || self.is_closed() {
            return self.status;
        }
        self.mode = ScanMode::Camera;
        self.status = ScanStatus::Requesting;
        tracing::debug!("requesting camera");

        let mut stream = match camera.open(Facing::Environment) {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(e);
                return self.status;
            }
        };
        if let Err(e) = stream.play() {
            stream.stop_tracks();
            self.fail(e);
            return self.status;
        }

        self.stream = Some(stream);
        self.status = ScanStatus::Scanning;
        self.scanning.store(true, Ordering::SeqCst);

        // Closed while the camera was coming up
        if self.is_closed() {
            self.close();
        }
        self.status
    }

    /// Process one frame. Returns the payload if it was accepted.
    pub fn poll_frame(&mut self, decoder: &dyn QrDecoder) -> Option<String> {
        if self.status != ScanStatus::Scanning || !self.scanning.load(Ordering::SeqCst) {
            return None;
        }
        let stream = self.stream.as_mut()?;

        let frame = match stream.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return None,
            Err(CameraError::Dismissed) => {
                tracing::debug!("frame source dismissed, closing scanner");
                self.close();
                return None;
            }
            Err(e) => {
                self.scanning.store(false, Ordering::SeqCst);
                self.release();
                self.fail(e);
                return None;
            }
        };

        let text = decoder.decode(&frame)?;
        if !accepts_payload(&text) {
            tracing::debug!(payload = %text, "ignoring unrecognized QR payload");
            return None;
        }

        // Clear the flag before transitioning so no later frame can fire again
        if self
            .scanning
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        self.release();
        self.status = ScanStatus::Connecting;
        self.payload = Some(text.clone());
        tracing::info!(payload = %text, "node recognized, connecting");
        Some(text)
    }

    /// Simulated handshake: wait the connect delay, then succeed
    pub fn finish_connect(&mut self) -> ScanStatus {
        if self.status != ScanStatus::Connecting {
            return self.status;
        }
        self.clock.sleep(self.connect_delay);
        if !self.is_closed() {
            self.status = ScanStatus::Success;
            tracing::info!("connected");
        }
        self.status
    }

    /// Poll frames until a payload is accepted, the stream fails, or the scan
    /// is closed. Runs the connect step on acceptance.
    pub fn run(&mut self, decoder: &dyn QrDecoder) -> ScanStatus {
        while self.status == ScanStatus::Scanning && self.scanning.load(Ordering::SeqCst) {
            if self.poll_frame(decoder).is_some() {
                return self.finish_connect();
            }
            if self.status != ScanStatus::Scanning {
                break;
            }
            self.clock.sleep(self.frame_interval);
        }
        if self.is_closed() {
            self.release();
        }
        self.status
    }

    /// Dismiss the scanner. Safe to call in any state, any number of times.
    pub fn close(&mut self) {
        self.close_handle().close();
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            tracing::debug!("camera tracks stopped");
        }
    }

    fn fail(&mut self, err: CameraError) {
        tracing::warn!(error = %err, "camera failure");
        self.status = ScanStatus::Error;
        self.error_message = Some(self.lang.text(Message::CameraFailed).to_string());
    }
}

impl Drop for QrScanner {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Frames are text; `None` entries model "not enough data yet"
    struct MockStream {
        frames: Arc<Mutex<VecDeque<Option<&'static str>>>>,
        repeat: Option<&'static str>,
        stops: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
        dismiss_at_end: bool,
    }

    impl VideoStream for MockStream {
        fn play(&mut self) -> Result<(), CameraError> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let next = self.frames.lock().unwrap().pop_front();
            let text = match next {
                Some(entry) => entry,
                None => match self.repeat {
                    Some(text) => Some(text),
                    None if self.dismiss_at_end => return Err(CameraError::Dismissed),
                    None => return Err(CameraError::Ended),
                },
            };
            Ok(text.map(|t| Frame {
                width: t.len() as u32,
                height: 1,
                data: t.as_bytes().to_vec(),
            }))
        }

        fn stop_tracks(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockCamera {
        deny: bool,
        frames: Vec<Option<&'static str>>,
        repeat: Option<&'static str>,
        stops: Arc<AtomicUsize>,
        reads: Arc<AtomicUsize>,
        dismiss_at_end: bool,
    }

    impl MockCamera {
        fn with_frames(frames: Vec<Option<&'static str>>) -> Self {
            Self {
                deny: false,
                frames,
                repeat: None,
                stops: Arc::new(AtomicUsize::new(0)),
                reads: Arc::new(AtomicUsize::new(0)),
                dismiss_at_end: false,
            }
        }

        fn denied() -> Self {
            Self {
                deny: true,
                ..Self::with_frames(Vec::new())
            }
        }

        fn endless(text: &'static str) -> Self {
            Self {
                repeat: Some(text),
                ..Self::with_frames(Vec::new())
            }
        }
    }

    impl Camera for MockCamera {
        fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
            assert_eq!(facing, Facing::Environment);
            if self.deny {
                return Err(CameraError::Denied);
            }
            Ok(Box::new(MockStream {
                frames: Arc::new(Mutex::new(self.frames.iter().copied().collect())),
                repeat: self.repeat,
                stops: Arc::clone(&self.stops),
                reads: Arc::clone(&self.reads),
                dismiss_at_end: self.dismiss_at_end,
            }))
        }
    }

    struct Utf8Decoder;

    impl QrDecoder for Utf8Decoder {
        fn decode(&self, frame: &Frame) -> Option<String> {
            std::str::from_utf8(&frame.data)
                .ok()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }
    }

    fn scanner(clock: Arc<dyn Clock>, lang: Language) -> QrScanner {
        QrScanner::new(
            lang,
            clock,
            Duration::from_millis(1_500),
            Duration::from_millis(16),
        )
    }

    #[test]
    fn test_acceptance_predicate() {
        assert!(accepts_payload("WIFI:S:Home;"));
        assert!(accepts_payload("GOTI-NODE-4"));
        assert!(accepts_payload("node.goti.net/42"));
        assert!(!accepts_payload("http://example.com"));
        assert!(!accepts_payload("wifi:S:Home;"));
        assert!(!accepts_payload(""));
    }

    #[test]
    fn test_starts_in_select_mode() {
        let s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        assert_eq!(s.mode(), ScanMode::Select);
        assert_eq!(s.status(), ScanStatus::Idle);
        assert!(s.payload().is_none());
    }

    #[test]
    fn test_happy_path_reaches_success_after_delay() {
        let clock = Arc::new(ManualClock::at(0));
        let camera = MockCamera::with_frames(vec![
            None,
            Some("http://example.com"),
            Some(""),
            Some("GOTI-NODE-4"),
            Some("WIFI:S:Second;"),
        ]);
        let mut s = scanner(clock.clone(), Language::En);

        assert_eq!(s.select_camera(&camera), ScanStatus::Scanning);
        assert_eq!(s.mode(), ScanMode::Camera);
        let before = clock.now_ms();
        assert_eq!(s.run(&Utf8Decoder), ScanStatus::Success);
        assert_eq!(s.payload(), Some("GOTI-NODE-4"));
        // Three rejected frames, each followed by one frame interval, then the handshake
        assert_eq!(clock.now_ms() - before, 3 * 16 + 1_500);
        assert_eq!(camera.reads.load(Ordering::SeqCst), 4);
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);

        s.close();
        s.close();
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_accepts_only_first_matching_frame() {
        let camera = MockCamera::with_frames(vec![Some("WIFI:S:A;"), Some("WIFI:S:B;")]);
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.select_camera(&camera);

        assert_eq!(s.poll_frame(&Utf8Decoder).as_deref(), Some("WIFI:S:A;"));
        assert_eq!(s.status(), ScanStatus::Connecting);
        // A frame already in flight cannot trigger a second transition
        assert!(s.poll_frame(&Utf8Decoder).is_none());
        assert_eq!(s.payload(), Some("WIFI:S:A;"));
        assert_eq!(s.finish_connect(), ScanStatus::Success);
        assert_eq!(s.finish_connect(), ScanStatus::Success);
    }

    #[test]
    fn test_camera_denied_is_localized_terminal_error() {
        let camera = MockCamera::denied();
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        assert_eq!(s.select_camera(&camera), ScanStatus::Error);
        assert_eq!(s.error_message(), Some("Camera access failed."));

        // No automatic retry
        assert_eq!(s.select_camera(&camera), ScanStatus::Error);
        assert_eq!(s.run(&Utf8Decoder), ScanStatus::Error);

        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::Bn);
        s.select_camera(&camera);
        assert_eq!(
            s.error_message(),
            Some(Language::Bn.text(Message::CameraFailed))
        );
        s.close();
    }

    #[test]
    fn test_stream_ending_while_scanning_is_error() {
        let camera = MockCamera::with_frames(vec![Some("nothing here")]);
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.select_camera(&camera);
        assert_eq!(s.run(&Utf8Decoder), ScanStatus::Error);
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
        s.close();
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dismissed_stream_closes_without_error() {
        let camera = MockCamera {
            dismiss_at_end: true,
            ..MockCamera::with_frames(vec![Some("http://example.com")])
        };
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.select_camera(&camera);
        assert_eq!(s.run(&Utf8Decoder), ScanStatus::Scanning);
        assert!(s.is_closed());
        assert!(s.error_message().is_none());
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
        s.close();
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_before_scanning_is_safe() {
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.close();
        s.close();
        assert!(s.is_closed());

        // A closed scanner never opens the camera
        let camera = MockCamera::endless("GOTI");
        assert_eq!(s.select_camera(&camera), ScanStatus::Idle);
        assert_eq!(camera.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_while_scanning_stops_tracks_once() {
        let camera = MockCamera::endless("not a node");
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.select_camera(&camera);
        for _ in 0..5 {
            assert!(s.poll_frame(&Utf8Decoder).is_none());
        }
        s.close();
        s.close();
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
        assert!(s.poll_frame(&Utf8Decoder).is_none());
        assert_eq!(camera.reads.load(Ordering::SeqCst), 5);
        drop(s);
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_handle_cancels_running_loop() {
        let camera = MockCamera::endless("http://example.com");
        let mut s = QrScanner::new(
            Language::En,
            Arc::new(SystemClock),
            Duration::from_millis(1_500),
            Duration::from_millis(1),
        );
        s.select_camera(&camera);
        let handle = s.close_handle();
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            handle.close();
        });

        let status = s.run(&Utf8Decoder);
        closer.join().unwrap();
        assert_eq!(status, ScanStatus::Scanning);
        assert!(s.is_closed());
        assert!(camera.reads.load(Ordering::SeqCst) > 0);
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
        s.close();
        assert_eq!(camera.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_during_connect_skips_success() {
        let camera = MockCamera::with_frames(vec![Some("WIFI:S:Cafe;")]);
        let mut s = scanner(Arc::new(ManualClock::at(0)), Language::En);
        s.select_camera(&camera);
        assert!(s.poll_frame(&Utf8Decoder).is_some());
        s.close_handle().close();
        assert_eq!(s.finish_connect(), ScanStatus::Connecting);
    }
}
