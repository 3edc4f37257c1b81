//! Scripted sources and transports for unit tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::video::{FrameSource, PixelFormat, RawFrame, Resolution, SourceFactory, VideoFeed};
use crate::webrtc::transport::EVENT_CHANNEL_CAPACITY;
use crate::webrtc::{PeerTransport, SessionDescription, TransportEvent, TransportFactory};

/// Scripted result of one `read_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame,
    Fail,
}

/// Counters shared between a [`ScriptedSource`] and the test
#[derive(Debug, Default)]
pub struct SourceProbe {
    opens: AtomicUsize,
    releases: AtomicUsize,
    reads: AtomicUsize,
    open: AtomicBool,
}

impl SourceProbe {
    /// Successful opens
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Open to closed transitions
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// `read_frame` calls while open
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Source whose opens and reads follow a script. Once a script is
/// exhausted every open and read succeeds.
pub struct ScriptedSource {
    resolution: Resolution,
    device_id: String,
    reads: VecDeque<ReadOutcome>,
    opens: VecDeque<bool>,
    sequence: u64,
    read_delay: Duration,
    cancel_on_failure: Option<CancellationToken>,
    probe: Arc<SourceProbe>,
}

impl ScriptedSource {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            device_id: "scripted".to_string(),
            reads: VecDeque::new(),
            opens: VecDeque::new(),
            sequence: 0,
            read_delay: Duration::ZERO,
            cancel_on_failure: None,
            probe: Arc::new(SourceProbe::default()),
        }
    }

    pub fn with_reads(mut self, reads: impl IntoIterator<Item = ReadOutcome>) -> Self {
        self.reads.extend(reads);
        self
    }

    pub fn with_opens(mut self, opens: impl IntoIterator<Item = bool>) -> Self {
        self.opens.extend(opens);
        self
    }

    /// Every read blocks for `delay` before returning
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// A scripted read failure cancels `token` before it returns, as if the
    /// session were torn down while the read was in flight
    pub fn cancelling_on_failure(mut self, token: CancellationToken) -> Self {
        self.cancel_on_failure = Some(token);
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn probe(&self) -> Arc<SourceProbe> {
        self.probe.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<()> {
        if self.probe.is_open() {
            return Ok(());
        }
        if !self.opens.pop_front().unwrap_or(true) {
            return Err(AppError::device_unavailable(&self.device_id, "scripted open failure"));
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        self.probe.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        if !self.probe.is_open() {
            return Err(AppError::read_failure(&self.device_id, "device not open"));
        }
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        match self.reads.pop_front().unwrap_or(ReadOutcome::Frame) {
            ReadOutcome::Frame => {
                self.sequence += 1;
                let size = PixelFormat::Bgr24.frame_size(self.resolution);
                Ok(RawFrame::new(
                    Bytes::from(vec![self.sequence as u8; size]),
                    self.resolution,
                    PixelFormat::Bgr24,
                    self.sequence,
                ))
            }
            ReadOutcome::Fail => {
                if let Some(token) = &self.cancel_on_failure {
                    token.cancel();
                }
                Err(AppError::read_failure(&self.device_id, "scripted read failure"))
            }
        }
    }

    fn release(&mut self) {
        if self.probe.open.swap(false, Ordering::SeqCst) {
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.probe.is_open()
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn output_resolution(&self) -> Resolution {
        self.resolution
    }

    fn fps(&self) -> u32 {
        30
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds [`ScriptedSource`]s and keeps their probes
pub struct ScriptedSourceFactory {
    resolution: Resolution,
    fail_open: bool,
    probes: Mutex<Vec<Arc<SourceProbe>>>,
}

impl ScriptedSourceFactory {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            fail_open: false,
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Every source built fails to open
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn probes(&self) -> Vec<Arc<SourceProbe>> {
        self.probes.lock().clone()
    }
}

impl SourceFactory for ScriptedSourceFactory {
    fn create(&self) -> Result<Box<dyn FrameSource>> {
        let mut probes = self.probes.lock();
        let mut source = ScriptedSource::new(self.resolution)
            .with_device_id(format!("scripted{}", probes.len()));
        if self.fail_open {
            source = source.with_opens([false]);
        }
        probes.push(source.probe());
        Ok(Box::new(source))
    }
}

/// Negotiation steps of a [`PeerTransport`], in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStep {
    AddVideoSource,
    SetRemoteDescription,
    CreateAnswer,
    SetLocalDescription,
}

/// Transport that records calls and can fail at a chosen step
pub struct MockTransport {
    fail_at: Option<TransportStep>,
    close_delay: Duration,
    calls: Mutex<Vec<TransportStep>>,
    closes: AtomicUsize,
    feed: Mutex<Option<Arc<VideoFeed>>>,
    local: Mutex<Option<SessionDescription>>,
}

impl MockTransport {
    fn new(fail_at: Option<TransportStep>, close_delay: Duration) -> Self {
        Self {
            fail_at,
            close_delay,
            calls: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            feed: Mutex::new(None),
            local: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> Vec<TransportStep> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn step(&self, step: TransportStep) -> Result<()> {
        self.calls.lock().push(step);
        if self.fail_at == Some(step) {
            return Err(AppError::Negotiation(format!("{:?} failed", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn add_video_source(&self, feed: Arc<VideoFeed>) -> Result<()> {
        self.step(TransportStep::AddVideoSource)?;
        *self.feed.lock() = Some(feed);
        Ok(())
    }

    async fn set_remote_description(&self, _offer: SessionDescription) -> Result<()> {
        self.step(TransportStep::SetRemoteDescription)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.step(TransportStep::CreateAnswer)?;
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<()> {
        self.step(TransportStep::SetLocalDescription)?;
        *self.local.lock() = Some(answer);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.feed.lock().take();
        Ok(())
    }
}

/// A transport handed out by [`MockTransportFactory`] plus its event sender
#[derive(Clone)]
pub struct MockHandle {
    pub session_id: String,
    pub transport: Arc<MockTransport>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl MockHandle {
    pub async fn send(&self, event: TransportEvent) {
        self.events.send(event).await.unwrap();
    }
}

#[derive(Default)]
pub struct MockTransportFactory {
    fail_at: Option<TransportStep>,
    fail_create: bool,
    close_delay: Duration,
    handles: Mutex<Vec<MockHandle>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, step: TransportStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn handles(&self) -> Vec<MockHandle> {
        self.handles.lock().clone()
    }

    pub fn last(&self) -> Option<MockHandle> {
        self.handles.lock().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        session_id: &str,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>)> {
        if self.fail_create {
            return Err(AppError::Internal("transport creation failed".to_string()));
        }
        let transport = Arc::new(MockTransport::new(self.fail_at, self.close_delay));
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.handles.lock().push(MockHandle {
            session_id: session_id.to_string(),
            transport: transport.clone(),
            events: tx,
        });
        Ok((transport, rx))
    }
}
