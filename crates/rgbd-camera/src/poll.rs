//! Background-poll camera backend.
//!
//! A [`PollingCamera`] owns one [`FrameGrabber`] and, once started, one worker
//! thread that keeps a single lock-protected frame slot fresh. Readers copy the
//! slot out under the same lock, so a capture never waits on device I/O and
//! never observes a half-written frame. It may observe a stale one.
//!
//! A failed read leaves the previous frame in place, increments
//! [`PollStats::failures`] and is logged once per failure streak at `warn`.
//! Frames whose geometry differs from the configured size are dropped and
//! counted in [`PollStats::rejected`].

use crate::traits::check_size;
use crate::{Camera, ColorCamera, ColorImage, Error, Result, Size};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Device side of a polling camera: open once, then hand out frames.
pub trait FrameGrabber: Send + 'static {
    /// Open the device at the requested geometry and frame rate.
    fn open(&mut self, size: Size, fps: f64) -> Result<()>;

    /// Read one frame. Blocking is fine; this runs on the worker thread.
    fn grab(&mut self) -> Result<ColorImage>;

    /// Release the device.
    fn close(&mut self) {}
}

/// Counters maintained by the worker thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub frames: u64,
    pub failures: u64,
    pub rejected: u64,
    pub last_frame_at: Option<OffsetDateTime>,
}

struct Slot {
    frame: ColorImage,
    stats: PollStats,
}

type Shared = Arc<(Mutex<Slot>, Condvar)>;

struct Worker<G> {
    stop_tx: Sender<()>,
    handle: JoinHandle<G>,
}

pub struct PollingCamera<G: FrameGrabber> {
    name: String,
    size: Size,
    fps: f64,
    grabber: Option<G>,
    shared: Shared,
    worker: Option<Worker<G>>,
}

impl<G: FrameGrabber> PollingCamera<G> {
    /// Wrap a grabber. Nothing is opened until [`Camera::start`].
    pub fn with_grabber(name: impl Into<String>, grabber: G, size: Size, fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        Self {
            name: name.into(),
            size,
            fps,
            grabber: Some(grabber),
            shared: Arc::new((
                Mutex::new(Slot {
                    frame: ColorImage::new(size),
                    stats: PollStats::default(),
                }),
                Condvar::new(),
            )),
            worker: None,
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Poll period derived from the configured frame rate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn stats(&self) -> Result<PollStats> {
        let (lock, _) = &*self.shared;
        let slot = lock
            .lock()
            .map_err(|_| Error::Backend("frame slot lock poisoned".into()))?;
        Ok(slot.stats)
    }

    /// Block until at least one frame has been stored, or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn wait_for_frame(&self, timeout: Duration) -> Result<bool> {
        if self.worker.is_none() {
            return Err(Error::NotStarted);
        }
        let (lock, cvar) = &*self.shared;
        let guard = lock
            .lock()
            .map_err(|_| Error::Backend("frame slot lock poisoned".into()))?;
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |slot| slot.stats.frames == 0)
            .map_err(|_| Error::Backend("frame slot lock poisoned".into()))?;
        Ok(guard.stats.frames > 0)
    }

    /// Signal the worker, join it and release the device.
    ///
    /// The camera can be started again afterwards.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        match worker.handle.join() {
            Ok(mut grabber) => {
                grabber.close();
                self.grabber = Some(grabber);
                info!(camera = %self.name, "polling stopped");
            }
            Err(_) => warn!(camera = %self.name, "poll worker panicked"),
        }
    }
}

impl<G: FrameGrabber> Camera for PollingCamera<G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!(camera = %self.name, "already started");
            return Ok(());
        }
        let mut grabber = self
            .grabber
            .take()
            .ok_or_else(|| Error::Backend(format!("{}: grabber unavailable", self.name)))?;
        if let Err(e) = grabber.open(self.size, self.fps) {
            self.grabber = Some(grabber);
            return Err(e);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let size = self.size;
        let period = self.period();
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("poll-{}", self.name))
            .spawn(move || {
                let mut grabber = grabber;
                let mut failing = false;
                loop {
                    let started = Instant::now();
                    if !poll_once(&mut grabber, &shared, size, &name, &mut failing) {
                        break;
                    }
                    match stop_rx.recv_timeout(period.saturating_sub(started.elapsed())) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(camera = %name, "poll worker exiting");
                grabber
            })
            .map_err(|e| Error::Backend(format!("spawn poll worker: {e}")))?;

        info!(camera = %self.name, size = %self.size, fps = self.fps, "polling started");
        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }
}

impl<G: FrameGrabber> ColorCamera for PollingCamera<G> {
    fn color_size(&self) -> Size {
        self.size
    }

    fn capture_color(&mut self, buffer: &mut ColorImage) -> Result<()> {
        if self.worker.is_none() {
            return Err(Error::NotStarted);
        }
        check_size(self.size, buffer.size())?;
        let (lock, _) = &*self.shared;
        let slot = lock
            .lock()
            .map_err(|_| Error::Backend("frame slot lock poisoned".into()))?;
        buffer.copy_from(&slot.frame)
    }
}

impl<G: FrameGrabber> Drop for PollingCamera<G> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One worker iteration. Returns `false` when the slot is unusable.
fn poll_once<G: FrameGrabber>(
    grabber: &mut G,
    shared: &Shared,
    size: Size,
    name: &str,
    failing: &mut bool,
) -> bool {
    let grabbed = grabber.grab();
    let (lock, cvar) = &**shared;
    let Ok(mut slot) = lock.lock() else {
        warn!(camera = %name, "frame slot lock poisoned; stopping poll");
        return false;
    };
    match grabbed {
        Ok(frame) if frame.size() == size => {
            slot.frame = frame;
            slot.stats.frames += 1;
            slot.stats.last_frame_at = Some(OffsetDateTime::now_utc());
            if *failing {
                info!(camera = %name, failures = slot.stats.failures, "frame reads recovered");
                *failing = false;
            }
            cvar.notify_all();
        }
        Ok(frame) => {
            slot.stats.rejected += 1;
            warn!(
                camera = %name,
                expected = %size,
                actual = %frame.size(),
                "dropping frame with unexpected size"
            );
        }
        Err(e) => {
            slot.stats.failures += 1;
            if *failing {
                debug!(camera = %name, error = %e, "frame read failed");
            } else {
                warn!(camera = %name, error = %e, "frame read failed; keeping previous frame");
                *failing = true;
            }
        }
    }
    true
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{MockCamera, MockGrabber};

    const WAIT: Duration = Duration::from_secs(5);

    fn wait_until(cam: &PollingCamera<MockGrabber>, pred: impl Fn(&PollStats) -> bool) -> PollStats {
        let deadline = Instant::now() + WAIT;
        loop {
            let stats = cam.stats().unwrap();
            if pred(&stats) || Instant::now() > deadline {
                return stats;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_capture_before_start_fails() {
        let mut cam = MockCamera::new(Size::new(4, 4), 100.0);
        let mut buf = ColorImage::new(Size::new(4, 4));
        assert!(matches!(cam.capture_color(&mut buf), Err(Error::NotStarted)));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut cam = MockCamera::new(Size::new(4, 4), 100.0);
        cam.start().unwrap();
        cam.start().unwrap();
        assert!(cam.is_running());
        assert!(cam.wait_for_frame(WAIT).unwrap());
    }

    #[test]
    fn test_open_failure_surfaces_from_start() {
        let grabber = MockGrabber::new().failing_open();
        let mut cam = PollingCamera::with_grabber("broken", grabber, Size::new(4, 4), 30.0);
        let err = cam.start().unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!cam.is_running());
    }

    #[test]
    fn test_capture_keeps_configured_size() {
        let size = Size::new(16, 8);
        let mut cam = MockCamera::new(size, 200.0);
        cam.start().unwrap();
        assert!(cam.wait_for_frame(WAIT).unwrap());
        let mut buf = ColorImage::new(size);
        for _ in 0..20 {
            cam.capture_color(&mut buf).unwrap();
            assert_eq!(buf.size(), size);
            assert_eq!(buf.data().len(), size.area() * 3);
        }
        let mut wrong = ColorImage::new(Size::new(8, 8));
        assert!(matches!(
            cam.capture_color(&mut wrong),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_sized_frames_are_rejected() {
        let size = Size::new(8, 8);
        let grabber = MockGrabber::new().with_frame_size(Size::new(4, 4));
        let mut cam = PollingCamera::with_grabber("odd", grabber, size, 500.0);
        cam.start().unwrap();
        let stats = wait_until(&cam, |s| s.rejected >= 3);
        assert!(stats.rejected >= 3);
        assert_eq!(stats.frames, 0);

        let mut buf = ColorImage::new(size);
        cam.capture_color(&mut buf).unwrap();
        assert!(buf.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_no_torn_frames_under_concurrent_reads() {
        let size = Size::new(320, 240);
        let mut cam = MockCamera::new(size, 1000.0);
        cam.start().unwrap();
        assert!(cam.wait_for_frame(WAIT).unwrap());

        let mut buf = ColorImage::new(size);
        let mut seen = std::collections::HashSet::new();
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            cam.capture_color(&mut buf).unwrap();
            let first = buf.data()[0];
            assert!(
                buf.data().iter().all(|&b| b == first),
                "torn frame observed"
            );
            seen.insert(first);
        }
        assert!(seen.len() > 1, "poll worker never refreshed the slot");
    }

    #[test]
    fn test_failed_reads_keep_previous_frame() {
        let size = Size::new(4, 4);
        // Every read after the first fails.
        let grabber = MockGrabber::new().failing_after(1);
        let mut cam = PollingCamera::with_grabber("flaky", grabber, size, 500.0);
        cam.start().unwrap();
        let stats = wait_until(&cam, |s| s.frames == 1 && s.failures >= 3);
        assert_eq!(stats.frames, 1);
        assert!(stats.failures >= 3);
        assert!(stats.last_frame_at.is_some());

        let mut buf = ColorImage::new(size);
        cam.capture_color(&mut buf).unwrap();
        assert!(buf.data().iter().all(|&b| b == MockGrabber::pattern(0)));
    }

    #[test]
    fn test_stop_joins_and_allows_restart() {
        let mut cam = MockCamera::new(Size::new(4, 4), 1.0);
        cam.start().unwrap();
        // A 1 fps worker sleeps for a second between reads; stop must not wait that out.
        let t0 = Instant::now();
        cam.stop();
        assert!(t0.elapsed() < Duration::from_millis(900));
        assert!(!cam.is_running());

        let mut buf = ColorImage::new(Size::new(4, 4));
        assert!(matches!(cam.capture_color(&mut buf), Err(Error::NotStarted)));

        cam.start().unwrap();
        assert!(cam.is_running());
    }
}
