use crate::cv::{mat_to_color, normalize_frame};
use crate::poll::{FrameGrabber, PollingCamera};
use crate::{ColorImage, Error, Result, Size};
use opencv::prelude::*;
use opencv::{core, videoio};
use tracing::{debug, warn};

pub const DEFAULT_SIZE: Size = Size::new(640, 480);
pub const DEFAULT_FPS: f64 = 60.0;

/// A UVC webcam polled on a background thread.
pub type UvCamera = PollingCamera<OpenCvGrabber>;

impl PollingCamera<OpenCvGrabber> {
    /// Camera at `device` with the default 640x480 geometry at 60 fps.
    pub fn new(device: i32) -> Self {
        Self::with_settings(device, DEFAULT_SIZE, DEFAULT_FPS)
    }

    pub fn with_settings(device: i32, size: Size, fps: f64) -> Self {
        Self::with_grabber(
            format!("uvc:{device}"),
            OpenCvGrabber::new(device, videoio::CAP_ANY),
            size,
            fps,
        )
    }
}

/// Reads frames through `cv::VideoCapture`.
pub struct OpenCvGrabber {
    device: i32,
    api: i32,
    size: Size,
    cap: Option<videoio::VideoCapture>,
}

impl OpenCvGrabber {
    pub fn new(device: i32, api: i32) -> Self {
        Self {
            device,
            api,
            size: Size::default(),
            cap: None,
        }
    }
}

pub(crate) fn open_capture(device: i32, api: i32, size: Size, fps: f64) -> Result<videoio::VideoCapture> {
    let mut cap = videoio::VideoCapture::new(device, api)?;
    if !cap.is_opened()? {
        return Err(Error::NotFound(format!("video device {device}")));
    }
    // Drivers are free to ignore these; frames are resized on read.
    for (prop, value) in [
        (videoio::CAP_PROP_FRAME_WIDTH, size.width as f64),
        (videoio::CAP_PROP_FRAME_HEIGHT, size.height as f64),
        (videoio::CAP_PROP_FPS, fps),
    ] {
        if !cap.set(prop, value)? {
            warn!(device, prop, value, "capture property not accepted");
        }
    }
    debug!(
        device,
        width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?,
        height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
        fps = cap.get(videoio::CAP_PROP_FPS)?,
        "capture opened"
    );
    Ok(cap)
}

pub(crate) fn read_frame(cap: &mut videoio::VideoCapture, size: Size) -> Result<ColorImage> {
    let mut mat = core::Mat::default();
    if !cap.read(&mut mat)? || mat.empty() {
        return Err(Error::Io("empty frame".into()));
    }
    mat_to_color(&normalize_frame(mat, size)?)
}

impl FrameGrabber for OpenCvGrabber {
    fn open(&mut self, size: Size, fps: f64) -> Result<()> {
        self.cap = Some(open_capture(self.device, self.api, size, fps)?);
        self.size = size;
        Ok(())
    }

    fn grab(&mut self) -> Result<ColorImage> {
        let cap = self.cap.as_mut().ok_or(Error::NotStarted)?;
        read_frame(cap, self.size)
    }

    fn close(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(e) = cap.release() {
                warn!(device = self.device, error = %e, "failed to release capture");
            }
        }
    }
}
