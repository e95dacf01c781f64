use crate::poll::{FrameGrabber, PollingCamera};
use crate::stereo::{StereoMatcher, StereoOutput};
use crate::traits::check_size;
use crate::{
    Camera, ColorImage, DepthCamera, Error, FloatImage, PointXYZ, PointXYZRGB, Result, Size,
};

/// A portable polling camera fed by [`MockGrabber`].
pub type MockCamera = PollingCamera<MockGrabber>;

impl PollingCamera<MockGrabber> {
    pub fn new(size: Size, fps: f64) -> Self {
        Self::with_grabber("mock", MockGrabber::new(), size, fps)
    }
}

/// Produces uniformly filled frames whose value changes on every read, so a
/// reader can tell frames apart and spot a partially written one.
pub struct MockGrabber {
    counter: u64,
    size: Size,
    frame_size: Option<Size>,
    fail_open: bool,
    fail_after: Option<u64>,
}

impl MockGrabber {
    pub fn new() -> Self {
        Self {
            counter: 0,
            size: Size::default(),
            frame_size: None,
            fail_open: false,
            fail_after: None,
        }
    }

    /// Deliver frames of `size` regardless of the size requested at open.
    pub fn with_frame_size(mut self, size: Size) -> Self {
        self.frame_size = Some(size);
        self
    }

    /// Make `open` report a missing device.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail every read once `reads` frames have been delivered.
    pub fn failing_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Byte value of every channel in the `n`-th frame.
    pub fn pattern(n: u64) -> u8 {
        (n % 255) as u8 + 1
    }
}

impl Default for MockGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGrabber for MockGrabber {
    fn open(&mut self, size: Size, _fps: f64) -> Result<()> {
        if self.fail_open {
            return Err(Error::NotFound("mock device".into()));
        }
        self.size = size;
        Ok(())
    }

    fn grab(&mut self) -> Result<ColorImage> {
        let n = self.counter;
        self.counter += 1;
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(Error::Io("mock read failure".into()));
        }
        let size = self.frame_size.unwrap_or(self.size);
        let mut frame = ColorImage::new(size);
        frame.data_mut().fill(Self::pattern(n));
        Ok(frame)
    }
}

/// A depth camera that reports a flat plane at a fixed distance.
pub struct MockDepthCamera {
    size: Size,
    distance: f32,
    started: bool,
}

impl MockDepthCamera {
    pub fn new(size: Size, distance: f32) -> Self {
        Self {
            size,
            distance,
            started: false,
        }
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    fn plane(&self) -> impl Iterator<Item = PointXYZ> + '_ {
        let (w, h) = (self.size.width, self.size.height);
        (0..h).flat_map(move |y| {
            (0..w).map(move |x| PointXYZ::new(x as f32, y as f32, self.distance))
        })
    }
}

impl Camera for MockDepthCamera {
    fn name(&self) -> &str {
        "mock-depth"
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }
}

impl DepthCamera for MockDepthCamera {
    fn depth_size(&self) -> Size {
        self.size
    }

    fn capture_depth(&mut self, buffer: &mut FloatImage) -> Result<()> {
        self.ensure_started()?;
        check_size(self.size, buffer.size())?;
        buffer.data_mut().fill(self.distance);
        Ok(())
    }

    fn capture_amplitude(&mut self, buffer: &mut FloatImage) -> Result<()> {
        self.ensure_started()?;
        check_size(self.size, buffer.size())?;
        buffer.data_mut().fill(1.0);
        Ok(())
    }

    fn capture_vertex(&mut self, buffer: &mut Vec<PointXYZ>) -> Result<()> {
        self.ensure_started()?;
        buffer.extend(self.plane());
        Ok(())
    }

    fn capture_colored_vertex(&mut self, buffer: &mut Vec<PointXYZRGB>) -> Result<()> {
        self.ensure_started()?;
        buffer.extend(
            self.plane()
                .map(|p| PointXYZRGB::from_point(p, [128, 128, 128])),
        );
        Ok(())
    }
}

/// A matcher that passes frames through and reports the same disparity everywhere.
pub struct ConstantMatcher {
    disparity: f32,
    q: Option<[[f64; 4]; 4]>,
}

impl ConstantMatcher {
    pub fn new(disparity: f32) -> Self {
        Self { disparity, q: None }
    }

    pub fn with_reprojection(mut self, q: [[f64; 4]; 4]) -> Self {
        self.q = Some(q);
        self
    }
}

impl StereoMatcher for ConstantMatcher {
    fn compute(&mut self, left: &ColorImage, right: &ColorImage) -> Result<StereoOutput> {
        check_size(left.size(), right.size())?;
        let mut disparity = FloatImage::new(left.size());
        disparity.data_mut().fill(self.disparity);
        Ok(StereoOutput {
            left: left.clone(),
            right: right.clone(),
            disparity,
        })
    }

    fn reprojection(&self) -> Option<[[f64; 4]; 4]> {
        self.q
    }
}
