use super::{reproject, PointFilter, StereoMatcher, StereoOutput};
use crate::traits::check_size;
use crate::{
    Camera, ColorCamera, ColorImage, DepthCamera, Error, FloatImage, PointXYZ, PointXYZRGB,
    Result, Size,
};
use std::time::Instant;
use tracing::{debug, info};

struct Snapshot {
    output: StereoOutput,
    /// Full per-pixel reprojection, present when the matcher is calibrated.
    points: Option<Vec<PointXYZ>>,
}

/// Two color cameras and a matcher presented as one depth camera.
///
/// [`StereoRig::grab`] pulls a frame from each side, matches them and keeps
/// the result; the capture methods copy out of that latest result. Color is
/// the rectified left frame, amplitude is the disparity, depth is the
/// reprojected Z.
pub struct StereoRig<M> {
    left: Box<dyn ColorCamera>,
    right: Box<dyn ColorCamera>,
    matcher: M,
    filter: PointFilter,
    size: Size,
    left_buf: ColorImage,
    right_buf: ColorImage,
    latest: Option<Snapshot>,
    started: bool,
}

impl<M: StereoMatcher> StereoRig<M> {
    pub fn new(
        left: Box<dyn ColorCamera>,
        right: Box<dyn ColorCamera>,
        matcher: M,
    ) -> Result<Self> {
        let size = left.color_size();
        check_size(size, right.color_size())?;
        Ok(Self {
            left,
            right,
            matcher,
            filter: PointFilter::default(),
            size,
            left_buf: ColorImage::new(size),
            right_buf: ColorImage::new(size),
            latest: None,
            started: false,
        })
    }

    pub fn with_filter(mut self, filter: PointFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> PointFilter {
        self.filter
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn is_calibrated(&self) -> bool {
        self.matcher.reprojection().is_some()
    }

    /// Capture both sides, match and keep the result.
    pub fn grab(&mut self) -> Result<&StereoOutput> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        self.left.capture_color(&mut self.left_buf)?;
        self.right.capture_color(&mut self.right_buf)?;

        let t0 = Instant::now();
        let output = self.matcher.compute(&self.left_buf, &self.right_buf)?;
        check_size(self.size, output.disparity.size())?;
        let points = self
            .matcher
            .reprojection()
            .map(|q| reproject(&output.disparity, &q));
        debug!(
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            reprojected = points.is_some(),
            "stereo pair matched"
        );

        let snapshot = self.latest.insert(Snapshot { output, points });
        Ok(&snapshot.output)
    }

    /// The most recent match, if any.
    pub fn latest(&self) -> Option<&StereoOutput> {
        self.latest.as_ref().map(|s| &s.output)
    }

    fn snapshot(&self) -> Result<&Snapshot> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        self.latest.as_ref().ok_or(Error::NoFrame)
    }

    fn points(&self) -> Result<(&Snapshot, &[PointXYZ])> {
        let snap = self.snapshot()?;
        let points = snap
            .points
            .as_deref()
            .ok_or(Error::Unsupported("3D data requires a calibrated stereo pair"))?;
        Ok((snap, points))
    }
}

impl<M: StereoMatcher> Camera for StereoRig<M> {
    fn name(&self) -> &str {
        "stereo"
    }

    fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.left.start()?;
        self.right.start()?;
        self.started = true;
        info!(
            left = self.left.name(),
            right = self.right.name(),
            size = %self.size,
            calibrated = self.is_calibrated(),
            "stereo rig started"
        );
        Ok(())
    }
}

impl<M: StereoMatcher> ColorCamera for StereoRig<M> {
    fn color_size(&self) -> Size {
        self.size
    }

    fn capture_color(&mut self, buffer: &mut ColorImage) -> Result<()> {
        check_size(self.size, buffer.size())?;
        buffer.copy_from(&self.snapshot()?.output.left)
    }
}

impl<M: StereoMatcher> DepthCamera for StereoRig<M> {
    fn depth_size(&self) -> Size {
        self.size
    }

    fn capture_depth(&mut self, buffer: &mut FloatImage) -> Result<()> {
        check_size(self.size, buffer.size())?;
        let (_, points) = self.points()?;
        for (dst, p) in buffer.data_mut().iter_mut().zip(points) {
            *dst = p.z;
        }
        Ok(())
    }

    fn capture_amplitude(&mut self, buffer: &mut FloatImage) -> Result<()> {
        check_size(self.size, buffer.size())?;
        buffer.copy_from(&self.snapshot()?.output.disparity)
    }

    fn capture_vertex(&mut self, buffer: &mut Vec<PointXYZ>) -> Result<()> {
        let filter = self.filter;
        let (_, points) = self.points()?;
        buffer.extend(filter.apply(points).map(|(_, p)| p));
        Ok(())
    }

    fn capture_colored_vertex(&mut self, buffer: &mut Vec<PointXYZRGB>) -> Result<()> {
        let filter = self.filter;
        let (snap, points) = self.points()?;
        let left = &snap.output.left;
        let width = self.size.width as usize;
        buffer.extend(filter.apply(points).map(|(i, p)| {
            let bgr = left
                .pixel((i % width) as u32, (i / width) as u32)
                .unwrap_or_default();
            PointXYZRGB::from_point(p, bgr)
        }));
        Ok(())
    }
}

#[cfg(all(test, feature = "mock"))]
mod tests {
    use super::*;
    use crate::{ConstantMatcher, MockCamera};
    use std::time::Duration;

    const Q: [[f64; 4]; 4] = [
        [1.0, 0.0, 0.0, -4.0],
        [0.0, 1.0, 0.0, -2.0],
        [0.0, 0.0, 0.0, 400.0],
        [0.0, 0.0, 20.0, 0.0],
    ];

    fn rig(matcher: ConstantMatcher) -> StereoRig<ConstantMatcher> {
        let size = Size::new(8, 4);
        let mut left = MockCamera::new(size, 500.0);
        let mut right = MockCamera::new(size, 500.0);
        left.start().unwrap();
        right.start().unwrap();
        assert!(left.wait_for_frame(Duration::from_secs(5)).unwrap());
        assert!(right.wait_for_frame(Duration::from_secs(5)).unwrap());
        StereoRig::new(Box::new(left), Box::new(right), matcher).unwrap()
    }

    #[test]
    fn test_mismatched_cameras_rejected() {
        let left = MockCamera::new(Size::new(8, 4), 30.0);
        let right = MockCamera::new(Size::new(4, 4), 30.0);
        let res = StereoRig::new(Box::new(left), Box::new(right), ConstantMatcher::new(1.0));
        assert!(matches!(res, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_grab_requires_start() {
        let mut rig = rig(ConstantMatcher::new(10.0));
        assert!(matches!(rig.grab(), Err(Error::NotStarted)));
    }

    #[test]
    fn test_capture_before_grab_has_no_frame() {
        let mut rig = rig(ConstantMatcher::new(10.0));
        rig.start().unwrap();
        let mut buf = ColorImage::new(Size::new(8, 4));
        assert!(matches!(rig.capture_color(&mut buf), Err(Error::NoFrame)));
    }

    #[test]
    fn test_depth_and_vertices_from_calibrated_pair() {
        // z = 400 / (20 * d); d = 40 gives 0.5
        let mut rig = rig(ConstantMatcher::new(40.0).with_reprojection(Q));
        rig.start().unwrap();
        rig.grab().unwrap();

        let mut depth = FloatImage::new(Size::new(8, 4));
        rig.capture_depth(&mut depth).unwrap();
        assert!(depth.data().iter().all(|z| (z - 0.5).abs() < 1e-6));

        let mut amp = FloatImage::new(Size::new(8, 4));
        rig.capture_amplitude(&mut amp).unwrap();
        assert!(amp.data().iter().all(|&d| d == 40.0));

        let mut pts = Vec::new();
        rig.capture_vertex(&mut pts).unwrap();
        rig.capture_vertex(&mut pts).unwrap();
        assert_eq!(pts.len(), 2 * 32);

        let mut colored = Vec::new();
        rig.capture_colored_vertex(&mut colored).unwrap();
        assert_eq!(colored.len(), 32);
        let mut left = ColorImage::new(Size::new(8, 4));
        rig.capture_color(&mut left).unwrap();
        let [b, g, r] = left.pixel(0, 0).unwrap();
        assert_eq!((colored[0].b, colored[0].g, colored[0].r), (b, g, r));
    }

    #[test]
    fn test_far_points_filtered() {
        // d = 10 gives z = 2.0, beyond the default 1.0 cut-off
        let mut rig = rig(ConstantMatcher::new(10.0).with_reprojection(Q));
        rig.start().unwrap();
        rig.grab().unwrap();
        let mut pts = Vec::new();
        rig.capture_vertex(&mut pts).unwrap();
        assert!(pts.is_empty());

        let mut rig = rig.with_filter(PointFilter::new(5.0));
        rig.grab().unwrap();
        rig.capture_vertex(&mut pts).unwrap();
        assert_eq!(pts.len(), 32);
    }

    #[test]
    fn test_uncalibrated_pair_has_no_depth() {
        let mut rig = rig(ConstantMatcher::new(10.0));
        rig.start().unwrap();
        rig.grab().unwrap();
        let mut depth = FloatImage::new(Size::new(8, 4));
        assert!(matches!(
            rig.capture_depth(&mut depth),
            Err(Error::Unsupported(_))
        ));
        let mut amp = FloatImage::new(Size::new(8, 4));
        rig.capture_amplitude(&mut amp).unwrap();
    }
}
