use crate::args::{Args, CameraKind};
use anyhow::{Context, Result};
use rgbd_camera::calib::StereoCalibration;
use rgbd_camera::stereo::{
    disparity_to_u8, MatcherParams, PointFilter, StereoMatcher, StereoOutput, StereoRig,
};
use rgbd_camera::{Camera, ColorCamera, DepthCamera, MockCamera, PointXYZRGB, Size};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[cfg(feature = "opencv")]
use crate::display::Preview;
#[cfg(feature = "viz")]
use crate::viewer::CloudViewer;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopReason {
    Escape,
    FrameLimit,
    Interrupted,
    ViewerClosed,
}

pub fn run(args: &Args) -> Result<()> {
    if let Some(scale) = args.scale {
        info!(scale, "--scale is accepted but has no effect");
    }
    // Calibration comes first so a bad file never touches the cameras.
    let calibration = load_calibration(args)?;

    let size = Size::new(args.width, args.height);
    let params = MatcherParams::derive(
        args.algorithm,
        args.max_disparity,
        args.blocksize,
        size.width,
        3,
    );
    info!(
        algorithm = %args.algorithm,
        disparities = params.num_disparities(),
        ?params,
        "matcher configured"
    );

    let (left, right) = open_cameras(args, size)?;
    let matcher = build_matcher(params, size, calibration.as_ref())?;
    let mut rig = StereoRig::new(left, right, matcher)?
        .with_filter(PointFilter::new(args.max_depth as f32));
    rig.start().context("failed to start cameras")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "Ctrl-C handler not installed");
    }

    let mut ui = Ui::new(args, size, calibration.as_ref())?;
    let mut cloud: Vec<PointXYZRGB> = Vec::new();
    let mut frames = 0u64;
    let reason = loop {
        if interrupted.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }
        if args.frames > 0 && frames >= args.frames {
            break StopReason::FrameLimit;
        }

        let t0 = Instant::now();
        let output = rig.grab()?;
        info!(
            elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
            frame = frames,
            "disparity computed"
        );
        let preview = disparity_to_u8(&output.disparity, params.preview_scale());
        ui.show(output, &preview, size)?;

        if rig.is_calibrated() {
            cloud.clear();
            rig.capture_colored_vertex(&mut cloud)?;
            ui.update_cloud(&cloud)?;
        }
        frames += 1;

        if let Some(reason) = ui.poll()? {
            break reason;
        }
    };
    info!(?reason, frames, points = cloud.len(), "stereo loop finished");

    write_outputs(args, rig.latest(), &params, &cloud)
}

fn load_calibration(args: &Args) -> Result<Option<StereoCalibration>> {
    let (Some(intrinsics), Some(extrinsics)) = (&args.intrinsics, &args.extrinsics) else {
        return Ok(None);
    };
    let calibration = StereoCalibration::load(intrinsics, extrinsics)?;
    info!(
        intrinsics = %intrinsics.display(),
        extrinsics = %extrinsics.display(),
        "calibration loaded"
    );
    Ok(Some(calibration))
}

type CameraPair = (Box<dyn ColorCamera>, Box<dyn ColorCamera>);

fn pair(left: impl ColorCamera + 'static, right: impl ColorCamera + 'static) -> CameraPair {
    (Box::new(left), Box::new(right))
}

fn open_cameras(args: &Args, size: Size) -> Result<CameraPair> {
    match args.camera {
        CameraKind::Mock => Ok(pair(
            MockCamera::new(size, args.fps),
            MockCamera::new(size, args.fps),
        )),
        #[cfg(feature = "opencv")]
        CameraKind::Uvc => Ok(pair(
            rgbd_camera::UvCamera::with_settings(args.left_device, size, args.fps),
            rgbd_camera::UvCamera::with_settings(args.right_device, size, args.fps),
        )),
        #[cfg(feature = "opencv")]
        CameraKind::Ueye => {
            let ueye = |device| {
                rgbd_camera::UEye::new(device, &args.ueye_config)
                    .with_size(size)
                    .with_fps(args.fps)
            };
            Ok(pair(ueye(args.left_device), ueye(args.right_device)))
        }
        #[cfg(not(feature = "opencv"))]
        CameraKind::Uvc | CameraKind::Ueye => Err(anyhow::anyhow!(
            "OpenCV backend not enabled at compile time; rebuild with --features opencv or use --camera=mock"
        )),
    }
}

#[cfg(feature = "opencv")]
fn build_matcher(
    params: MatcherParams,
    size: Size,
    calibration: Option<&StereoCalibration>,
) -> Result<Box<dyn StereoMatcher>> {
    let matcher = rgbd_camera::stereo::OpenCvMatcher::new(params, size, calibration)
        .context("failed to prepare rectification")?;
    Ok(Box::new(matcher))
}

#[cfg(not(feature = "opencv"))]
fn build_matcher(
    params: MatcherParams,
    _size: Size,
    calibration: Option<&StereoCalibration>,
) -> Result<Box<dyn StereoMatcher>> {
    if calibration.is_some() {
        warn!("rectification and reprojection need OpenCV; calibration is ignored");
    }
    let disparity = params.num_disparities() as f32 / 2.0;
    Ok(Box::new(rgbd_camera::ConstantMatcher::new(disparity)))
}

fn write_outputs(
    args: &Args,
    latest: Option<&StereoOutput>,
    params: &MatcherParams,
    cloud: &[PointXYZRGB],
) -> Result<()> {
    if let Some(path) = &args.disparity_output {
        match latest {
            Some(output) => write_disparity(path, output, params)?,
            None => warn!(path = %path.display(), "no frame was matched; disparity not written"),
        }
    }
    if let Some(path) = &args.point_cloud_output {
        rgbd_camera::io::write_ply_rgb(path, cloud)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), points = cloud.len(), "point cloud written");
    }
    Ok(())
}

#[cfg(feature = "opencv")]
fn write_disparity(
    path: &std::path::Path,
    output: &StereoOutput,
    params: &MatcherParams,
) -> Result<()> {
    let preview = disparity_to_u8(&output.disparity, params.preview_scale());
    rgbd_camera::io::write_gray8_png(path, output.disparity.size(), &preview)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "disparity written");
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn write_disparity(
    path: &std::path::Path,
    _output: &StereoOutput,
    _params: &MatcherParams,
) -> Result<()> {
    warn!(path = %path.display(), "PNG output needs OpenCV; disparity not written");
    Ok(())
}

/// Optional preview windows and 3D viewer.
struct Ui {
    #[cfg(feature = "opencv")]
    preview: Option<Preview>,
    #[cfg(feature = "viz")]
    viewer: Option<CloudViewer>,
}

impl Ui {
    #[cfg(not(feature = "opencv"))]
    fn new(args: &Args, _size: Size, _calibration: Option<&StereoCalibration>) -> Result<Self> {
        if !args.no_display {
            warn!("preview windows need OpenCV; running without display");
        }
        Ok(Self {})
    }

    #[cfg(feature = "opencv")]
    fn new(args: &Args, size: Size, calibration: Option<&StereoCalibration>) -> Result<Self> {
        let preview = if args.no_display {
            None
        } else {
            let rois = calibration.map(|c| (c.extrinsics.v1, c.extrinsics.v2));
            Some(Preview::new(
                size,
                rois.map(|r| r.0),
                rois.map(|r| r.1),
            )?)
        };
        #[cfg(feature = "viz")]
        let viewer = if args.no_display || calibration.is_none() {
            None
        } else {
            Some(CloudViewer::new()?)
        };
        Ok(Self {
            preview,
            #[cfg(feature = "viz")]
            viewer,
        })
    }

    fn show(&mut self, output: &StereoOutput, disparity: &[u8], size: Size) -> Result<()> {
        #[cfg(feature = "opencv")]
        if let Some(preview) = &self.preview {
            preview.show(&output.left, &output.right, disparity, size)?;
        }
        #[cfg(not(feature = "opencv"))]
        let _ = (output, disparity, size);
        Ok(())
    }

    fn update_cloud(&mut self, cloud: &[PointXYZRGB]) -> Result<()> {
        #[cfg(feature = "viz")]
        if let Some(viewer) = &mut self.viewer {
            viewer.update(cloud)?;
        }
        #[cfg(not(feature = "viz"))]
        let _ = cloud;
        Ok(())
    }

    fn poll(&self) -> Result<Option<StopReason>> {
        #[cfg(feature = "opencv")]
        if let Some(preview) = &self.preview {
            if preview.escape_pressed()? {
                return Ok(Some(StopReason::Escape));
            }
        }
        #[cfg(feature = "viz")]
        if let Some(viewer) = &self.viewer {
            if viewer.was_stopped()? {
                return Ok(Some(StopReason::ViewerClosed));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        crate::args::parse(
            ["stereo-match", "--camera=mock", "--no-display", "--width=32", "--height=16"]
                .into_iter()
                .chain(extra.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_calibration_file_fails_before_cameras() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("intr.yml");
        let missing = missing.to_str().unwrap();
        let err = run(&args(&["-i", missing, "-e", missing])).unwrap_err();
        assert!(format!("{err:#}").contains("failed to open file"), "{err:#}");
    }

    #[test]
    fn test_mock_pipeline_honours_frame_limit() {
        run(&args(&["--frames=3", "--fps=200"])).unwrap();
    }
}
