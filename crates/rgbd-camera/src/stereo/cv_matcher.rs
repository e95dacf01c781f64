use super::{MatcherParams, StereoMatcher, StereoOutput, VarParams};
use crate::calib::{Matrix, StereoCalibration};
use crate::cv::{color_to_mat, mat_to_color, mat_to_float};
use crate::{ColorImage, Error, Result, Size};
use opencv::prelude::*;
use opencv::{calib3d, core, imgproc, video};
use tracing::{debug, info};

/// Precomputed undistort/rectify tables for both cameras.
struct Rectification {
    map11: core::Mat,
    map12: core::Mat,
    map21: core::Mat,
    map22: core::Mat,
    q: [[f64; 4]; 4],
    roi1: core::Rect,
    roi2: core::Rect,
}

impl Rectification {
    fn compute(calib: &StereoCalibration, size: Size) -> Result<Self> {
        let intr = &calib.intrinsics;
        let extr = &calib.extrinsics;
        let m1 = mat_from_matrix(&intr.m1)?;
        let d1 = mat_from_matrix(&intr.d1)?;
        let m2 = mat_from_matrix(&intr.m2)?;
        let d2 = mat_from_matrix(&intr.d2)?;
        let r = mat_from_matrix(&extr.r)?;
        let t = mat_from_matrix(&extr.t)?;

        let img_size = core::Size::new(size.width as i32, size.height as i32);
        let mut r1 = core::Mat::default();
        let mut r2 = core::Mat::default();
        let mut p1 = core::Mat::default();
        let mut p2 = core::Mat::default();
        let mut q = core::Mat::default();
        let mut roi1 = core::Rect::default();
        let mut roi2 = core::Rect::default();
        calib3d::stereo_rectify(
            &m1,
            &d1,
            &m2,
            &d2,
            img_size,
            &r,
            &t,
            &mut r1,
            &mut r2,
            &mut p1,
            &mut p2,
            &mut q,
            calib3d::CALIB_ZERO_DISPARITY,
            -1.0,
            img_size,
            &mut roi1,
            &mut roi2,
        )?;

        let mut map11 = core::Mat::default();
        let mut map12 = core::Mat::default();
        let mut map21 = core::Mat::default();
        let mut map22 = core::Mat::default();
        calib3d::init_undistort_rectify_map(
            &m1,
            &d1,
            &r1,
            &p1,
            img_size,
            core::CV_16SC2,
            &mut map11,
            &mut map12,
        )?;
        calib3d::init_undistort_rectify_map(
            &m2,
            &d2,
            &r2,
            &p2,
            img_size,
            core::CV_16SC2,
            &mut map21,
            &mut map22,
        )?;

        let mut q_rows = [[0.0f64; 4]; 4];
        for (i, row) in q_rows.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = *q.at_2d::<f64>(i as i32, j as i32)?;
            }
        }
        Ok(Self {
            map11,
            map12,
            map21,
            map22,
            q: q_rows,
            roi1,
            roi2,
        })
    }

    fn remap(&self, src: &core::Mat, left: bool) -> Result<core::Mat> {
        let (m1, m2) = if left {
            (&self.map11, &self.map12)
        } else {
            (&self.map21, &self.map22)
        };
        let mut dst = core::Mat::default();
        imgproc::remap(
            src,
            &mut dst,
            m1,
            m2,
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            core::Scalar::default(),
        )?;
        Ok(dst)
    }
}

enum Engine {
    Bm(core::Ptr<calib3d::StereoBM>),
    Sgbm(core::Ptr<calib3d::StereoSGBM>),
    Var(Variational),
}

/// Coarse-to-fine DIS flow refined by the variational solver.
///
/// The refinement alone starts from zero flow at full resolution and cannot
/// reach shifts of more than a few pixels; the DIS pyramid supplies the
/// initial estimate.
struct Variational {
    coarse: core::Ptr<video::DISOpticalFlow>,
    refine: core::Ptr<video::VariationalRefinement>,
    params: VarParams,
}

/// Rectifies and matches frames with OpenCV.
///
/// Without calibration the frames are assumed to be rectified already and
/// no reprojection matrix is available.
pub struct OpenCvMatcher {
    params: MatcherParams,
    size: Size,
    rect: Option<Rectification>,
    engine: Engine,
}

impl OpenCvMatcher {
    pub fn new(
        params: MatcherParams,
        size: Size,
        calibration: Option<&StereoCalibration>,
    ) -> Result<Self> {
        let rect = calibration
            .map(|c| Rectification::compute(c, size))
            .transpose()?;
        let engine = build_engine(&params, rect.as_ref())?;
        info!(
            size = %size,
            disparities = params.num_disparities(),
            rectified = rect.is_some(),
            "stereo matcher ready"
        );
        Ok(Self {
            params,
            size,
            rect,
            engine,
        })
    }

    pub fn params(&self) -> &MatcherParams {
        &self.params
    }
}

fn build_engine(params: &MatcherParams, rect: Option<&Rectification>) -> Result<Engine> {
    let engine = match *params {
        MatcherParams::Bm(p) => {
            let mut bm = calib3d::StereoBM::create(p.num_disparities, p.block_size)?;
            if let Some(r) = rect {
                bm.set_roi1(r.roi1)?;
                bm.set_roi2(r.roi2)?;
            }
            bm.set_pre_filter_cap(p.pre_filter_cap)?;
            bm.set_min_disparity(p.min_disparity)?;
            bm.set_texture_threshold(p.texture_threshold)?;
            bm.set_uniqueness_ratio(p.uniqueness_ratio)?;
            bm.set_speckle_window_size(p.speckle_window_size)?;
            bm.set_speckle_range(p.speckle_range)?;
            bm.set_disp12_max_diff(p.disp12_max_diff)?;
            Engine::Bm(bm)
        }
        MatcherParams::Sgbm(p) => {
            let mode = if p.full_dp {
                calib3d::StereoSGBM_MODE_HH
            } else {
                calib3d::StereoSGBM_MODE_SGBM
            };
            let sgbm = calib3d::StereoSGBM::create(
                p.min_disparity,
                p.num_disparities,
                p.block_size,
                p.p1,
                p.p2,
                p.disp12_max_diff,
                p.pre_filter_cap,
                p.uniqueness_ratio,
                p.speckle_window_size,
                p.speckle_range,
                mode,
            )?;
            Engine::Sgbm(sgbm)
        }
        MatcherParams::Var(p) => {
            let mut coarse = video::DISOpticalFlow::create(video::DISOpticalFlow_PRESET_MEDIUM)?;
            coarse.set_variational_refinement_iterations(0)?;
            let mut refine = video::VariationalRefinement::create()?;
            refine.set_fixed_point_iterations(p.iterations)?;
            refine.set_alpha(p.smoothness)?;
            Engine::Var(Variational {
                coarse,
                refine,
                params: p,
            })
        }
    };
    Ok(engine)
}

impl StereoMatcher for OpenCvMatcher {
    fn compute(&mut self, left: &ColorImage, right: &ColorImage) -> Result<StereoOutput> {
        for frame in [left, right] {
            if frame.size() != self.size {
                return Err(Error::SizeMismatch {
                    expected: self.size,
                    actual: frame.size(),
                });
            }
        }
        let mut img1 = color_to_mat(left)?;
        let mut img2 = color_to_mat(right)?;
        if let Some(rect) = &self.rect {
            img1 = rect.remap(&img1, true)?;
            img2 = rect.remap(&img2, false)?;
        }

        let disparity = match &mut self.engine {
            Engine::Bm(bm) => {
                let (g1, g2) = (to_gray(&img1)?, to_gray(&img2)?);
                let mut raw = core::Mat::default();
                bm.compute(&g1, &g2, &mut raw)?;
                fixed_point_to_pixels(&raw)?
            }
            Engine::Sgbm(sgbm) => {
                let mut raw = core::Mat::default();
                sgbm.compute(&img1, &img2, &mut raw)?;
                fixed_point_to_pixels(&raw)?
            }
            Engine::Var(var) => variational_disparity(var, &img1, &img2)?,
        };
        debug!(algorithm = ?self.params, "disparity computed");

        Ok(StereoOutput {
            left: mat_to_color(&img1)?,
            right: mat_to_color(&img2)?,
            disparity: mat_to_float(&disparity)?,
        })
    }

    fn reprojection(&self) -> Option<[[f64; 4]; 4]> {
        self.rect.as_ref().map(|r| r.q)
    }
}

fn to_gray(src: &core::Mat) -> Result<core::Mat> {
    let mut gray = core::Mat::default();
    imgproc::cvt_color(src, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

/// BM and SGBM report disparity in 1/16 pixel steps.
fn fixed_point_to_pixels(raw: &core::Mat) -> Result<core::Mat> {
    let mut out = core::Mat::default();
    raw.convert_to(&mut out, core::CV_32F, 1.0 / 16.0, 0.0)?;
    Ok(out)
}

/// Horizontal left-to-right flow, negated and clamped to the search range.
fn variational_disparity(
    var: &mut Variational,
    img1: &core::Mat,
    img2: &core::Mat,
) -> Result<core::Mat> {
    let p = &var.params;
    let (g1, g2) = (to_gray(img1)?, to_gray(img2)?);
    let mut flow = core::Mat::default();
    var.coarse.calc(&g1, &g2, &mut flow)?;
    var.refine.calc(&g1, &g2, &mut flow)?;

    let mut fx = core::Mat::default();
    core::extract_channel(&flow, &mut fx, 0)?;
    let mut disp = core::Mat::default();
    fx.convert_to(&mut disp, core::CV_32F, -1.0, 0.0)?;
    if p.median_filter {
        let mut filtered = core::Mat::default();
        imgproc::median_blur(&disp, &mut filtered, 3)?;
        disp = filtered;
    }
    let lower = -p.max_disparity as f64;
    let upper = -p.min_disparity as f64;
    let mut floored = core::Mat::default();
    imgproc::threshold(&disp, &mut floored, lower, 0.0, imgproc::THRESH_TOZERO)?;
    let mut out = core::Mat::default();
    imgproc::threshold(&floored, &mut out, upper, 0.0, imgproc::THRESH_TRUNC)?;
    Ok(out)
}

fn mat_from_matrix(m: &Matrix) -> Result<core::Mat> {
    let mut mat = core::Mat::zeros(m.rows() as i32, m.cols() as i32, core::CV_64F)?.to_mat()?;
    for r in 0..m.rows() {
        for c in 0..m.cols() {
            *mat.at_2d_mut::<f64>(r as i32, c as i32)? = m.get(r, c).unwrap_or_default();
        }
    }
    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stereo::Algorithm;

    fn lattice(i: usize, j: usize) -> f32 {
        let mut h = (i as u32).wrapping_mul(374_761_393) ^ (j as u32).wrapping_mul(668_265_263);
        h = (h ^ (h >> 13)).wrapping_mul(1_274_126_177);
        (h >> 24) as f32
    }

    // Bilinear value noise with 4px cells.
    fn value(x: usize, y: usize) -> u8 {
        let (cx, cy) = (x / 4, y / 4);
        let (fx, fy) = ((x % 4) as f32 / 4.0, (y % 4) as f32 / 4.0);
        let top = lattice(cx, cy) * (1.0 - fx) + lattice(cx + 1, cy) * fx;
        let bottom = lattice(cx, cy + 1) * (1.0 - fx) + lattice(cx + 1, cy + 1) * fx;
        (top * (1.0 - fy) + bottom * fy) as u8
    }

    fn textured(size: Size, offset: usize) -> ColorImage {
        let mut img = ColorImage::new(size);
        let w = size.width as usize;
        for y in 0..size.height as usize {
            for x in 0..w {
                let i = (y * w + x) * 3;
                img.data_mut()[i..i + 3].fill(value(x + offset, y));
            }
        }
        img
    }

    #[test]
    fn test_variational_recovers_large_shift() {
        let size = Size::new(192, 96);
        let shift = 12;
        let left = textured(size, 0);
        let right = textured(size, shift);
        let params = MatcherParams::derive(Algorithm::Var, Some(32), None, size.width, 3);
        let mut matcher = OpenCvMatcher::new(params, size, None).unwrap();
        assert!(matcher.reprojection().is_none());

        let out = matcher.compute(&left, &right).unwrap();
        let w = size.width as usize;
        let mut interior: Vec<f32> = out
            .disparity
            .data()
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let (x, y) = (i % w, i / w);
                (32..w - 32).contains(&x) && (16..80).contains(&y)
            })
            .map(|(_, &d)| d)
            .collect();
        interior.sort_by(|a, b| a.total_cmp(b));
        let median = interior[interior.len() / 2];
        assert!((median - shift as f32).abs() < 1.5, "median disparity {median}");
    }

    #[test]
    fn test_frame_size_checked() {
        let size = Size::new(64, 32);
        let params = MatcherParams::derive(Algorithm::Bm, Some(16), None, size.width, 3);
        let mut matcher = OpenCvMatcher::new(params, size, None).unwrap();
        let small = ColorImage::new(Size::new(32, 32));
        let ok = ColorImage::new(size);
        assert!(matches!(
            matcher.compute(&ok, &small),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
