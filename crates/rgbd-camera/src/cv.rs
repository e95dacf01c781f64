//! Conversions between this crate's buffers and OpenCV matrices.

use crate::{ColorImage, Error, FloatImage, Result, Size};
use opencv::prelude::*;
use opencv::{core, imgproc};

pub fn color_to_mat(img: &ColorImage) -> Result<core::Mat> {
    let flat = core::Mat::from_slice(img.data())?;
    let bgr = flat.reshape(3, img.size().height as i32)?;
    Ok(bgr.try_clone()?)
}

pub fn gray_to_mat(size: Size, data: &[u8]) -> Result<core::Mat> {
    if data.len() != size.area() {
        return Err(Error::SizeMismatch {
            expected: size,
            actual: Size::new(data.len() as u32, 1),
        });
    }
    let flat = core::Mat::from_slice(data)?;
    let gray = flat.reshape(1, size.height as i32)?;
    Ok(gray.try_clone()?)
}

pub fn mat_to_color(mat: &core::Mat) -> Result<ColorImage> {
    if mat.typ() != core::CV_8UC3 {
        return Err(Error::Backend(format!(
            "expected 8-bit BGR frame, got type {}",
            mat.typ()
        )));
    }
    let size = Size::new(mat.cols() as u32, mat.rows() as u32);
    let data = continuous(mat)?.data_bytes()?.to_vec();
    ColorImage::from_bgr(size, data).ok_or_else(|| Error::Backend("unexpected buffer size".into()))
}

pub fn mat_to_float(mat: &core::Mat) -> Result<FloatImage> {
    if mat.typ() != core::CV_32FC1 {
        return Err(Error::Backend(format!(
            "expected single-channel float map, got type {}",
            mat.typ()
        )));
    }
    let size = Size::new(mat.cols() as u32, mat.rows() as u32);
    let data = continuous(mat)?.data_typed::<f32>()?.to_vec();
    FloatImage::from_vec(size, data).ok_or_else(|| Error::Backend("unexpected buffer size".into()))
}

fn continuous(mat: &core::Mat) -> Result<std::borrow::Cow<'_, core::Mat>> {
    if mat.is_continuous() {
        Ok(std::borrow::Cow::Borrowed(mat))
    } else {
        Ok(std::borrow::Cow::Owned(mat.try_clone()?))
    }
}

/// Bring a captured frame to 3-channel BGR at exactly `size`.
pub fn normalize_frame(mat: core::Mat, size: Size) -> Result<core::Mat> {
    let bgr = match mat.channels() {
        3 => mat,
        1 => {
            let mut out = core::Mat::default();
            imgproc::cvt_color(&mat, &mut out, imgproc::COLOR_GRAY2BGR, 0)?;
            out
        }
        4 => {
            let mut out = core::Mat::default();
            imgproc::cvt_color(&mat, &mut out, imgproc::COLOR_BGRA2BGR, 0)?;
            out
        }
        n => return Err(Error::Backend(format!("unsupported channel count {n}"))),
    };
    let (w, h) = (size.width as i32, size.height as i32);
    if bgr.cols() == w && bgr.rows() == h {
        return Ok(bgr);
    }
    let mut resized = core::Mat::default();
    imgproc::resize(
        &bgr,
        &mut resized,
        core::Size::new(w, h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}
