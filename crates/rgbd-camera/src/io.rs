use crate::{Error, PointXYZ, PointXYZRGB, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[cfg(feature = "opencv")]
use crate::{ColorImage, Size};
#[cfg(feature = "opencv")]
use opencv::{core, imgcodecs};

/// Write points as an ASCII PLY file.
pub fn write_ply(path: impl AsRef<Path>, points: &[PointXYZ]) -> Result<()> {
    let mut body = String::with_capacity(points.len() * 24);
    for p in points {
        let _ = writeln!(body, "{} {} {}", p.x, p.y, p.z);
    }
    write_ply_file(
        path.as_ref(),
        points.len(),
        "property float x\nproperty float y\nproperty float z\n",
        &body,
    )
}

/// Write colored points as an ASCII PLY file.
pub fn write_ply_rgb(path: impl AsRef<Path>, points: &[PointXYZRGB]) -> Result<()> {
    let mut body = String::with_capacity(points.len() * 36);
    for p in points {
        let _ = writeln!(body, "{} {} {} {} {} {}", p.x, p.y, p.z, p.r, p.g, p.b);
    }
    write_ply_file(
        path.as_ref(),
        points.len(),
        "property float x\nproperty float y\nproperty float z\n\
         property uchar red\nproperty uchar green\nproperty uchar blue\n",
        &body,
    )
}

fn write_ply_file(path: &Path, count: usize, properties: &str, body: &str) -> Result<()> {
    let header = format!(
        "ply\nformat ascii 1.0\ncomment generated by rgbd-camera\nelement vertex {count}\n{properties}end_header\n"
    );
    let mut out = String::with_capacity(header.len() + body.len());
    out.push_str(&header);
    out.push_str(body);
    fs::write(path, out).map_err(|e| Error::Io(format!("{}: {e}", path.display())))
}

/// Write an 8-bit single-channel image (e.g. a disparity preview).
#[cfg(feature = "opencv")]
pub fn write_gray8_png(path: impl AsRef<Path>, size: Size, data: &[u8]) -> Result<()> {
    let gray = crate::cv::gray_to_mat(size, data)?;
    write_image(path.as_ref(), &gray)
}

#[cfg(feature = "opencv")]
pub fn write_color_png(path: impl AsRef<Path>, image: &ColorImage) -> Result<()> {
    let bgr = crate::cv::color_to_mat(image)?;
    write_image(path.as_ref(), &bgr)
}

#[cfg(feature = "opencv")]
fn write_image(path: &Path, mat: &core::Mat) -> Result<()> {
    let name = path.to_string_lossy();
    if !imgcodecs::imwrite(&name, mat, &core::Vector::new())? {
        return Err(Error::Io(format!("{name}: image could not be written")));
    }
    Ok(())
}
