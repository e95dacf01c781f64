//! Stereo calibration files in OpenCV `FileStorage` YAML layout.
//!
//! Intrinsics carry `M1`, `D1`, `M2`, `D2`; extrinsics carry `R`, `T` and the
//! valid-pixel rectangles `V1`, `V2`. Other keys are ignored.

use crate::{Error, Rect, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Dense row-major `f64` matrix.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    #[serde(default)]
    dt: Option<String>,
    data: Vec<f64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = String;

    fn try_from(raw: RawMatrix) -> core::result::Result<Self, Self::Error> {
        if let Some(dt) = raw.dt.as_deref() {
            if !matches!(dt, "d" | "f") {
                return Err(format!("unsupported matrix element type '{dt}'"));
            }
        }
        if raw.data.len() != raw.rows * raw.cols {
            return Err(format!(
                "matrix declares {}x{} but holds {} values",
                raw.rows,
                raw.cols,
                raw.data.len()
            ));
        }
        Ok(Matrix {
            rows: raw.rows,
            cols: raw.cols,
            data: raw.data,
        })
    }
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    fn expect_shape(&self, key: &str, rows: usize, cols: usize) -> Result<()> {
        if self.rows != rows || self.cols != cols {
            return Err(Error::Calibration(format!(
                "{key} must be {rows}x{cols}, found {}x{}",
                self.rows, self.cols
            )));
        }
        Ok(())
    }

    fn expect_vector(&self, key: &str, lens: &[usize]) -> Result<()> {
        let is_vector = self.rows == 1 || self.cols == 1;
        if !is_vector || !lens.contains(&self.len()) {
            return Err(Error::Calibration(format!(
                "{key} must be a vector with one of {lens:?} elements, found {}x{}",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

/// Per-camera projection and distortion parameters.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Intrinsics {
    #[serde(rename = "M1")]
    pub m1: Matrix,
    #[serde(rename = "D1")]
    pub d1: Matrix,
    #[serde(rename = "M2")]
    pub m2: Matrix,
    #[serde(rename = "D2")]
    pub d2: Matrix,
}

const DISTORTION_LENS: &[usize] = &[4, 5, 8, 12, 14];

impl Intrinsics {
    pub fn validate(&self) -> Result<()> {
        self.m1.expect_shape("M1", 3, 3)?;
        self.m2.expect_shape("M2", 3, 3)?;
        self.d1.expect_vector("D1", DISTORTION_LENS)?;
        self.d2.expect_vector("D2", DISTORTION_LENS)
    }
}

/// Relative pose of the right camera and the valid rectified regions.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Extrinsics {
    #[serde(rename = "R")]
    pub r: Matrix,
    #[serde(rename = "T")]
    pub t: Matrix,
    #[serde(rename = "V1", default, deserialize_with = "de_rect")]
    pub v1: Rect,
    #[serde(rename = "V2", default, deserialize_with = "de_rect")]
    pub v2: Rect,
}

impl Extrinsics {
    pub fn validate(&self) -> Result<()> {
        // Rotation may be stored as a matrix or a Rodrigues vector.
        if !(self.r.rows == 3 && self.r.cols == 3) {
            self.r.expect_vector("R", &[3])?;
        }
        self.t.expect_vector("T", &[3])
    }
}

fn de_rect<'de, D>(de: D) -> core::result::Result<Rect, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let [x, y, width, height] = <[i32; 4]>::deserialize(de)?;
    Ok(Rect::new(x, y, width, height))
}

/// Intrinsics and extrinsics of one stereo pair.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoCalibration {
    pub intrinsics: Intrinsics,
    pub extrinsics: Extrinsics,
}

impl StereoCalibration {
    pub fn load(intrinsics: impl AsRef<Path>, extrinsics: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            intrinsics: load_intrinsics(intrinsics)?,
            extrinsics: load_extrinsics(extrinsics)?,
        })
    }
}

pub fn load_intrinsics(path: impl AsRef<Path>) -> Result<Intrinsics> {
    let intr: Intrinsics = read_file_storage(path.as_ref())?;
    intr.validate()?;
    Ok(intr)
}

pub fn load_extrinsics(path: impl AsRef<Path>) -> Result<Extrinsics> {
    let extr: Extrinsics = read_file_storage(path.as_ref())?;
    extr.validate()?;
    Ok(extr)
}

fn read_file_storage<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("failed to open file {}: {e}", path.display())))?;
    debug!(path = %path.display(), bytes = raw.len(), "read calibration file");
    parse_file_storage(&raw)
        .map_err(|e| Error::Calibration(format!("{}: {e}", path.display())))
}

/// Parse OpenCV YAML after dropping the `%YAML:1.0` directive and `!!` type tags,
/// neither of which a standard YAML reader accepts in OpenCV's spelling.
pub fn parse_file_storage<T: DeserializeOwned>(raw: &str) -> core::result::Result<T, String> {
    let mut cleaned = String::with_capacity(raw.len());
    for line in raw.lines() {
        if line.trim_start().starts_with("%YAML") {
            continue;
        }
        cleaned.push_str(&strip_tags(line));
        cleaned.push('\n');
    }
    serde_yaml::from_str(&cleaned).map_err(|e| e.to_string())
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find("!!") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}
