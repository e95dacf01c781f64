use serde::{Deserialize, Serialize};
use std::fmt;

/// Image geometry in pixels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer region of interest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Clamp to the bounds of an image of `size`.
    pub fn clamp_to(&self, size: Size) -> Rect {
        let w = size.width as i32;
        let h = size.height as i32;
        let x0 = self.x.clamp(0, w);
        let y0 = self.y.clamp(0, h);
        let x1 = self.x.saturating_add(self.width).clamp(x0, w);
        let y1 = self.y.saturating_add(self.height).clamp(y0, h);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Dense 3-channel 8-bit image in BGR byte order, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorImage {
    size: Size,
    data: Vec<u8>,
}

impl ColorImage {
    pub const CHANNELS: usize = 3;

    /// Allocate a black image of the given geometry.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0u8; size.area() * Self::CHANNELS],
        }
    }

    /// Wrap existing BGR bytes. Returns `None` if the length does not match `size`.
    pub fn from_bgr(size: Size, data: Vec<u8>) -> Option<Self> {
        (data.len() == size.area() * Self::CHANNELS).then_some(Self { size, data })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// BGR triple at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let idx = (y as usize * self.size.width as usize + x as usize) * Self::CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Overwrite this buffer with `src` without reallocating.
    pub fn copy_from(&mut self, src: &ColorImage) -> crate::Result<()> {
        if src.size != self.size {
            return Err(crate::Error::SizeMismatch {
                expected: src.size,
                actual: self.size,
            });
        }
        self.data.copy_from_slice(&src.data);
        Ok(())
    }
}

/// Dense single-channel `f32` image (depth, amplitude, disparity).
#[derive(Clone, Debug, PartialEq)]
pub struct FloatImage {
    size: Size,
    data: Vec<f32>,
}

impl FloatImage {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0.0; size.area()],
        }
    }

    pub fn from_vec(size: Size, data: Vec<f32>) -> Option<Self> {
        (data.len() == size.area()).then_some(Self { size, data })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        Some(self.data[y as usize * self.size.width as usize + x as usize])
    }

    pub fn copy_from(&mut self, src: &FloatImage) -> crate::Result<()> {
        if src.size != self.size {
            return Err(crate::Error::SizeMismatch {
                expected: src.size,
                actual: self.size,
            });
        }
        self.data.copy_from_slice(&src.data);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointXYZ {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PointXYZ {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointXYZRGB {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PointXYZRGB {
    pub fn from_point(p: PointXYZ, [b, g, r]: [u8; 3]) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            r,
            g,
            b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bgr_rejects_wrong_length() {
        assert!(ColorImage::from_bgr(Size::new(2, 2), vec![0; 11]).is_none());
        assert!(ColorImage::from_bgr(Size::new(2, 2), vec![0; 12]).is_some());
    }

    #[test]
    fn test_copy_from_keeps_allocation() {
        let src = ColorImage::from_bgr(Size::new(2, 1), vec![1, 2, 3, 4, 5, 6]).unwrap();
        let mut dst = ColorImage::new(Size::new(2, 1));
        let ptr = dst.data().as_ptr();
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.data().as_ptr(), ptr);
        assert_eq!(dst.pixel(1, 0), Some([4, 5, 6]));
    }

    #[test]
    fn test_copy_from_size_mismatch() {
        let src = FloatImage::new(Size::new(4, 4));
        let mut dst = FloatImage::new(Size::new(2, 2));
        let err = dst.copy_from(&src).unwrap_err();
        assert!(matches!(err, crate::Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_rect_clamp() {
        let r = Rect::new(-5, 10, 100, 100).clamp_to(Size::new(40, 30));
        assert_eq!(r, Rect::new(0, 10, 40, 20));
        assert!(Rect::new(50, 50, 10, 10).clamp_to(Size::new(40, 30)).is_empty());
    }

    #[test]
    fn test_rect_clamp_extreme_extents() {
        let r = Rect::new(10, 5, i32::MAX, i32::MAX).clamp_to(Size::new(40, 30));
        assert_eq!(r, Rect::new(10, 5, 30, 25));
        let r = Rect::new(i32::MIN, i32::MIN, -1, -1).clamp_to(Size::new(40, 30));
        assert!(r.is_empty());
    }
}
