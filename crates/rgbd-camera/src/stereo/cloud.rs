use crate::{FloatImage, PointXYZ};

/// Depth assigned to pixels without a valid disparity.
pub const MISSING_Z: f32 = 10_000.0;

/// Reproject a disparity map (in pixels) to 3D with the 4x4 matrix `q`.
///
/// Returns one point per pixel in row-major order. Pixels with a
/// non-positive or non-finite disparity get `z = MISSING_Z`.
pub fn reproject(disparity: &FloatImage, q: &[[f64; 4]; 4]) -> Vec<PointXYZ> {
    let size = disparity.size();
    let mut out = Vec::with_capacity(size.area());
    for (i, &d) in disparity.data().iter().enumerate() {
        let x = (i % size.width as usize) as f64;
        let y = (i / size.width as usize) as f64;
        out.push(reproject_pixel(x, y, d, q));
    }
    out
}

fn reproject_pixel(x: f64, y: f64, d: f32, q: &[[f64; 4]; 4]) -> PointXYZ {
    let missing = PointXYZ::new(0.0, 0.0, MISSING_Z);
    if !(d.is_finite() && d > 0.0) {
        return missing;
    }
    let v = [x, y, d as f64, 1.0];
    let row = |r: usize| q[r].iter().zip(v).map(|(a, b)| a * b).sum::<f64>();
    let w = row(3);
    if w == 0.0 {
        return missing;
    }
    PointXYZ::new((row(0) / w) as f32, (row(1) / w) as f32, (row(2) / w) as f32)
}

/// Keeps reprojected points that are finite, not marked missing and within
/// `max_depth`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointFilter {
    pub max_depth: f32,
}

impl Default for PointFilter {
    fn default() -> Self {
        Self { max_depth: 1.0 }
    }
}

impl PointFilter {
    pub fn new(max_depth: f32) -> Self {
        Self { max_depth }
    }

    pub fn keep(&self, p: &PointXYZ) -> bool {
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return false;
        }
        if (p.z - MISSING_Z).abs() < f32::EPSILON || p.z.abs() >= MISSING_Z {
            return false;
        }
        p.z <= self.max_depth
    }

    /// Surviving points with their pixel index.
    pub fn apply<'a>(
        &'a self,
        grid: &'a [PointXYZ],
    ) -> impl Iterator<Item = (usize, PointXYZ)> + 'a {
        grid.iter()
            .enumerate()
            .filter(|(_, p)| self.keep(p))
            .map(|(i, p)| (i, *p))
    }
}

/// Map pixel disparities to 8-bit preview values, saturating.
pub fn disparity_to_u8(disparity: &FloatImage, scale: f32) -> Vec<u8> {
    disparity
        .data()
        .iter()
        .map(|&d| {
            let v = (d * scale).round();
            if v.is_nan() {
                0
            } else {
                v.clamp(0.0, 255.0) as u8
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size;

    // f = 500, cx = 2, cy = 1, baseline 0.1
    const Q: [[f64; 4]; 4] = [
        [1.0, 0.0, 0.0, -2.0],
        [0.0, 1.0, 0.0, -1.0],
        [0.0, 0.0, 0.0, 500.0],
        [0.0, 0.0, 10.0, 0.0],
    ];

    #[test]
    fn test_reproject_depth_inverse_to_disparity() {
        let disp = FloatImage::from_vec(Size::new(4, 2), vec![50.0; 8]).unwrap();
        let pts = reproject(&disp, &Q);
        assert_eq!(pts.len(), 8);
        for p in &pts {
            assert!((p.z - 1.0).abs() < 1e-6);
        }
        // pixel (3, 1): X = (3 - 2) / (10 * 50)
        assert!((pts[7].x - 1.0 / 500.0).abs() < 1e-6);
        assert!(pts[7].y.abs() < 1e-6);

        let far = FloatImage::from_vec(Size::new(1, 1), vec![25.0]).unwrap();
        assert!((reproject(&far, &Q)[0].z - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_disparity_marked_missing() {
        let disp = FloatImage::from_vec(Size::new(3, 1), vec![0.0, -1.0, f32::NAN]).unwrap();
        let pts = reproject(&disp, &Q);
        assert!(pts.iter().all(|p| p.z == MISSING_Z));
        let filter = PointFilter::new(1.0e6);
        assert_eq!(filter.apply(&pts).count(), 0);
    }

    #[test]
    fn test_filter_rules() {
        let f = PointFilter::default();
        assert!(f.keep(&PointXYZ::new(0.1, 0.2, 0.5)));
        assert!(f.keep(&PointXYZ::new(0.0, 0.0, 1.0)));
        assert!(!f.keep(&PointXYZ::new(0.0, 0.0, 1.01)));
        assert!(!f.keep(&PointXYZ::new(0.0, 0.0, -MISSING_Z)));
        assert!(!f.keep(&PointXYZ::new(f32::INFINITY, 0.0, 0.5)));

        let wide = PointFilter::new(f32::MAX);
        assert!(!wide.keep(&PointXYZ::new(0.0, 0.0, MISSING_Z)));
        assert!(wide.keep(&PointXYZ::new(0.0, 0.0, 9_999.0)));
    }

    #[test]
    fn test_apply_keeps_pixel_indices() {
        let grid = vec![
            PointXYZ::new(0.0, 0.0, 5.0),
            PointXYZ::new(0.0, 0.0, 0.5),
            PointXYZ::new(0.0, 0.0, MISSING_Z),
            PointXYZ::new(0.0, 0.0, 0.25),
        ];
        let kept: Vec<usize> = PointFilter::default().apply(&grid).map(|(i, _)| i).collect();
        assert_eq!(kept, vec![1, 3]);
    }

    #[test]
    fn test_disparity_preview_saturates() {
        let disp = FloatImage::from_vec(Size::new(4, 1), vec![-3.0, 0.0, 32.0, 1000.0]).unwrap();
        let px = disparity_to_u8(&disp, 255.0 / 64.0);
        assert_eq!(px, vec![0, 0, 128, 255]);
    }
}
