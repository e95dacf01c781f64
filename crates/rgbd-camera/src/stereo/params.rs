use std::fmt;
use std::str::FromStr;

/// Stereo correspondence algorithm.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Algorithm {
    /// Block matching.
    Bm,
    /// Semi-global block matching.
    #[default]
    Sgbm,
    /// Semi-global matching with the full-scale two-pass dynamic programming.
    Hh,
    /// Variational optical-flow-style matching: coarse-to-fine DIS flow
    /// refined by OpenCV's variational solver. Only the horizontal component
    /// of the flow is kept.
    Var,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [Algorithm::Bm, Algorithm::Sgbm, Algorithm::Hh, Algorithm::Var];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Bm => "bm",
            Algorithm::Sgbm => "sgbm",
            Algorithm::Hh => "hh",
            Algorithm::Var => "var",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownAlgorithm(pub String);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown stereo algorithm '{}' (expected bm, sgbm, hh or var)", self.0)
    }
}

impl std::error::Error for UnknownAlgorithm {}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Largest matching block the OpenCV matchers accept.
pub const MAX_BLOCK_SIZE: u32 = 255;

/// Largest disparity search range accepted; keeps the derived penalties and
/// ranges inside `i32`.
pub const MAX_NUM_DISPARITIES: u32 = 16 * 1024;

/// Disparity search range used when none is requested: an eighth of the
/// image width rounded up to a multiple of 16.
pub fn default_num_disparities(image_width: u32) -> u32 {
    (((image_width / 8) + 15) & !15).max(16)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMatchParams {
    pub pre_filter_cap: i32,
    pub block_size: i32,
    pub min_disparity: i32,
    pub num_disparities: i32,
    pub texture_threshold: i32,
    pub uniqueness_ratio: i32,
    pub speckle_window_size: i32,
    pub speckle_range: i32,
    pub disp12_max_diff: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SgbmParams {
    pub pre_filter_cap: i32,
    pub block_size: i32,
    pub p1: i32,
    pub p2: i32,
    pub min_disparity: i32,
    pub num_disparities: i32,
    pub uniqueness_ratio: i32,
    pub speckle_window_size: i32,
    pub speckle_range: i32,
    pub disp12_max_diff: i32,
    pub full_dp: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VarParams {
    pub iterations: i32,
    pub smoothness: f32,
    /// Disparity range in the left-to-right flow convention (negative values).
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub median_filter: bool,
}

/// Fully resolved configuration for one of the matchers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatcherParams {
    Bm(BlockMatchParams),
    Sgbm(SgbmParams),
    Var(VarParams),
}

impl MatcherParams {
    /// Resolve matcher settings from the user-facing knobs.
    ///
    /// `num_disparities` and `block_size` fall back to per-algorithm defaults
    /// when `None`. `channels` is the channel count of the matched images and
    /// scales the SGBM smoothness penalties. Requests beyond
    /// [`MAX_NUM_DISPARITIES`] and [`MAX_BLOCK_SIZE`] are clamped.
    pub fn derive(
        algorithm: Algorithm,
        num_disparities: Option<u32>,
        block_size: Option<u32>,
        image_width: u32,
        channels: u32,
    ) -> Self {
        let n = num_disparities
            .unwrap_or_else(|| default_num_disparities(image_width))
            .min(MAX_NUM_DISPARITIES) as i32;
        let block_size = block_size.map(|b| b.min(MAX_BLOCK_SIZE));
        let speckle_window_size = 100;
        let speckle_range = 32;
        match algorithm {
            Algorithm::Bm => MatcherParams::Bm(BlockMatchParams {
                pre_filter_cap: 31,
                block_size: block_size.unwrap_or(9) as i32,
                min_disparity: 0,
                num_disparities: n,
                texture_threshold: 10,
                uniqueness_ratio: 15,
                speckle_window_size,
                speckle_range,
                disp12_max_diff: 1,
            }),
            Algorithm::Sgbm | Algorithm::Hh => {
                let b = block_size.unwrap_or(3) as i32;
                let cn = channels.clamp(1, 4) as i32;
                MatcherParams::Sgbm(SgbmParams {
                    pre_filter_cap: 63,
                    block_size: b,
                    p1: 8 * cn * b * b,
                    p2: 32 * cn * b * b,
                    min_disparity: 0,
                    num_disparities: n,
                    uniqueness_ratio: 10,
                    speckle_window_size,
                    speckle_range,
                    disp12_max_diff: 1,
                    full_dp: algorithm == Algorithm::Hh,
                })
            }
            Algorithm::Var => MatcherParams::Var(VarParams {
                iterations: 25,
                smoothness: 15.0,
                min_disparity: -n,
                max_disparity: 0,
                median_filter: true,
            }),
        }
    }

    pub fn num_disparities(&self) -> u32 {
        match self {
            MatcherParams::Bm(p) => p.num_disparities as u32,
            MatcherParams::Sgbm(p) => p.num_disparities as u32,
            MatcherParams::Var(p) => (p.max_disparity - p.min_disparity) as u32,
        }
    }

    /// Factor mapping a disparity in pixels to an 8-bit preview value.
    ///
    /// Block matchers span `0..n` and are stretched over the full range; the
    /// variational result is shown as-is.
    pub fn preview_scale(&self) -> f32 {
        match self {
            MatcherParams::Var(_) => 1.0,
            _ => 255.0 / self.num_disparities().max(1) as f32,
        }
    }
}
