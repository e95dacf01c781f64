//! Stereo matching glue: parameters, the matcher seam, reprojection and the
//! two-camera rig.

mod cloud;
pub use cloud::{disparity_to_u8, reproject, PointFilter, MISSING_Z};

mod params;
pub use params::{
    default_num_disparities, Algorithm, BlockMatchParams, MatcherParams, SgbmParams,
    UnknownAlgorithm, VarParams, MAX_BLOCK_SIZE, MAX_NUM_DISPARITIES,
};

mod rig;
pub use rig::StereoRig;

#[cfg(feature = "opencv")]
mod cv_matcher;
#[cfg(feature = "opencv")]
pub use cv_matcher::OpenCvMatcher;

use crate::{ColorImage, FloatImage, Result};

/// Result of matching one left/right pair.
#[derive(Clone, Debug)]
pub struct StereoOutput {
    /// Left frame after rectification.
    pub left: ColorImage,
    /// Right frame after rectification.
    pub right: ColorImage,
    /// Disparity in pixels, same size as `left`. Non-positive means no match.
    pub disparity: FloatImage,
}

/// Computes disparity for a pair of frames of equal size.
pub trait StereoMatcher: Send {
    fn compute(&mut self, left: &ColorImage, right: &ColorImage) -> Result<StereoOutput>;

    /// Disparity-to-depth matrix, when the pair is calibrated.
    fn reprojection(&self) -> Option<[[f64; 4]; 4]> {
        None
    }
}

impl<M: StereoMatcher + ?Sized> StereoMatcher for Box<M> {
    fn compute(&mut self, left: &ColorImage, right: &ColorImage) -> Result<StereoOutput> {
        (**self).compute(left, right)
    }

    fn reprojection(&self) -> Option<[[f64; 4]; 4]> {
        (**self).reprojection()
    }
}
