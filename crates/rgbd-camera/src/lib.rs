//! rgbd-camera: color/depth camera capabilities with polling, vendor and stereo backends

mod types;
pub use types::{ColorImage, FloatImage, PointXYZ, PointXYZRGB, Rect, Size};

mod error;
pub use error::{Error, Result};

mod traits;
pub use traits::{Camera, ColorCamera, DepthCamera};

mod with_color;
pub use with_color::WithColor;

mod poll;
pub use poll::{FrameGrabber, PollStats, PollingCamera};

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "mock")]
pub use mock::{ConstantMatcher, MockCamera, MockDepthCamera, MockGrabber};

#[cfg(feature = "opencv")]
pub mod cv;

#[cfg(feature = "opencv")]
mod uvc;
#[cfg(feature = "opencv")]
pub use uvc::{OpenCvGrabber, UvCamera};

#[cfg(feature = "opencv")]
mod ueye;
#[cfg(feature = "opencv")]
pub use ueye::UEye;

pub mod calib;

pub mod io;

pub mod stereo;
