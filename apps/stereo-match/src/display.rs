use anyhow::Result;
use opencv::prelude::*;
use opencv::{core, highgui};
use rgbd_camera::{cv, ColorImage, Rect, Size};

const KEY_ESC: i32 = 0x1b;
const WAIT_MS: i32 = 10;

/// Preview windows for the rectified pair and the 8-bit disparity.
pub struct Preview {
    left_roi: Option<core::Rect>,
    right_roi: Option<core::Rect>,
}

impl Preview {
    /// `v1`/`v2` crop the rectified frames to their valid regions when non-empty.
    pub fn new(size: Size, v1: Option<Rect>, v2: Option<Rect>) -> Result<Self> {
        for name in ["left", "right", "disparity"] {
            highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        }
        let roi = |r: Option<Rect>| {
            r.map(|r| r.clamp_to(size))
                .filter(|r| !r.is_empty())
                .map(|r| core::Rect::new(r.x, r.y, r.width, r.height))
        };
        Ok(Self {
            left_roi: roi(v1),
            right_roi: roi(v2),
        })
    }

    pub fn show(
        &self,
        left: &ColorImage,
        right: &ColorImage,
        disparity: &[u8],
        size: Size,
    ) -> Result<()> {
        show_cropped("left", left, self.left_roi)?;
        show_cropped("right", right, self.right_roi)?;
        highgui::imshow("disparity", &cv::gray_to_mat(size, disparity)?)?;
        Ok(())
    }

    /// Pump the event loop; true once Escape was pressed.
    pub fn escape_pressed(&self) -> Result<bool> {
        Ok(highgui::wait_key(WAIT_MS)? == KEY_ESC)
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        let _ = highgui::destroy_all_windows();
    }
}

fn show_cropped(window: &str, image: &ColorImage, roi: Option<core::Rect>) -> Result<()> {
    let mat = cv::color_to_mat(image)?;
    match roi {
        Some(r) => {
            let cropped = core::Mat::roi(&mat, r)?.try_clone()?;
            highgui::imshow(window, &cropped)?;
        }
        None => highgui::imshow(window, &mat)?,
    }
    Ok(())
}
