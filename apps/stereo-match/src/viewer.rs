use anyhow::Result;
use opencv::prelude::*;
use opencv::{core, viz};
use rgbd_camera::PointXYZRGB;

/// 3D window showing the latest filtered point cloud.
pub struct CloudViewer {
    window: viz::Viz3d,
}

impl CloudViewer {
    pub fn new() -> Result<Self> {
        let mut window = viz::Viz3d::new("Vertex")?;
        window.show_widget_def("axes", &viz::WCoordinateSystem::new_def()?)?;
        Ok(Self { window })
    }

    pub fn update(&mut self, points: &[PointXYZRGB]) -> Result<()> {
        if points.is_empty() {
            self.window.remove_widget("cloud").ok();
        } else {
            let xyz: Vec<core::Vec3f> = points
                .iter()
                .map(|p| core::Vec3f::from([p.x, p.y, p.z]))
                .collect();
            let bgr: Vec<core::Vec3b> = points
                .iter()
                .map(|p| core::Vec3b::from([p.b, p.g, p.r]))
                .collect();
            let cloud = core::Mat::from_slice(&xyz)?.try_clone()?;
            let colors = core::Mat::from_slice(&bgr)?.try_clone()?;
            let widget = viz::WCloud::new(&cloud, &colors)?;
            self.window.show_widget_def("cloud", &widget)?;
        }
        self.window.spin_once(1, true)?;
        Ok(())
    }

    /// True once the user closed the window.
    pub fn was_stopped(&self) -> Result<bool> {
        Ok(self.window.was_stopped()?)
    }
}
