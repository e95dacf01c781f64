use crate::traits::check_size;
use crate::{
    Camera, ColorCamera, ColorImage, DepthCamera, Error, FloatImage, PointXYZ, PointXYZRGB,
    Result, Size,
};
use tracing::debug;

/// A depth camera paired with an optional color camera.
///
/// Color calls are forwarded to the attached camera; without one the color
/// size is zero and color captures report [`Error::Unsupported`].
pub struct WithColor<D> {
    depth: D,
    color: Option<Box<dyn ColorCamera>>,
}

impl<D: DepthCamera> WithColor<D> {
    pub fn new(depth: D) -> Self {
        Self { depth, color: None }
    }

    pub fn with_color(depth: D, color: Box<dyn ColorCamera>) -> Self {
        Self {
            depth,
            color: Some(color),
        }
    }

    pub fn has_color(&self) -> bool {
        self.color.is_some()
    }

    pub fn depth_camera(&self) -> &D {
        &self.depth
    }

    pub fn depth_camera_mut(&mut self) -> &mut D {
        &mut self.depth
    }

    pub fn into_parts(self) -> (D, Option<Box<dyn ColorCamera>>) {
        (self.depth, self.color)
    }
}

impl<D: DepthCamera> Camera for WithColor<D> {
    fn name(&self) -> &str {
        self.depth.name()
    }

    fn start(&mut self) -> Result<()> {
        self.depth.start()?;
        if let Some(color) = self.color.as_mut() {
            debug!(depth = self.depth.name(), color = color.name(), "starting attached color camera");
            color.start()?;
        }
        Ok(())
    }
}

impl<D: DepthCamera> ColorCamera for WithColor<D> {
    fn color_size(&self) -> Size {
        self.color
            .as_ref()
            .map(|c| c.color_size())
            .unwrap_or_default()
    }

    fn capture_color(&mut self, buffer: &mut ColorImage) -> Result<()> {
        let color = self
            .color
            .as_mut()
            .ok_or(Error::Unsupported("no color camera attached"))?;
        check_size(color.color_size(), buffer.size())?;
        color.capture_color(buffer)
    }
}

impl<D: DepthCamera> DepthCamera for WithColor<D> {
    fn depth_size(&self) -> Size {
        self.depth.depth_size()
    }

    fn capture_depth(&mut self, buffer: &mut FloatImage) -> Result<()> {
        self.depth.capture_depth(buffer)
    }

    fn capture_amplitude(&mut self, buffer: &mut FloatImage) -> Result<()> {
        self.depth.capture_amplitude(buffer)
    }

    fn capture_vertex(&mut self, buffer: &mut Vec<PointXYZ>) -> Result<()> {
        self.depth.capture_vertex(buffer)
    }

    fn capture_colored_vertex(&mut self, buffer: &mut Vec<PointXYZRGB>) -> Result<()> {
        self.depth.capture_colored_vertex(buffer)
    }
}
