use crate::{ColorImage, Error, FloatImage, PointXYZ, PointXYZRGB, Result, Size};

/// Lifecycle shared by every device.
pub trait Camera: Send {
    /// Short human-readable identifier used in logs.
    fn name(&self) -> &str;

    /// Begin acquisition. Calling it again on a started camera is a no-op.
    fn start(&mut self) -> Result<()>;
}

/// A camera that produces 3-channel 8-bit frames of a fixed size.
pub trait ColorCamera: Camera {
    /// Size of the color image, fixed at construction.
    fn color_size(&self) -> Size;

    /// Copy the latest color frame into `buffer`.
    ///
    /// The buffer must be allocated in advance with [`ColorCamera::color_size`];
    /// it is written in place and never resized.
    fn capture_color(&mut self, buffer: &mut ColorImage) -> Result<()>;
}

/// A camera that produces depth-related data.
///
/// Every capture is optional; devices override what they can deliver and the
/// rest reports [`Error::Unsupported`].
pub trait DepthCamera: Camera {
    /// Size of the depth image.
    fn depth_size(&self) -> Size;

    /// Copy the latest depth data into `buffer`.
    /// Note that the buffer must be allocated in advance.
    fn capture_depth(&mut self, buffer: &mut FloatImage) -> Result<()> {
        let _ = buffer;
        Err(Error::Unsupported("depth capture"))
    }

    /// Copy the latest amplitude data into `buffer`.
    /// Note that the buffer must be allocated in advance.
    fn capture_amplitude(&mut self, buffer: &mut FloatImage) -> Result<()> {
        let _ = buffer;
        Err(Error::Unsupported("amplitude capture"))
    }

    /// Append the latest 3D point cloud to `buffer`.
    fn capture_vertex(&mut self, buffer: &mut Vec<PointXYZ>) -> Result<()> {
        let _ = buffer;
        Err(Error::Unsupported("vertex capture"))
    }

    /// Append the latest colored 3D point cloud to `buffer`.
    fn capture_colored_vertex(&mut self, buffer: &mut Vec<PointXYZRGB>) -> Result<()> {
        let _ = buffer;
        Err(Error::Unsupported("colored vertex capture"))
    }
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }
}

impl<C: ColorCamera + ?Sized> ColorCamera for Box<C> {
    fn color_size(&self) -> Size {
        (**self).color_size()
    }

    fn capture_color(&mut self, buffer: &mut ColorImage) -> Result<()> {
        (**self).capture_color(buffer)
    }
}

/// Reject a caller buffer whose geometry differs from the device's.
pub(crate) fn check_size(expected: Size, actual: Size) -> Result<()> {
    if expected != actual {
        return Err(Error::SizeMismatch { expected, actual });
    }
    Ok(())
}
