//! Redraw target for the telemetry chart
//!
//! The host UI owns the actual canvas; the recorder only needs a surface it
//! can clear and draw polylines onto.

/// A renderable surface supplied by the host
pub trait PlotSurface {
    /// Erase the previous frame
    fn clear(&mut self);

    /// Pin the vertical axis to a fixed range
    fn set_y_bounds(&mut self, min: f64, max: f64);

    /// Draw one polyline of (timestamp, rate) points
    fn polyline(&mut self, points: &[(f64, f64)]);

    /// Flush the frame to the screen
    fn present(&mut self);
}
