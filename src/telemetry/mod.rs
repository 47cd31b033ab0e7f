//! Writing telemetry: sampling, rate derivation, and plotting

pub mod plot;
pub mod recorder;

pub use plot::PlotSurface;
pub use recorder::TelemetryRecorder;
