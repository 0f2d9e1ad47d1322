//! Result writers: sensor time series and particle traces.

mod sensor_log;
mod trace;

pub use sensor_log::SensorLog;
pub use trace::{TraceConfig, TraceWriter};
