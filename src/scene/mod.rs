//! Scene graph: flow objects, their interconnections, and position
//! resolution.

mod manager;
mod object;
mod pump;
mod tube;
mod tube_analytical;
mod ypiece;

pub use manager::SceneManager;
pub use object::{
    FlowObject, ObjectId, ObjectInitContext, OutOfFieldPolicy, OutletRateChange,
};
pub use pump::{Pump, PumpConfig};
pub use tube::{Tube, TubeConfig};
pub use tube_analytical::{mlpmin_to_m3ps, AnalyticalTube, AnalyticalTubeConfig};
pub use ypiece::{YPiece, YPieceConfig};
