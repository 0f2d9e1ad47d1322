//! Flow-field loading, caching, spatial lookup, and interpolation.
//!
//! The data flow mirrors how the fields are produced: a CFD solver exports
//! one case directory per geometry parameterization ([`parser`]), the
//! [`FieldStore`] turns case directories into shared immutable
//! [`VectorField`]s (with a binary cache to skip reparsing), and each scene
//! object wraps its field in a [`VectorFieldManager`] that answers
//! interpolated flow queries in global coordinates.

mod index;
mod interpolation;
mod key;
mod manager;
mod parser;
mod store;
mod vector_field;

pub use index::SpatialIndex;
pub use interpolation::{interpolate, FlowQuery, Interpolation};
pub use key::FieldKey;
pub use manager::VectorFieldManager;
pub use parser::{find_latest_time_dir, parse_case};
pub use store::FieldStore;
pub use vector_field::{Face, VectorField};
