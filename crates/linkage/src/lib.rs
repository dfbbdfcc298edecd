//! `reclink-linkage` — probabilistic record linkage between two tables.
//!
//! Pure engine crate: receives pre-loaded record sets, returns scored match
//! pairs. The only parsing it does is the CSV normalizer at the boundary.
//!
//! Pipeline: hybrid projection, blocking, comparison levels, u/prior
//! estimation, EM over m, Fellegi-Sunter scoring.

pub mod blocking;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod em;
pub mod error;
pub mod estimate;
pub mod evidence;
pub mod frame;
pub mod linker;
pub mod model;
pub mod normalize;
pub mod params;
pub mod projector;
pub mod scorer;

pub use config::LinkConfig;
pub use diagnostics::{Diagnostics, LogDiagnostics, MemoryDiagnostics, NullDiagnostics};
pub use error::LinkError;
pub use linker::{run, Linker};
pub use model::{LinkResult, MatchResult, RecordSet, Value};
pub use normalize::load_csv;
