//! Pyramid orchestration of the slabtiles engine: levels binding a tile
//! matrix to slab storage, window fetches through the operator graph, and
//! the pyramid itself.

mod error;
mod level;
mod limits;
mod pyramid;

pub use error::FetchError;
pub use level::{Level, LevelConfig};
pub use limits::RequestLimits;
pub use pyramid::Pyramid;
