pub mod api;
pub mod chi;
pub mod constants;
pub mod error;
pub mod io;
pub mod runtime;
pub mod stats;
pub mod writer;

pub use api::{Combiner, IdentityCombiner, Mapper, Reducer};
pub use error::EngineError;
pub use runtime::Pipeline;
