//! Domain models for the clinic inventory engine.

mod item;
mod registry;
mod transaction;
mod visit;

pub use item::*;
pub use registry::*;
pub use transaction::*;
pub use visit::*;
