#![forbid(unsafe_code)]

//! Structural edits to a book's table of contents under optimistic
//! concurrency control.

mod audit;
mod conflict;
mod engine;
mod guard;
mod ids;
mod memory;
mod model;
mod ops;
mod planner;
mod result;
mod store;
mod tree;

pub use audit::*;
pub use conflict::*;
pub use engine::*;
pub use guard::*;
pub use ids::*;
pub use memory::*;
pub use model::*;
pub use ops::*;
pub use planner::*;
pub use result::*;
pub use store::*;
pub use tree::*;
