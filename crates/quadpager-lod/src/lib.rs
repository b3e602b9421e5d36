//! Level-of-detail selection for the tile pyramid: view state, screen-space importance,
//! and the quad tree walk that turns a view into an ordered target set.

mod frustum;
mod importance;
mod params;
mod target;
mod view;
mod walker;

pub use frustum::{Aabb, Frustum};
pub use importance::ImportanceEvaluator;
pub use params::{ParamError, SamplingParams};
pub use target::{TargetSet, TargetTile};
pub use view::ViewState;
pub use walker::QuadTreeWalker;
