pub mod position;

pub use position::{Aabb, Position};
