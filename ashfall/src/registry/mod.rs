pub mod character;
pub mod chunk;
pub mod client;

pub use character::CharacterRegistry;
pub use chunk::ChunkRegistry;
pub use client::{ClientInfo, ClientRegistry};
