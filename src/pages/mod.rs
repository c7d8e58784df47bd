//! Text renderings of the store pages.

pub mod details;
pub mod grid;
