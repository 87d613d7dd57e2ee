/// Slide enumeration used to bound the presentation state.
pub mod slides;

pub use slides::{count_slides, initial_state, AssetError};
