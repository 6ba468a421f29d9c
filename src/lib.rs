//! Interactive globe and flat-map projection engine for terminal geography
//! quizzes. Regions are projected, filled and outlined on Braille canvases.

pub mod braille;
pub mod config;
pub mod data;
pub mod error;
pub mod geo;
pub mod map;
pub mod timer;

pub use error::{MapError, Result};
