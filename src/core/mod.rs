//! Core types shared by every layer: constants, the error taxonomy and
//! collaborator traits.

mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::*;
