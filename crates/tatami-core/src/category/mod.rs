//! Competition categories and the lookup from participants to category ids.

mod index;
mod model;
mod resolve;

pub use index::{CategoryIndex, CategoryRow, IndexError};
pub use model::{ADULT_AGE, AGE_BINS, CategoryBin, Discipline, Sex};
pub use resolve::{ResolveError, resolve};
