//! Sliding-window and curve-fitting primitives.
//!
//! - [`median::running_median`]: the trailing running median used by the
//!   ringdown and bottom dropout stages.
//! - [`triangle`]: the periodic triangle-wave model and the least-squares fit
//!   used by the triwave corrector.

pub mod median;
pub mod triangle;

pub use median::{running_median, MedianError};
pub use triangle::{fit_triangle, general_triangle, FitError};
