//! Domain models for the clinic queue.

mod stats;
mod token;
mod user;

pub use stats::*;
pub use token::*;
pub use user::*;
