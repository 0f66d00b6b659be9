//! Core data models for league statistics.

mod bundle;
mod documents;
mod ids;
mod row;
mod side;
mod summary;

pub use bundle::*;
pub use documents::*;
pub use ids::*;
pub use row::*;
pub use side::*;
pub use summary::*;
