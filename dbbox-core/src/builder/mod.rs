//! Statement builders
//!
//! Table and column names are interpolated into SQL, so every builder checks
//! them against the same letters/digits/underscore rule as table names.
//! Values always travel as bound parameters.

mod ddl;
mod select;
mod update;

pub use ddl::TableBuilder;
pub use select::SelectBuilder;
pub use update::UpdateBuilder;
