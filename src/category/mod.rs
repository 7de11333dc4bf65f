//! Category labels and prefix matching
//!
//! Entries that start with a known label are rendered as `=label=` or
//! `=label= (remainder)`; that wrapper is what later lets the aggregator
//! recognise two lines as belonging to the same category.

mod defaults;
mod matcher;

pub use defaults::default_labels;
pub(crate) use matcher::lowercase_initial;
pub use matcher::{label_of, same_label, CategoryMatcher, Classification};
