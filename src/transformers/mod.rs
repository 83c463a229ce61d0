//! Built-in transform steps.
//!
//! | Step | Effect |
//! |---|---|
//! | [`FieldsSelector`] | keep only the named fields |
//! | [`FunctionApplier`] | replace fields by a function of their column |
//! | [`Shuffler`] | permute the units of each chunk |
//! | [`Padder`] | pad list fields to a common length and add mask fields |
//! | [`VocabMapper`] | map string tokens to vocabulary ids |

mod fields_selector;
mod function_applier;
mod padder;
mod shuffler;
mod vocab_mapper;

pub use fields_selector::FieldsSelector;
pub use function_applier::{ColumnFn, FunctionApplier};
pub use padder::{Padder, PaddingMode, pad_sequences};
pub use shuffler::Shuffler;
pub use vocab_mapper::VocabMapper;

/// The name of a field derived from `field`, e.g. `tokens_mask`.
#[must_use]
pub fn derived_field_name(field: &str, suffix: &str) -> String {
    format!("{field}_{suffix}")
}
