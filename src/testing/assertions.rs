//! Assertion functions for chunk streams.
//!
//! Pipelines with several processing workers give no ordering guarantee, so
//! besides the exact comparison there is [`assert_same_units`], which
//! compares the data units of two streams as multisets.

use crate::chunk::Chunk;

/// Assert that two chunk sequences are equal chunk by chunk.
///
/// Field order inside a chunk is ignored, chunk order is not.
///
/// # Panics
///
/// Panics if the sequences differ in length or in any chunk.
pub fn assert_chunks_equal(actual: &[Chunk], expected: &[Chunk]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Chunk count mismatch:\n  Expected: {}\n  Actual: {}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a, e, "Chunk mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}");
    }
}

/// Assert the size of every chunk, in order.
///
/// # Panics
///
/// Panics if the sizes differ.
///
/// # Example
///
/// ```
/// use mldp::testing::{assert_chunk_sizes, generate_chunk};
///
/// assert_chunk_sizes(&[generate_chunk(0, 3), generate_chunk(3, 1)], &[3, 1]);
/// ```
pub fn assert_chunk_sizes(chunks: &[Chunk], expected: &[usize]) {
    let actual: Vec<usize> = chunks.iter().map(Chunk::len).collect();
    assert_eq!(actual, expected, "Chunk sizes mismatch");
}

/// Every unit of `chunks` rendered with its fields sorted by name, the whole
/// list sorted.
#[must_use]
pub fn sorted_units(chunks: &[Chunk]) -> Vec<String> {
    let mut units: Vec<String> = chunks
        .iter()
        .flat_map(Chunk::units)
        .map(|mut unit| {
            unit.sort_by(|a, b| a.0.cmp(b.0));
            format!("{unit:?}")
        })
        .collect();
    units.sort();
    units
}

/// Assert that two chunk sequences hold the same data units regardless of
/// chunk boundaries and order.
///
/// # Panics
///
/// Panics if a unit is missing or extra on either side.
pub fn assert_same_units(actual: &[Chunk], expected: &[Chunk]) {
    let actual_units = sorted_units(actual);
    let expected_units = sorted_units(expected);
    if actual_units != expected_units {
        let missing: Vec<_> = expected_units
            .iter()
            .filter(|u| !actual_units.contains(u))
            .collect();
        let extra: Vec<_> = actual_units
            .iter()
            .filter(|u| !expected_units.contains(u))
            .collect();
        panic!(
            "Unit multiset mismatch ({} expected, {} actual):\n  Missing: {missing:?}\n  Extra: {extra:?}",
            expected_units.len(),
            actual_units.len()
        );
    }
}
