//! Ready-made test data.

use crate::chunk::Chunk;
use crate::value::{Column, Value};

/// A small people table as CSV text: `id`, `first_name`, `age`, `score`.
/// The last row has an empty score.
pub const PEOPLE_CSV: &str = "\
id,first_name,age,score
1,Anna,31,0.5
2,Ben,25,1.25
3,Anna,47,2
4,Carl,19,
";

/// The rows of [`PEOPLE_CSV`] as a chunk, typed the way the CSV reader
/// infers them.
#[must_use]
pub fn people_chunk() -> Chunk {
    let mut chunk = Chunk::new();
    chunk.insert("id", Column::Int(vec![1, 2, 3, 4]));
    chunk.insert("first_name", Column::from(vec!["Anna", "Ben", "Anna", "Carl"]));
    chunk.insert("age", Column::Int(vec![31, 25, 47, 19]));
    chunk.insert("score", Column::Float(vec![0.5, 1.25, 2.0, f64::NAN]));
    chunk
}

/// Tokenized sentences of uneven length with a label per sentence.
#[must_use]
pub fn sentences_chunk() -> Chunk {
    let sentences = [
        vec!["the", "cat", "sat"],
        vec!["a", "dog"],
        vec!["the", "dog", "ran", "far", "away"],
    ];
    let mut chunk = Chunk::new();
    chunk.insert(
        "tokens",
        Column::List(
            sentences
                .iter()
                .map(|s| s.iter().copied().map(Value::from).collect())
                .collect(),
        ),
    );
    chunk.insert("label", Column::from(vec!["pos", "neg", "pos"]));
    chunk
}
