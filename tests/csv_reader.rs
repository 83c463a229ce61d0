#![cfg(feature = "io-csv")]

use anyhow::Result;
use mldp::prelude::*;
use mldp::testing::*;
use mldp::{DATA_PATH, ExpandPaths, ShufflePaths};
use std::time::Duration;

fn people_dir(copies: usize) -> Result<TempDirPath> {
    let dir = TempDirPath::new()?;
    for i in 0..copies {
        mock_csv_file(dir.path(), &format!("people_{i}.csv"), PEOPLE_CSV)?;
    }
    mock_csv_file(dir.path(), "README.txt", "not data")?;
    Ok(dir)
}

fn read_all(reader: &CsvReader, source: &SourceConfig) -> Result<Vec<Chunk>> {
    reader.read(source)?.collect()
}

#[test]
fn reads_a_directory_in_chunks_with_inferred_kinds() -> Result<()> {
    let dir = people_dir(1)?;
    let reader = CsvReader::default().with_chunk_size(2)?;
    let chunks = read_all(&reader, &SourceConfig::new().with(DATA_PATH, dir.to_param()))?;

    assert_chunk_sizes(&chunks, &[2, 2]);
    let first = &chunks[0];
    assert_eq!(first.get("id"), Some(&Column::Int(vec![1, 2])));
    assert_eq!(first.get("first_name"), Some(&Column::from(vec!["Anna", "Ben"])));
    assert_eq!(first.get("score"), Some(&Column::Float(vec![0.5, 1.25])));

    let Some(Column::Float(last_scores)) = chunks[1].get("score") else {
        panic!("empty cells next to numbers make a float column");
    };
    assert_eq!(last_scores[0], 2.0);
    assert!(last_scores[1].is_nan());
    Ok(())
}

#[test]
fn accepts_globs_and_lists() -> Result<()> {
    let dir = people_dir(3)?;
    let reader = CsvReader::default();

    let glob = format!("{}/people_[01].csv", dir.to_param());
    let chunks = read_all(&reader, &SourceConfig::new().with(DATA_PATH, glob))?;
    assert_chunk_sizes(&chunks, &[4, 4]);

    let list = vec![
        dir.join("people_2.csv").to_string_lossy().into_owned(),
        dir.join("people_0.csv").to_string_lossy().into_owned(),
    ];
    let chunks = read_all(&reader, &SourceConfig::new().with(DATA_PATH, list))?;
    assert_eq!(chunks.len(), 2);
    Ok(())
}

#[test]
fn missing_files_are_an_error() -> Result<()> {
    let dir = TempDirPath::new()?;
    mock_csv_file(dir.path(), "notes.txt", "a,b\n1,2\n")?;
    let reader = CsvReader::default();

    let err = reader
        .read(&SourceConfig::new().with(DATA_PATH, dir.to_param()))
        .err()
        .expect("no csv files");
    assert!(err.to_string().contains("no valid files"));

    assert!(reader.read(&SourceConfig::new()).is_err());
    assert!(
        reader
            .read(&SourceConfig::new().with(DATA_PATH, dir.join("nope.csv").to_string_lossy().into_owned()))
            .is_err()
    );
    Ok(())
}

#[test]
fn concurrent_reading_yields_every_row() -> Result<()> {
    let dir = people_dir(6)?;
    let reader = CsvReader::default()
        .with_chunk_size(2)?
        .with_worker_threads(3)?
        .with_buffer_size(2)?
        .with_read_timeout(Some(Duration::from_secs(10)));
    let source = SourceConfig::new().with(DATA_PATH, dir.to_param());

    let concurrent = read_all(&reader, &source)?;
    let sequential = read_all(&CsvReader::default().with_chunk_size(2)?, &source)?;
    assert_eq!(concurrent.len(), 12);
    assert_eq!(
        concurrent.iter().map(Chunk::len).sum::<usize>(),
        sequential.iter().map(Chunk::len).sum::<usize>()
    );
    let ids = |chunks: &[Chunk]| {
        let mut ids: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.get("id").map(|col| col.values().map(|v| v.to_string()).collect::<Vec<_>>()))
            .flatten()
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&concurrent), ids(&sequential));
    Ok(())
}

#[test]
fn broken_rows_surface_as_errors() -> Result<()> {
    let dir = TempDirPath::new()?;
    mock_csv_file(dir.path(), "bad.csv", "a,b\n1,2\n3\n")?;
    let results: Vec<_> = CsvReader::default()
        .read(&SourceConfig::new().with(DATA_PATH, dir.to_param()))?
        .collect();
    assert!(results.iter().any(Result::is_err));
    Ok(())
}

#[test]
fn headerless_files_use_positional_names() -> Result<()> {
    let dir = TempDirPath::new()?;
    mock_csv_file(dir.path(), "raw.tsv", "x\t1\ny\t2\n")?;
    let reader = CsvReader::default()
        .with_headers(false)
        .with_delimiter(b'\t')
        .with_extension(".tsv");
    let chunks = read_all(&reader, &SourceConfig::new().with(DATA_PATH, dir.to_param()))?;
    assert_eq!(chunks[0].get("0"), Some(&Column::from(vec!["x", "y"])));
    assert_eq!(chunks[0].get("1"), Some(&Column::Int(vec![1, 2])));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn reads_compressed_dumps() -> Result<()> {
    let dir = TempDirPath::new()?;
    let chunk = ChunkBuilder::new()
        .int("id", [1, 2, 3])
        .str("name", ["a", "b", "c"])
        .build()?;
    chunk.write_to_path(dir.join("part.csv.gz"), &mldp::DumpOptions::new().with_delimiter(b','))?;

    let chunks = read_all(&CsvReader::default(), &SourceConfig::new().with(DATA_PATH, dir.to_param()))?;
    assert_chunks_equal(&chunks, &[chunk]);
    Ok(())
}

#[test]
fn pipeline_over_csv_with_path_preprocessing() -> Result<()> {
    let dir = people_dir(4)?;
    for preprocessed in [true, false] {
        let reader = CsvReader::default().with_chunk_size(3)?;
        let mut pipeline = Pipeline::new(reader, PipelineConfig::default().with_workers(3))?;
        if preprocessed {
            pipeline = pipeline.with_preprocessor(ShufflePaths::seeded(11).with_extension(".csv"));
        } else {
            pipeline = pipeline.with_preprocessor(ExpandPaths::new());
        }
        pipeline
            .add_step(FieldsSelector::new(["first_name", "age"]))?
            .add_step(ChunkSizeAdjuster::new(5)?)?;

        let out = collect_chunks(&pipeline, SourceConfig::new().with(DATA_PATH, dir.to_param()))?;
        assert_eq!(out.iter().map(Chunk::len).sum::<usize>(), 16);
        assert!(out.iter().all(|c| c.num_fields() == 2));
    }
    Ok(())
}
