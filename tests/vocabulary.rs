use anyhow::{Result, anyhow};
use mldp::prelude::*;
use mldp::testing::*;
use mldp::{PAD_TOKEN, Symbol, UNK_TOKEN};

fn sentences() -> impl Iterator<Item = Result<Chunk>> {
    std::iter::once(Ok(sentences_chunk()))
}

#[test]
fn frequent_tokens_get_the_smallest_ids() -> Result<()> {
    let mut vocab = Vocabulary::new();
    vocab.create(sentences(), &["tokens"])?;

    assert_eq!(vocab.id_of("dog")?, 0);
    assert_eq!(vocab.id_of("the")?, 1);
    assert_eq!(vocab.get("dog")?.count, 2);
    assert_eq!(vocab.len(), 10);
    assert_eq!(vocab.total_count(), 12);

    let unk = vocab.get("zebra")?;
    assert_eq!(unk.token, UNK_TOKEN);
    assert_eq!(vocab.by_id(unk.id).map(|s| s.token.as_str()), Some(UNK_TOKEN));
    assert_eq!(vocab.special_symbols(), [PAD_TOKEN, UNK_TOKEN]);
    Ok(())
}

#[test]
fn min_count_and_several_fields() -> Result<()> {
    let mut vocab = Vocabulary::new().with_min_count(2);
    vocab.create(sentences(), &["tokens", "label"])?;
    let tokens: Vec<&str> = vocab.iter().map(|s| s.token.as_str()).collect();
    assert_eq!(tokens, ["dog", "pos", "the", PAD_TOKEN, UNK_TOKEN]);
    Ok(())
}

#[test]
fn no_unk_means_unknown_tokens_fail() -> Result<()> {
    let mut vocab = Vocabulary::new().with_default_special_symbols(false);
    vocab.create(sentences(), &["label"])?;
    assert_eq!(vocab.len(), 2);
    assert!(vocab.get("meh").is_err());
    assert!(!vocab.contains(PAD_TOKEN));
    Ok(())
}

#[test]
fn bad_inputs_are_rejected() {
    let mut vocab = Vocabulary::new();
    assert!(vocab.create(sentences(), &["nope"]).is_err());
    assert!(vocab.create(sentences(), &[] as &[&str]).is_err());

    let flags = ChunkBuilder::new().bool("flag", [true, false]).build().map_err(anyhow::Error::from);
    assert!(Vocabulary::new().create([flags], &["flag"]).is_err());
    assert!(
        Vocabulary::new()
            .create([Err(anyhow!("reader broke"))], &["tokens"])
            .is_err()
    );
}

#[test]
fn write_then_load_gives_the_same_symbols() -> Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.join("nested/vocab.tsv");

    let mut created = Vocabulary::new().with_sep("\t");
    created.create(sentences(), &["tokens"])?;
    created.write(&path)?;

    let text = std::fs::read_to_string(&path)?;
    assert!(text.starts_with("dog\t2\nthe\t2\n"));
    assert!(!text.contains(UNK_TOKEN));

    let mut loaded = Vocabulary::new().with_sep("\t");
    loaded.load(&path)?;
    let a: Vec<&Symbol> = created.iter().collect();
    let b: Vec<&Symbol> = loaded.iter().collect();
    assert_eq!(a, b);

    let mut capped = Vocabulary::new().with_sep("\t").with_max_size(3);
    capped.load(&path)?;
    assert_eq!(capped.len(), 5);

    assert!(Vocabulary::new().load(&path).is_err(), "wrong separator");
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn vocabulary_files_may_be_compressed() -> Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.join("vocab.txt.gz");
    let mut created = Vocabulary::new();
    created.create(sentences(), &["tokens"])?;
    created.write(&path)?;

    let mut loaded = Vocabulary::new();
    loaded.load(&path)?;
    assert_eq!(loaded.len(), created.len());
    assert_eq!(loaded.id_of("away")?, created.id_of("away")?);
    Ok(())
}

#[test]
fn load_or_create_reads_the_source_once() -> Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.join("vocab.txt");

    let mut first = Vocabulary::new();
    first.load_or_create(&path, sentences(), &["tokens"])?;
    assert!(path.is_file());

    let mut second = Vocabulary::new();
    second.load_or_create(&path, [Err(anyhow!("source must not be read"))], &["tokens"])?;
    assert_eq!(second.len(), first.len());
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn created_from_a_csv_pipeline() -> Result<()> {
    use mldp::DATA_PATH;

    let dir = TempDirPath::new()?;
    mock_csv_file(dir.path(), "people.csv", mldp::testing::PEOPLE_CSV)?;
    let pipeline = Pipeline::new(
        CsvReader::default().with_chunk_size(3)?,
        PipelineConfig::default().with_workers(2),
    )?;

    let mut vocab = Vocabulary::new();
    vocab.create(
        pipeline.iter(SourceConfig::new().with(DATA_PATH, dir.to_param()))?.chunks(),
        &["first_name", "age"],
    )?;
    assert_eq!(vocab.id_of("Anna")?, 0);
    assert!(vocab.contains("47"));
    assert_eq!(vocab.len(), 3 + 4 + 2);
    Ok(())
}
