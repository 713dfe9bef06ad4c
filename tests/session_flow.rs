use docsift::{
    ChunkingConfig,
    Error,
    ExportBundle,
    ExportKind,
    HashingEmbedder,
    SearchMode,
    Session,
    SourceDocument,
    embedding::embed_query,
};

fn cat_and_dog() -> Vec<SourceDocument> {
    vec![
        SourceDocument::new("doc1", "the cat sat on the mat"),
        SourceDocument::new("doc2", "the dog sat on the log"),
    ]
}

#[test]
fn keyword_scenario() {
    let mut session = Session::new();
    let stats = session
        .ingest(&cat_and_dog(), &ChunkingConfig::FixedTokens { max_tokens: 10 })
        .unwrap();
    assert_eq!(stats.docs_ingested, 2);
    assert_eq!(stats.chunks_created, 2);

    let hits = session.search("cat", None, SearchMode::Sparse, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.id, "doc1:0-22");
    assert!(hits[0].score > 0.0);
    assert_eq!(session.index().score("cat", "doc2:0-22"), 0.0);

    let shared = session.search("sat", None, SearchMode::Sparse, 10).unwrap();
    assert_eq!(shared.len(), 2);
}

#[test]
fn every_strategy_feeds_the_same_index() {
    let text = "# Intro\n\nSearch engines rank documents. Ranking uses statistics.\n\n\
                # Details\n\nBM25 saturates term frequency. Long chunks are normalized.";
    let configs = [
        ChunkingConfig::FixedTokens { max_tokens: 5 },
        ChunkingConfig::SlidingTokens { max_tokens: 6, overlap_tokens: 2 },
        ChunkingConfig::SentParagraph { target_chars: 60, sentence_overlap: 1 },
        ChunkingConfig::Recursive { target_chars: 60 },
    ];

    for config in configs {
        let mut session = Session::new();
        session
            .ingest(&[SourceDocument::new("guide.md", text)], &config)
            .unwrap();
        assert!(!session.is_empty(), "{}", config.kind());
        assert_eq!(session.index().len(), session.chunks().len());

        let hits = session.search("saturates", None, SearchMode::Sparse, 3).unwrap();
        assert!(!hits.is_empty(), "{}", config.kind());
        assert!(hits[0].chunk.text.contains("saturates"));
        for hit in &hits {
            assert_eq!(&text[hit.chunk.char_start..hit.chunk.char_end], hit.chunk.text);
        }
    }
}

#[test]
fn dense_modes_wait_for_embeddings() {
    let mut session = Session::new();
    session
        .ingest(&cat_and_dog(), &ChunkingConfig::FixedTokens { max_tokens: 10 })
        .unwrap();
    let embedder = HashingEmbedder::new(32).unwrap();
    let query = embed_query(&embedder, "cat").unwrap();

    let err = session
        .search("cat", Some(&query), SearchMode::Hybrid, 5)
        .unwrap_err();
    assert!(matches!(err, Error::MissingEmbeddings { missing: 2, total: 2 }));
    assert!(matches!(
        session.export(ExportKind::Dense),
        Err(Error::MissingEmbeddings { .. })
    ));

    session.embed_pending(&embedder, 1).unwrap();
    let hits = session
        .search("cat", Some(&query), SearchMode::Hybrid, 5)
        .unwrap();
    assert_eq!(hits[0].chunk.doc_id, "doc1");
}

#[test]
fn export_bundle_round_trips_through_disk() {
    let mut session = Session::new();
    session
        .ingest(&cat_and_dog(), &ChunkingConfig::FixedTokens { max_tokens: 3 })
        .unwrap();
    session
        .embed_pending(&HashingEmbedder::new(16).unwrap(), 8)
        .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let bundle = session.export(ExportKind::Hybrid).unwrap();
    bundle.write_to(tmp.path()).unwrap();
    let restored = ExportBundle::read_from(tmp.path()).unwrap();

    assert_eq!(restored, bundle);
    assert_eq!(restored.metadata.total_chunks, session.chunks().len());
    let ids: Vec<_> = restored.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["c_000001", "c_000002", "c_000003", "c_000004"]);
}

#[test]
fn saved_session_keeps_growing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("session.json");

    let mut session = Session::new();
    session
        .ingest(&cat_and_dog()[..1], &ChunkingConfig::default())
        .unwrap();
    session.save(&path).unwrap();

    let mut restored = Session::load(&path).unwrap();
    restored
        .ingest(&cat_and_dog()[1..], &ChunkingConfig::default())
        .unwrap();
    assert_eq!(restored.documents(), ["doc1", "doc2"]);
    assert_eq!(
        restored.search("sat", None, SearchMode::Sparse, 10).unwrap().len(),
        2
    );
    assert!(matches!(
        restored.ingest(&cat_and_dog()[..1], &ChunkingConfig::default()),
        Err(Error::DuplicateDocument(_))
    ));
}
