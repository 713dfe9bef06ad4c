use std::{collections::HashSet, process::ExitCode};

use clap::Parser;
use docsift::{
    DataDir,
    Session,
    cli::{self, Cli, Command},
    embedding::{Embedder, HashingEmbedder},
    error,
    search,
    walker,
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCSIFT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> error::Result<()> {
    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&data_dir, &args)?,
        Command::Search(args) => cmd_search(&data_dir, &args)?,
        Command::Export(args) => cmd_export(&data_dir, &args)?,
        Command::Status(args) => cmd_status(&data_dir, args.json)?,
        Command::Reset => cmd_reset(&data_dir)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

/// Rebuild the provider that embedded the stored chunks.
fn session_embedder(session: &Session) -> error::Result<Option<HashingEmbedder>> {
    session
        .embedder_info()
        .map(|info| HashingEmbedder::new(info.dimension))
        .transpose()
}

fn cmd_ingest(data_dir: &DataDir, args: &cli::IngestArgs) -> error::Result<()> {
    let config = args.chunking_config();
    config.validate()?;

    let include = walker::build_include(&args.include)?;
    let mut sources = walker::collect_sources(&args.paths, include.as_ref())?;
    if sources.is_empty() {
        eprintln!("No documents found.");
        return Ok(());
    }

    let mut session = data_dir.load_session()?;

    // Re-running over a directory only picks up files added since.
    let found = sources.len();
    {
        let known: HashSet<&str> =
            session.documents().iter().map(String::as_str).collect();
        sources.retain(|source| !known.contains(source.path.as_str()));
    }
    let skipped = found - sources.len();
    if skipped > 0 {
        tracing::info!(skipped, "skipping already ingested documents");
    }
    if sources.is_empty() {
        println!("No new documents ({skipped} already ingested)");
    } else {
        let stats = session.ingest(&sources, &config)?;

        // Sparse state is saved before embedding so a provider failure
        // never loses the ingest.
        data_dir.save_session(&session)?;
        println!(
            "Ingested {} document(s), {} chunk(s)",
            stats.docs_ingested, stats.chunks_created
        );
    }

    if args.embed {
        let embedder = match session_embedder(&session)? {
            Some(existing) if existing.dimension() != args.dimension => {
                return Err(error::Error::Config(format!(
                    "session vectors have {} dimensions; reset to change --dimension",
                    existing.dimension()
                )));
            }
            Some(existing) => existing,
            None => HashingEmbedder::new(args.dimension)?,
        };
        let embedded = session.embed_pending(&embedder, args.batch_size)?;
        data_dir.save_session(&session)?;
        println!("Embedded {embedded} chunk(s) with {}", embedder.name());
    }

    Ok(())
}

fn cmd_search(data_dir: &DataDir, args: &cli::SearchArgs) -> error::Result<()> {
    let session = data_dir.load_session()?;
    let embedder = session_embedder(&session)?;
    let params = args.params();

    let results = search::execute_search(
        &params,
        &session,
        embedder.as_ref().map(|e| e as &dyn Embedder),
    )?;

    if args.json {
        search::format_json(&results, &args.query, args.mode)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

fn cmd_export(data_dir: &DataDir, args: &cli::ExportArgs) -> error::Result<()> {
    let session = data_dir.load_session()?;
    let bundle = session.export(args.kind)?;
    bundle.write_to(&args.out)?;
    println!(
        "Exported {} chunk(s) to {}",
        bundle.records.len(),
        args.out.display()
    );
    Ok(())
}

fn cmd_status(data_dir: &DataDir, json: bool) -> error::Result<()> {
    let session = data_dir.load_session()?;
    let status = session.status();

    if json {
        let mut value = serde_json::to_value(&status)?;
        value["data_dir"] = data_dir.root().display().to_string().into();
        println!("{value}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {}", status.documents);
        println!("Chunks: {}", status.chunks);
        println!("Terms: {}", status.terms);
        println!("Average chunk length: {:.1} terms", status.avg_chunk_terms);
        match &status.embedder {
            Some(info) => println!(
                "Embedded: {}/{} ({}, {} dimensions)",
                status.embedded, status.chunks, info.name, info.dimension
            ),
            None => println!("Embedded: {}/{}", status.embedded, status.chunks),
        }
    }
    Ok(())
}

fn cmd_reset(data_dir: &DataDir) -> error::Result<()> {
    if data_dir.reset_session()? {
        println!("Removed {}", data_dir.session_file().display());
    } else {
        println!("Nothing to reset.");
    }
    Ok(())
}
