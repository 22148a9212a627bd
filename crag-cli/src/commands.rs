use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crag_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use crag_rag::rerank_api::RerankApiReranker;
use crag_rag::{ChatSession, RagConfig, RagPipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ServiceArgs;

/// Settings from `--config`, with `--data-dir` applied on top.
pub fn load_config(path: Option<&PathBuf>, data_dir: Option<PathBuf>) -> Result<RagConfig> {
    let mut config = match path {
        Some(path) => RagConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RagConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    config.validate()?;
    Ok(config)
}

fn api_key(services: &ServiceArgs) -> Result<&str> {
    match services.openai_api_key.as_deref() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => bail!("OPENAI_API_KEY is not set; pass --openai-api-key or export it"),
    }
}

fn chat_model(services: &ServiceArgs, model: &str) -> Result<OpenAIChatModel> {
    let mut llm = OpenAIChatModel::new(api_key(services)?, model)?;
    if let Some(base_url) = &services.openai_base_url {
        llm = llm.with_base_url(base_url);
    }
    Ok(llm)
}

/// Assemble the pipeline. `retrieves` marks commands that query the indexes,
/// the only ones affected by a missing rerank service.
pub fn build_pipeline(config: RagConfig, services: &ServiceArgs, retrieves: bool) -> Result<RagPipeline> {
    let mut embedder = OpenAIEmbeddingProvider::new(api_key(services)?)?.with_model(&services.embedding_model);
    if let Some(base_url) = &services.openai_base_url {
        embedder = embedder.with_base_url(base_url);
    }
    if let Some(dimensions) = services.embedding_dimensions {
        embedder = embedder.with_dimensions(dimensions);
    }

    let retry = config.retry.clone();
    let mut builder = RagPipeline::builder()
        .embedding_provider(Arc::new(embedder))
        .language_model(Arc::new(chat_model(services, &services.chat_model)?));

    match (&services.rerank_base_url, &services.rerank_api_key, &services.rerank_model) {
        (Some(base_url), Some(key), Some(model)) => {
            let reranker = RerankApiReranker::new(base_url, key, model)?.with_retry(retry);
            builder = builder.reranker(Arc::new(reranker));
        }
        _ if retrieves => {
            warn!("no rerank service configured (RERANK_BASE_URL, RERANK_API_KEY, RERANK_MODEL); skipping rerank")
        }
        _ => {}
    }

    Ok(builder.config(config).build()?)
}

pub async fn index(pipeline: &RagPipeline, collection: &str, paths: &[PathBuf]) -> Result<()> {
    let report = pipeline
        .index(collection, paths)
        .await
        .with_context(|| format!("indexing collection '{collection}' failed"))?;
    println!(
        "indexed {} chunks from {} source(s), {} page(s) into '{}' (lexical index: {})",
        report.chunks,
        report.sources,
        report.pages,
        report.collection,
        report.lexical_path.display()
    );
    Ok(())
}

#[derive(Serialize)]
struct RetrievedChunk<'a> {
    rank: usize,
    score: f32,
    text: &'a str,
    metadata: &'a crag_rag::Metadata,
}

pub async fn retrieve(pipeline: &RagPipeline, collection: &str, query: &str, json: bool) -> Result<()> {
    let results = pipeline.retrieve(collection, query).await?;

    if json {
        let rows: Vec<_> = results
            .iter()
            .enumerate()
            .map(|(i, r)| RetrievedChunk {
                rank: i + 1,
                score: r.score,
                text: &r.chunk.text,
                metadata: &r.chunk.metadata,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("no results");
    }
    for (i, result) in results.iter().enumerate() {
        let source = result.chunk.metadata.get("source").map(String::as_str).unwrap_or("?");
        println!("#{} score={:.4} source={}", i + 1, result.score, source);
        println!("{}\n", result.chunk.text);
    }
    Ok(())
}

pub async fn chat(
    pipeline: RagPipeline,
    services: &ServiceArgs,
    collection: &str,
    temperature: Option<f32>,
) -> Result<()> {
    let mut generator = chat_model(services, &services.answer_model)?;
    if let Some(temperature) = temperature {
        generator = generator.with_temperature(temperature);
    }
    let generator = Arc::new(generator);
    let mut session = ChatSession::new(Arc::new(pipeline), generator, collection);
    let mut editor = DefaultEditor::new()?;

    println!("crag chat over '{collection}'. /reset forgets the conversation, Ctrl-D exits.");
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(prompt);
        if prompt == "/reset" {
            session.reset();
            println!("conversation cleared");
            continue;
        }

        let result = session
            .respond(prompt, |fragment| {
                print!("{fragment}");
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();
        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }

    info!(turns = session.memory().len(), "chat ended");
    Ok(())
}
