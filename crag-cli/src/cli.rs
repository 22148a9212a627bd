use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "crag", version, about = "Contextual hybrid retrieval over PDF and text corpora")]
pub struct Cli {
    /// JSON file with pipeline settings; missing fields take their defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the lexical and semantic indexes
    #[arg(long, global = true, env = "CRAG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    #[command(flatten)]
    pub services: ServiceArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Model contextualizing chunks at index time
    #[arg(long, global = true, env = "CRAG_CHAT_MODEL", default_value = "gpt-4o")]
    pub chat_model: String,

    /// Model answering chat questions
    #[arg(long, global = true, env = "CRAG_ANSWER_MODEL", default_value = "gpt-4.1")]
    pub answer_model: String,

    #[arg(long, global = true, env = "CRAG_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Override the embedding dimensionality (Matryoshka models)
    #[arg(long, global = true)]
    pub embedding_dimensions: Option<usize>,

    #[arg(long, global = true, env = "RERANK_API_KEY", hide_env_values = true)]
    pub rerank_api_key: Option<String>,

    #[arg(long, global = true, env = "RERANK_BASE_URL")]
    pub rerank_base_url: Option<String>,

    #[arg(long, global = true, env = "RERANK_MODEL")]
    pub rerank_model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Contextualize and index source files, replacing the collection
    Index {
        #[arg(long, short, default_value = "design")]
        collection: String,
        /// `.pdf` or `.txt` files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the ranked chunks retrieved for a query
    Retrieve {
        #[arg(long, short, default_value = "design")]
        collection: String,
        query: String,
        /// Print results as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Interactive question answering over a collection
    Chat {
        #[arg(long, short, default_value = "design")]
        collection: String,
        /// Sampling temperature for answers; the server default when unset
        #[arg(long)]
        temperature: Option<f32>,
    },
}

impl Command {
    /// Whether the command runs queries through the rerank stage.
    pub fn retrieves(&self) -> bool {
        matches!(self, Command::Retrieve { .. } | Command::Chat { .. })
    }
}
