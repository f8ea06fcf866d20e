//! Ask a model about a SQLite database.
//!
//! This demonstrates:
//! 1. Building prompt context from a metadata source
//! 2. A raw completion (one request, no retry)
//! 3. A structured completion validated against a `schemars`-derived schema,
//!    retried with a constant backoff
//!
//! Run with:
//! `cargo run -p ravel --example ask_database --features full -- financial.db`
//!
//! `OPENAI_API_KEY` is read from the environment or a `.env` file.

use anyhow::Context;
use ravel::prelude::*;
use ravel::schemars::JsonSchema;
use ravel::{render_metadata, MetadataSource};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum DataQuality {
    Poor,
    Fair,
    Good,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TableNote {
    /// Table the note is about
    table: String,
    /// What the table appears to hold
    purpose: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DatabaseAssessment {
    /// One-sentence summary of the database
    summary: String,
    /// Overall quality judgement
    quality: DataQuality,
    /// One note per table
    tables: Vec<TableNote>,
    /// Follow-up questions worth asking
    suggested_queries: Vec<String>,
}

fn analyst_prompt(metadata: &str, question: &str) -> String {
    format!(
        "# Role\nYou are a junior quant data analyst.\n\n\
         # Database\nHere is some metadata about the database:\n{metadata}\n\
         # Task\nA teammate has asked you to answer the following question:\n{question}\n\n\
         Please answer the question in a concise manner."
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "financial.db".to_string());
    let source = SqliteMetadata::open(&path).with_context(|| format!("opening {path}"))?;
    let metadata = render_metadata(&source.tables()?);

    let client = CompletionClient::builder(OpenAiProvider::from_env()?)
        .layer(LoggingLayer::new())
        .finish();

    let prompt = analyst_prompt(&metadata, "What do you think about this database?");

    println!("=== Raw completion ===");
    let answer = client.complete(prompt.clone(), "gpt-4.1").await?;
    println!("{answer}\n");

    println!("=== Structured completion ===");
    let request = CompletionRequest::new(prompt).with_max_output_tokens(1024);
    let policy = RetryPolicy::new()
        .with_max_retries(2)
        .with_delay(Duration::from_secs(1));
    let assessment: DatabaseAssessment = client.complete_structured(&request, policy).await?;

    println!("Summary: {}", assessment.summary);
    println!("Quality: {:?}", assessment.quality);
    for note in &assessment.tables {
        println!("  {}: {}", note.table, note.purpose);
    }
    for query in &assessment.suggested_queries {
        println!("  ? {query}");
    }

    Ok(())
}
