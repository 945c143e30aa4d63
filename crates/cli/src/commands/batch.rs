//! Batch command handler.
//!
//! Answers one question per line of a file, running up to `--concurrency`
//! queries at once. Results are printed as JSON lines in completion order.

use super::ask::QueryOptions;
use super::report::RunReport;
use bastion_core::{config::AppConfig, AppError, AppResult};
use bastion_pipeline::Pipeline;
use clap::Args;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

/// Answer every question in a file
#[derive(Args, Debug)]
pub struct BatchCommand {
    /// File with one question per line (blank lines and `#` comments are skipped)
    pub file: PathBuf,

    #[command(flatten)]
    pub query: QueryOptions,

    /// Maximum queries in flight
    #[arg(long, default_value = "4")]
    pub concurrency: usize,
}

impl BatchCommand {
    /// Execute the batch command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing batch command");

        let questions = read_questions(&self.file)?;
        if questions.is_empty() {
            tracing::warn!("No questions found in {:?}", self.file);
            return Ok(());
        }

        let pipeline = Pipeline::from_config(config)?;
        let concurrency = self.concurrency.max(1);
        tracing::info!(
            "Answering {} questions (concurrency {})",
            questions.len(),
            concurrency
        );

        let mut results = stream::iter(questions)
            .map(|(line, question)| {
                let pipeline = &pipeline;
                let query = self.query.to_query(question.clone());
                async move {
                    let run = pipeline.run(query).await;
                    RunReport::new(question, &run).at_line(line)
                }
            })
            .buffer_unordered(concurrency);

        let mut total = 0;
        let mut flagged = 0;
        let mut failed = 0;

        while let Some(report) = results.next().await {
            total += 1;
            if report.is_error() {
                failed += 1;
            } else if report.is_flagged() {
                flagged += 1;
            }
            println!("{}", report.to_json()?);
        }

        tracing::info!(
            "Batch finished: {} answered, {} flagged, {} failed",
            total - failed,
            flagged,
            failed
        );

        Ok(())
    }
}

/// Questions with their 1-based line numbers.
fn read_questions(path: &Path) -> AppResult<Vec<(usize, String)>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read question file {:?}: {}", path, e))
    })?;

    Ok(contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| (i, line.to_string()))
        .collect())
}
