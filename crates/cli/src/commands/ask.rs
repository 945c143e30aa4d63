//! Ask command handler.
//!
//! Runs one question through the pipeline and prints the answer.

use super::report::RunReport;
use bastion_core::{config::AppConfig, AppResult, Answer, Mode, Query};
use bastion_pipeline::Pipeline;
use clap::Args;

/// Mode and retrieval options shared by `ask` and `batch`.
#[derive(Args, Debug, Clone)]
pub struct QueryOptions {
    /// Answer mode (direct, rag)
    #[arg(long, default_value = "direct")]
    pub mode: Mode,

    /// Corpus to search in rag mode, or several separated by commas (default: retrieval.defaultCorpus)
    #[arg(long)]
    pub corpus: Option<String>,

    /// Number of snippets to retrieve (default: retrieval.defaultTopK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl QueryOptions {
    pub fn to_query(&self, text: impl Into<String>) -> Query {
        let mut query = match self.mode {
            Mode::Direct => Query::direct(text),
            Mode::Rag => Query::rag(text),
        };

        if let Some(corpus) = &self.corpus {
            query = query.with_corpus(corpus.clone());
        }

        if let Some(top_k) = self.top_k {
            query = query.with_top_k(top_k);
        }

        query
    }
}

/// Ask one question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    #[command(flatten)]
    pub query: QueryOptions,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self.query);

        let pipeline = Pipeline::from_config(config)?;
        let run = pipeline.run(self.query.to_query(&self.question)).await;

        if self.json {
            let report = RunReport::new(self.question.clone(), &run);
            println!("{}", report.to_json()?);
            return json_exit(run.outcome);
        }

        let answer = run.outcome?;
        print_answer(&answer);
        Ok(())
    }
}

/// The report already carries the error; passing it on keeps the exit code
/// the same as in text mode.
fn json_exit(outcome: AppResult<Answer>) -> AppResult<()> {
    outcome.map(|_| ())
}

/// Answer text on stdout, sources after it.
fn print_answer(answer: &Answer) {
    if answer.flagged {
        tracing::warn!(
            "Answer flagged: {}",
            answer.flag_reason.as_deref().unwrap_or("policy")
        );
    }

    println!("{}", answer.text);

    if !answer.citations.is_empty() {
        println!();
        for citation in &answer.citations {
            println!(
                "[{}] {} ({}, {:.4})",
                citation.index, citation.source_id, citation.corpus_id, citation.score
            );
        }
    }
}
