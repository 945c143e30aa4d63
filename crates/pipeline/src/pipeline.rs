//! Query orchestration.

use crate::state::{PipelineState, Trace};
use bastion_core::config::RetrievalConfig;
use bastion_core::{
    AppConfig, AppResult, Answer, Mode, PromptPayload, Query, RawHit, RetryPolicy, Snippet,
};
use bastion_guard::{create_sink, Guard};
use bastion_knowledge::{citations, HttpSearchProvider, ResultProcessor, Retriever};
use bastion_llm::{create_provider, DialogueClient};
use bastion_prompt::{load_prompt, PromptBuilder, PromptDefinition};
use futures::future::join_all;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of one query together with the states it passed through.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub trace: Trace,
    pub outcome: AppResult<Answer>,
}

/// Guarded question answering over the search and dialogue services.
///
/// Each query runs Guard → (Retriever → ResultProcessor) → PromptBuilder →
/// DialogueClient → Guard, with at most one retrieval round and one
/// generation round.
#[derive(Debug)]
pub struct Pipeline {
    guard: Guard,
    retriever: Retriever,
    processor: ResultProcessor,
    prompt: PromptBuilder,
    dialogue: DialogueClient,
    default_corpus: String,
    default_top_k: usize,
}

impl Pipeline {
    pub fn new(
        guard: Guard,
        retriever: Retriever,
        processor: ResultProcessor,
        prompt: PromptBuilder,
        dialogue: DialogueClient,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            guard,
            retriever,
            processor,
            prompt,
            dialogue,
            default_corpus: retrieval.default_corpus.clone(),
            default_top_k: retrieval.default_top_k.max(1),
        }
    }

    /// Build every component from configuration.
    ///
    /// Must be called from within a tokio runtime when the JSONL audit sink
    /// is selected.
    ///
    /// # Errors
    /// * `AppError::Config` - If validation fails or a component rejects its section
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let sink = create_sink(config.guard.audit, &config.audit_log_path())?;
        let secrets = std::iter::once(config.service.user_token.as_str())
            .chain(config.service.corpus_tokens.values().map(String::as_str));
        let guard = Guard::new(&config.guard, sink)?.with_secrets(secrets);

        let retry = RetryPolicy::from(&config.service);

        let search = HttpSearchProvider::new(&config.service, &config.retrieval)?;
        let retriever = Retriever::new(Arc::new(search), retry);

        let processor = ResultProcessor::new(&config.retrieval);

        let definition = match config.prompt.prompt_id.as_deref() {
            Some(id) => load_prompt(&config.workspace, id)?,
            None => PromptDefinition::builtin(),
        };
        let prompt = PromptBuilder::new(&config.prompt, definition, guard.max_input_chars())?;

        let provider = create_provider(&config.dialogue, &config.service)?;
        let dialogue = DialogueClient::new(provider, &config.dialogue, retry);

        tracing::info!(
            "Pipeline ready (prompt {}, dialogue via {}, default corpus {})",
            prompt.prompt_id(),
            dialogue.provider_name(),
            config.retrieval.default_corpus
        );

        Ok(Self::new(
            guard,
            retriever,
            processor,
            prompt,
            dialogue,
            &config.retrieval,
        ))
    }

    /// Answer `query`.
    ///
    /// A refused query or answer is returned as a flagged `Answer`, not an error.
    pub async fn answer_query(&self, query: Query) -> AppResult<Answer> {
        self.run(query).await.outcome
    }

    /// Answer `query` and keep the state trace.
    pub async fn run(&self, query: Query) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("query", run_id = %run_id, mode = %query.mode);

        let mut trace = Trace::start();
        let outcome = self.execute(&query, &mut trace).instrument(span).await;

        if outcome.is_err() {
            trace.advance(PipelineState::Error);
        }

        PipelineRun {
            run_id,
            trace,
            outcome,
        }
    }

    async fn execute(&self, query: &Query, trace: &mut Trace) -> AppResult<Answer> {
        tracing::info!("Query received ({} chars)", query.raw_text.chars().count());

        let verdict = self.guard.check_input(&query.raw_text);
        let user_query = match verdict.sanitized_text {
            Some(text) if verdict.allowed => text,
            _ => {
                trace.advance(PipelineState::Error);
                return Ok(Answer::refused(
                    self.guard.input_refusal(),
                    verdict.reason.unwrap_or_else(|| "query refused".to_string()),
                    query.mode,
                ));
            }
        };
        trace.advance(PipelineState::InputChecked);

        let payload = match query.mode {
            Mode::Direct => {
                PromptPayload::direct(self.prompt.directives(Mode::Direct), user_query)
            }
            Mode::Rag => {
                let snippets = self.retrieve(query, &user_query, trace).await?;
                let mode = if snippets.is_empty() {
                    tracing::info!("No usable snippets; answering without context");
                    Mode::Direct
                } else {
                    Mode::Rag
                };
                PromptPayload::rag(self.prompt.directives(mode), snippets, user_query)
            }
        };

        let built = self.prompt.build(&payload).map_err(|e| {
            tracing::error!("Prompt assembly fault: {}", e);
            e
        })?;
        trace.advance(PipelineState::Prompted);
        tracing::info!(
            "Prompt built ({} chars, {} snippets)",
            built.char_len(),
            built.metadata.snippets_included
        );

        let raw_answer = self.dialogue.generate(&built).await?;
        trace.advance(PipelineState::Generated);

        let verdict = self.guard.check_output(&raw_answer);
        trace.advance(PipelineState::OutputChecked);

        let mode = built.metadata.mode;
        let answer = match verdict.sanitized_text {
            Some(text) if verdict.allowed => {
                let used = built
                    .metadata
                    .snippets_included
                    .min(payload.context_snippets().len());
                Answer::new(text, mode, citations(&payload.context_snippets()[..used]))
            }
            _ => Answer::refused(
                self.guard.output_refusal(),
                verdict.reason.unwrap_or_else(|| "answer refused".to_string()),
                mode,
            ),
        };
        trace.advance(PipelineState::Done);

        tracing::info!(
            "Answer ready (mode {}, flagged {}, {} citations)",
            answer.mode,
            answer.flagged,
            answer.citations.len()
        );

        Ok(answer)
    }

    async fn retrieve(
        &self,
        query: &Query,
        user_query: &str,
        trace: &mut Trace,
    ) -> AppResult<Vec<Snippet>> {
        let corpora = query.effective_corpora(&self.default_corpus);
        let top_k = query.effective_top_k(self.default_top_k);

        let snippets = match corpora.as_slice() {
            [corpus_id] => {
                let hits = self.retriever.search(user_query, corpus_id, top_k).await?;
                trace.advance(PipelineState::Retrieved);
                self.processor.process(hits, top_k)
            }
            _ => {
                let per_corpus = self.search_all(user_query, &corpora, top_k).await?;
                trace.advance(PipelineState::Retrieved);
                self.processor.merge(per_corpus, top_k)
            }
        };
        trace.advance(PipelineState::Processed);

        Ok(snippets)
    }

    /// Search every corpus concurrently, each under its own retry budget.
    ///
    /// A failed corpus is skipped. Only when all of them fail is the first
    /// error returned.
    async fn search_all(
        &self,
        user_query: &str,
        corpora: &[&str],
        top_k: usize,
    ) -> AppResult<Vec<Vec<RawHit>>> {
        let results = join_all(
            corpora
                .iter()
                .map(|corpus_id| self.retriever.search(user_query, corpus_id, top_k)),
        )
        .await;

        let mut hits = Vec::with_capacity(corpora.len());
        let mut first_error = None;

        for (corpus_id, result) in corpora.iter().zip(results) {
            match result {
                Ok(corpus_hits) => hits.push(corpus_hits),
                Err(e) => {
                    tracing::warn!("Skipping corpus '{}': {}", corpus_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if hits.is_empty() => Err(e),
            _ => {
                tracing::info!(
                    "Searched {} corpora, {} answered",
                    corpora.len(),
                    hits.len()
                );
                Ok(hits)
            }
        }
    }
}
