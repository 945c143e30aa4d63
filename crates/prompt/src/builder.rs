//! Prompt builder for rendering directives, context and the user query.

use crate::loader::validate_prompt;
use crate::types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PART_SEPARATOR};
use bastion_core::config::PromptConfig;
use bastion_core::{AppError, AppResult, Mode, PromptPayload, Snippet};
use handlebars::Handlebars;
use serde_json::json;

const BOUNDARY: &str = "boundary";
const MODE: &str = "mode";
const REQUIREMENTS: &str = "requirements";
const CONTEXT_HEADER: &str = "context_header";
const CONTEXT_ITEM: &str = "context_item";
const USER: &str = "user";

/// Renders prompts from a [`PromptDefinition`] within a length bound.
///
/// All lengths are counted in characters.
pub struct PromptBuilder {
    definition: PromptDefinition,
    registry: Handlebars<'static>,
    max_prompt_chars: usize,
    direct_directives: Vec<String>,
    rag_directives: Vec<String>,
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder")
            .field("prompt_id", &self.definition.id)
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish_non_exhaustive()
    }
}

impl PromptBuilder {
    /// Compile `definition` and check that directives plus a query of
    /// `max_query_chars` characters always fit `config.max_prompt_chars`.
    ///
    /// # Errors
    /// * `AppError::Config` - If the definition is invalid or cannot fit the bound
    pub fn new(
        config: &PromptConfig,
        definition: PromptDefinition,
        max_query_chars: usize,
    ) -> AppResult<Self> {
        validate_prompt(&definition).map_err(|e| AppError::Config(e.to_string()))?;

        let mut registry = Handlebars::new();

        // Plain text, not HTML
        registry.register_escape_fn(handlebars::no_escape);

        let templates = [
            (BOUNDARY, &definition.directives.boundary),
            (MODE, &definition.directives.mode),
            (REQUIREMENTS, &definition.directives.requirements),
            (CONTEXT_HEADER, &definition.context.header),
            (CONTEXT_ITEM, &definition.context.item),
            (USER, &definition.user_template),
        ];

        for (name, template) in templates {
            registry
                .register_template_string(name, template)
                .map_err(|e| {
                    AppError::Config(format!(
                        "Prompt '{}' has an invalid {} template: {}",
                        definition.id, name, e
                    ))
                })?;
        }

        let direct_directives = render_directives(&registry, Mode::Direct)?;
        let rag_directives = render_directives(&registry, Mode::Rag)?;

        let builder = Self {
            definition,
            registry,
            max_prompt_chars: config.max_prompt_chars,
            direct_directives,
            rag_directives,
        };

        let user_overhead = builder.render_user("")?.chars().count();
        let worst_case = [Mode::Direct, Mode::Rag]
            .into_iter()
            .map(|mode| joined_len(builder.directives_for(mode)))
            .max()
            .unwrap_or(0)
            + PART_SEPARATOR.chars().count()
            + user_overhead
            + max_query_chars;

        if worst_case > builder.max_prompt_chars {
            return Err(AppError::Config(format!(
                "prompt.maxPromptChars ({}) cannot hold the directives of '{}' plus a {} character query ({} needed)",
                builder.max_prompt_chars, builder.definition.id, max_query_chars, worst_case
            )));
        }

        tracing::debug!(
            "Prompt builder ready: '{}' (bound {} chars, worst case without context {})",
            builder.definition.id,
            builder.max_prompt_chars,
            worst_case
        );

        Ok(builder)
    }

    /// Builder over the built-in definition.
    pub fn with_builtin(config: &PromptConfig, max_query_chars: usize) -> AppResult<Self> {
        Self::new(config, PromptDefinition::builtin(), max_query_chars)
    }

    pub fn prompt_id(&self) -> &str {
        &self.definition.id
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    /// Role and boundary, mode line, answer requirements.
    pub fn directives(&self, mode: Mode) -> Vec<String> {
        self.directives_for(mode).to_vec()
    }

    fn directives_for(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Direct => &self.direct_directives,
            Mode::Rag => &self.rag_directives,
        }
    }

    /// Render `payload` into a prompt no longer than the configured bound.
    ///
    /// Snippets arrive in descending score order. When the prompt is too
    /// long they are dropped from the tail until it fits; directives and
    /// the query are never cut.
    ///
    /// # Errors
    /// * `AppError::Prompt` - If rendering fails or the bound cannot be met
    pub fn build(&self, payload: &PromptPayload) -> AppResult<BuiltPrompt> {
        let directives = payload.system_directives().join("\n");
        let user = self.render_user(payload.user_query())?;
        let items = self.render_items(payload.context_snippets())?;
        let header = self
            .registry
            .render(CONTEXT_HEADER, &json!({}))
            .map_err(|e| AppError::Prompt(format!("Failed to render context header: {}", e)))?;

        let user_len = PART_SEPARATOR.chars().count() + user.chars().count();

        let mut included = items.len();
        let system = loop {
            let system = self.assemble_system(&directives, &header, &items[..included]);
            if system.chars().count() + user_len <= self.max_prompt_chars {
                break system;
            }

            if included == 0 {
                tracing::error!(
                    "Prompt '{}' exceeds {} chars without context",
                    self.definition.id,
                    self.max_prompt_chars
                );
                return Err(AppError::Prompt(format!(
                    "Prompt of {} chars exceeds the bound of {} without any context",
                    system.chars().count() + user_len,
                    self.max_prompt_chars
                )));
            }

            included -= 1;
        };

        let dropped = items.len() - included;
        if dropped > 0 {
            tracing::warn!(
                "Dropped {} of {} snippets to fit the {} char prompt bound",
                dropped,
                items.len(),
                self.max_prompt_chars
            );
        }

        let built = BuiltPrompt {
            system,
            user,
            metadata: BuiltPromptMetadata {
                prompt_id: self.definition.id.clone(),
                mode: payload.mode(),
                snippets_included: included,
                snippets_dropped: dropped,
            },
        };

        tracing::debug!(
            "Built prompt '{}': {} chars, {} snippets",
            built.metadata.prompt_id,
            built.char_len(),
            included
        );

        Ok(built)
    }

    fn assemble_system(&self, directives: &str, header: &str, items: &[String]) -> String {
        if items.is_empty() {
            return directives.to_string();
        }

        let mut system = String::with_capacity(directives.len() + header.len() + 64);
        system.push_str(directives);
        system.push('\n');
        system.push_str(header);
        system.push('\n');
        system.push_str(&items.join(&self.definition.context.separator));
        system
    }

    fn render_items(&self, snippets: &[Snippet]) -> AppResult<Vec<String>> {
        snippets
            .iter()
            .enumerate()
            .map(|(i, snippet)| {
                let data = json!({
                    "index": i + 1,
                    "source_id": snippet.source_id(),
                    "corpus_id": snippet.corpus_id(),
                    "score": format!("{:.4}", snippet.score()),
                    "text": snippet.text(),
                    "metadata": snippet.metadata_summary(),
                });
                self.registry
                    .render(CONTEXT_ITEM, &data)
                    .map_err(|e| AppError::Prompt(format!("Failed to render snippet: {}", e)))
            })
            .collect()
    }

    fn render_user(&self, query: &str) -> AppResult<String> {
        self.registry
            .render(USER, &json!({ "query": query }))
            .map_err(|e| AppError::Prompt(format!("Failed to render user message: {}", e)))
    }
}

fn render_directives(registry: &Handlebars<'static>, mode: Mode) -> AppResult<Vec<String>> {
    let data = json!({ "mode": mode.as_str() });
    [BOUNDARY, MODE, REQUIREMENTS]
        .into_iter()
        .map(|name| {
            registry
                .render(name, &data)
                .map_err(|e| AppError::Config(format!("Failed to render {} directive: {}", name, e)))
        })
        .filter(|rendered| !matches!(rendered, Ok(text) if text.trim().is_empty()))
        .collect()
}

fn joined_len(lines: &[String]) -> usize {
    let chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    chars + lines.len().saturating_sub(1)
}
