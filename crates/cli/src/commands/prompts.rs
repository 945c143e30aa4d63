//! Prompts command handler.
//!
//! Lists the prompt definitions found in `.bastion/prompts`.

use bastion_core::{config::AppConfig, AppResult};
use bastion_prompt::{list_prompts, load_prompt, BUILTIN_PROMPT_ID};
use clap::Args;
use serde::Serialize;

/// List available prompt definitions
#[derive(Args, Debug)]
pub struct PromptsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct PromptEntry {
    id: String,
    title: String,
    active: bool,
    valid: bool,
}

impl PromptsCommand {
    /// Execute the prompts command.
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing prompts command");

        let active = config
            .prompt
            .prompt_id
            .as_deref()
            .unwrap_or(BUILTIN_PROMPT_ID);

        let mut entries = vec![PromptEntry {
            id: BUILTIN_PROMPT_ID.to_string(),
            title: "(builtin)".to_string(),
            active: active == BUILTIN_PROMPT_ID,
            valid: true,
        }];

        for id in list_prompts(&config.workspace)? {
            let entry = match load_prompt(&config.workspace, &id) {
                Ok(definition) => PromptEntry {
                    active: active == definition.id,
                    id,
                    title: definition.title,
                    valid: true,
                },
                Err(e) => {
                    tracing::warn!("Prompt '{}' is invalid: {}", id, e);
                    PromptEntry {
                        active: false,
                        id,
                        title: String::new(),
                        valid: false,
                    }
                }
            };
            entries.push(entry);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        for entry in &entries {
            let marker = if entry.active { "*" } else { " " };
            let status = if entry.valid { "" } else { " [invalid]" };
            println!("{} {}  {}{}", marker, entry.id, entry.title, status);
        }

        Ok(())
    }
}
