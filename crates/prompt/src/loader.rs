//! Prompt loader for YAML prompt definitions.

use crate::types::PromptDefinition;
use bastion_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Directory holding prompt definitions, relative to the workspace.
const PROMPTS_DIR: &str = ".bastion/prompts";

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(PROMPTS_DIR)
}

/// Load a prompt definition by ID from the workspace.
///
/// This function looks for a file named `<id>.yml` in the
/// `.bastion/prompts/` directory.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.bastion/`
/// * `prompt_id` - Prompt identifier (e.g., "bastion.security.strict")
///
/// # Example
/// ```no_run
/// use bastion_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "bastion.security.strict")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    if prompt_id.is_empty() || prompt_id.contains(['/', '\\']) || prompt_id.starts_with('.') {
        return Err(AppError::Prompt(format!("Invalid prompt id: {:?}", prompt_id)));
    }

    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to parse prompt YAML {:?}: {}",
            prompt_file, e
        ))
    })?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file {:?} declares id '{}'",
            prompt_file, definition.id
        )));
    }

    validate_prompt(&definition)?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// List all available prompt IDs in the workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();

    Ok(prompt_ids)
}

/// Validate a prompt definition.
pub fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    // Validate API version format (simple check)
    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {:?}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    if def.directives.boundary.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt directives.boundary cannot be empty".to_string(),
        ));
    }

    if def.context.item.trim().is_empty() {
        return Err(AppError::Prompt(
            "Prompt context.item cannot be empty".to_string(),
        ));
    }

    if !def.user_template.contains("query") {
        return Err(AppError::Prompt(
            "Prompt userTemplate must reference {{query}}".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_prompt(dir: &Path, id: &str, body: &str) -> PathBuf {
        let prompts_dir = dir.join(PROMPTS_DIR);
        fs::create_dir_all(&prompts_dir).unwrap();

        let file_path = prompts_dir.join(format!("{}.yml", id));
        fs::write(&file_path, body).unwrap();
        file_path
    }

    fn valid_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Strict assistant"
apiVersion: "1.0"
createdBy: test
directives:
  boundary: "Only defensive guidance."
  mode: "Mode: {{{{mode}}}}"
  requirements: "Cite sources as [n]."
context:
  header: "Known facts:"
  item: "[{{{{index}}}}] {{{{source_id}}}}: {{{{text}}}}"
  separator: "\n"
userTemplate: "Question: {{{{query}}}}"
"#,
            id
        )
    }

    #[test]
    fn test_load_valid_prompt() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "strict", &valid_yaml("strict"));

        let prompt = load_prompt(temp_dir.path(), "strict").unwrap();
        assert_eq!(prompt.id, "strict");
        assert_eq!(prompt.directives.mode, "Mode: {{mode}}");
        assert_eq!(prompt.context.header, "Known facts:");
        assert_eq!(prompt.user_template, "Question: {{query}}");
    }

    #[test]
    fn test_load_nonexistent_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_prompt(temp_dir.path(), "nonexistent");
        assert!(matches!(result, Err(AppError::Prompt(_))));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "invalid", "invalid: yaml: content:");

        assert!(load_prompt(temp_dir.path(), "invalid").is_err());
    }

    #[test]
    fn test_load_rejects_mismatched_id() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "one", &valid_yaml("two"));

        assert!(load_prompt(temp_dir.path(), "one").is_err());
    }

    #[test]
    fn test_load_rejects_path_like_id() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "../config").is_err());
        assert!(load_prompt(temp_dir.path(), "").is_err());
    }

    #[test]
    fn test_validate_requires_query_reference() {
        let mut def = PromptDefinition::builtin();
        def.user_template = "no placeholder".to_string();
        assert!(validate_prompt(&def).is_err());

        assert!(validate_prompt(&PromptDefinition::builtin()).is_ok());
    }

    #[test]
    fn test_list_prompts() {
        let temp_dir = TempDir::new().unwrap();
        write_prompt(temp_dir.path(), "zeta", &valid_yaml("zeta"));
        write_prompt(temp_dir.path(), "alpha", &valid_yaml("alpha"));
        fs::write(temp_dir.path().join(PROMPTS_DIR).join("readme.txt"), "x").unwrap();

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_list_prompts_without_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_prompts(temp_dir.path()).unwrap().is_empty());
    }
}
