//! Prompt-context resolution from the chapter's hierarchy.
//!
//! Each level contributes its curated `context_prompt` when one was written,
//! and a generated `"System Name: ..."` / `"Module Name: ..."` line otherwise,
//! so the analyzer always knows where in the product a recording came from.

use crate::analyzer::AnalysisContext;
use crate::database::models::ChapterContextRow;

pub fn resolve_analysis_context(row: &ChapterContextRow, user_goal: &str) -> AnalysisContext {
    let module_context = match (&row.module_context, &row.module_name) {
        (Some(prompt), _) if !prompt.trim().is_empty() => prompt.clone(),
        (_, Some(name)) => format!("Module Name: {name}"),
        _ => String::new(),
    };
    let system_context = match (&row.system_context, &row.system_name) {
        (Some(prompt), _) if !prompt.trim().is_empty() => prompt.clone(),
        (_, Some(name)) => format!("System Name: {name}"),
        _ => String::new(),
    };
    AnalysisContext {
        system_context,
        module_context,
        user_goal: user_goal.to_string(),
    }
}
