// All LLM prompt constants for the Negotiation module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::PLAIN_TEXT_SYSTEM;

/// System prompt for letter drafting.
pub fn letter_system() -> String {
    format!(
        "You are an experienced compensation advisor who writes salary adjustment requests \
        on behalf of employees. {PLAIN_TEXT_SYSTEM}"
    )
}

/// Letter drafting prompt template.
/// Replace: {figures_instruction}, {full_name}, {job_title}, {employer}, {tone},
///          {current_salary}, {target_salary}, {gap_summary}, {talking_points}
pub const LETTER_PROMPT_TEMPLATE: &str = r#"{figures_instruction}

Write a salary adjustment request letter from {full_name}, {job_title} at {employer}, to their manager.

TONE: {tone}

FIGURES:
- Current salary: {current_salary}
- Requested salary: {target_salary}
- Situation: {gap_summary}

TALKING POINTS (use the ones that fit, in this order):
{talking_points}

Rules:
- 150 to 250 words, three or four short paragraphs.
- Open with appreciation for the role, not with the numbers.
- State the requested salary once, explicitly.
- Close by asking for a conversation, not by issuing an ultimatum.
- Sign off with the employee's name only."#;
