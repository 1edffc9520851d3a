// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// System prompt fragment for plain-text output.
pub const PLAIN_TEXT_SYSTEM: &str = "You are a precise writing assistant. \
    Respond with the requested text only. \
    Do NOT use markdown formatting or code fences. \
    Do NOT include explanations, preambles or apologies.";

/// Instruction appended to every prompt that hands the model computed figures.
pub const FIGURES_INSTRUCTION: &str = "\
    CRITICAL: Use only the figures provided below, exactly as written. \
    Do NOT recompute, round differently, or invent statistics, market data or benchmarks. \
    If a figure is not provided, do not mention it.";

/// Fills `{name}` placeholders in a template. Unknown placeholders are left as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}
