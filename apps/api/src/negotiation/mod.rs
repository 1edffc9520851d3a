// Salary negotiation
// Implements: the salary form, its submit action, letter drafting, and the form HTTP handlers.
// All LLM calls go through llm_client via LetterDrafter; nothing here retries.

pub mod action;
pub mod form;
pub mod handlers;
pub mod letter;
pub mod prompts;

pub use action::NegotiationAction;
pub use form::{salary_rules, SalaryForm};
pub use letter::{LetterDrafter, LlmLetterDrafter};
