//! The salary negotiation form and its validation rules.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::form::validation::{email_shape, max_length, positive_amount, required_text, RuleSet};
use crate::gap::SalaryObservation;

const MAX_NAME_LEN: usize = 120;
const MAX_EMPLOYER_LEN: usize = 200;

/// Register of the drafted letter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterTone {
    #[default]
    Collaborative,
    Direct,
    Formal,
}

impl LetterTone {
    pub fn describe(&self) -> &'static str {
        match self {
            LetterTone::Collaborative => "warm and collaborative, framing the raise as a shared goal",
            LetterTone::Direct => "confident and direct, leading with the numbers",
            LetterTone::Formal => "formal and concise, suitable for HR or a written review",
        }
    }
}

/// Every field defaults, so snapshots written by an older shape of the form
/// still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SalaryForm {
    pub full_name: String,
    pub email: String,
    pub job_title: String,
    pub employer: String,
    pub historical_salary: Option<f64>,
    pub historical_date: Option<NaiveDate>,
    pub current_salary: Option<f64>,
    pub current_date: Option<NaiveDate>,
    pub tone: LetterTone,
}

impl SalaryForm {
    /// The two salary observations, once both amounts and dates are filled in.
    pub fn observations(&self) -> Option<(SalaryObservation, SalaryObservation)> {
        Some((
            SalaryObservation {
                amount: self.historical_salary?,
                as_of: self.historical_date?,
            },
            SalaryObservation {
                amount: self.current_salary?,
                as_of: self.current_date?,
            },
        ))
    }
}

fn required_date(value: Option<NaiveDate>, label: &str) -> Option<String> {
    match value {
        None => Some(format!("{label} is required")),
        Some(date) if date > Utc::now().date_naive() => {
            Some(format!("{label} cannot be in the future"))
        }
        Some(_) => None,
    }
}

pub fn salary_rules() -> RuleSet<SalaryForm> {
    RuleSet::new()
        .rule("full_name", |f: &SalaryForm| required_text(&f.full_name, "Full name"))
        .rule("full_name", |f: &SalaryForm| {
            max_length(&f.full_name, MAX_NAME_LEN, "Full name")
        })
        .rule("email", |f: &SalaryForm| required_text(&f.email, "Email"))
        .rule("email", |f: &SalaryForm| email_shape(&f.email))
        .rule("job_title", |f: &SalaryForm| required_text(&f.job_title, "Job title"))
        .rule("employer", |f: &SalaryForm| {
            max_length(&f.employer, MAX_EMPLOYER_LEN, "Employer")
        })
        .rule("historical_salary", |f: &SalaryForm| {
            positive_amount(f.historical_salary, "Previous salary")
        })
        .rule("historical_date", |f: &SalaryForm| {
            required_date(f.historical_date, "Previous salary date")
        })
        .rule("current_salary", |f: &SalaryForm| {
            positive_amount(f.current_salary, "Current salary")
        })
        .rule("current_date", |f: &SalaryForm| {
            required_date(f.current_date, "Current salary date")
        })
        .rule("current_date", |f: &SalaryForm| match (f.historical_date, f.current_date) {
            (Some(historical), Some(current)) if current < historical => {
                Some("Current salary date must be on or after the previous salary date".to_string())
            }
            _ => None,
        })
}
