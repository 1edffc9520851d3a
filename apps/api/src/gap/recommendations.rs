//! Recommendation feed: turns a `GapResult` into ordered talking points for the
//! letter drafter and the presentation layer.
//!
//! The feed is deterministic: same `GapResult` in, same recommendations out.

use serde::{Deserialize, Serialize};

use crate::gap::engine::GapResult;
use crate::gap::severity::Severity;

/// Extra ask on top of restoring purchasing power, as a fraction of the adjusted salary.
const MERIT_BUFFER: f64 = 0.03;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    RestorePurchasingPower,
    NegotiationTarget,
    InflationTalkingPoint,
    ReviewCadence,
    KeptPace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub headline: String,
    pub detail: String,
    /// Annual salary the recommendation asks for, when it asks for one.
    pub target_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationFeed {
    pub severity: Severity,
    pub summary: String,
    pub items: Vec<Recommendation>,
}

impl RecommendationFeed {
    /// The highest concrete salary ask in the feed, if any.
    pub fn target_salary(&self) -> Option<f64> {
        self.items
            .iter()
            .filter_map(|r| r.target_amount)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Feed construction
// ────────────────────────────────────────────────────────────────────────────

pub fn build_recommendations(gap: &GapResult, current_salary: f64) -> RecommendationFeed {
    let mut items = Vec::new();

    if gap.is_shortfall() {
        let restore = round_to_hundred(gap.adjusted_salary);
        items.push(Recommendation {
            kind: RecommendationKind::RestorePurchasingPower,
            headline: format!(
                "Ask for at least {} to restore purchasing power",
                format_currency(restore)
            ),
            detail: format!(
                "Your pay is {} ({:.1}%) behind where inflation alone would have put it.",
                format_currency(gap.dollar_gap.abs()),
                gap.percentage_gap.abs()
            ),
            target_amount: Some(restore),
        });

        let target = round_to_hundred(gap.adjusted_salary * (1.0 + MERIT_BUFFER));
        let raise_pct = (target / current_salary - 1.0) * 100.0;
        items.push(Recommendation {
            kind: RecommendationKind::NegotiationTarget,
            headline: format!("Open the conversation at {}", format_currency(target)),
            detail: format!(
                "That is a {raise_pct:.1}% raise: inflation catch-up plus a {:.0}% merit component.",
                MERIT_BUFFER * 100.0
            ),
            target_amount: Some(target),
        });
    } else {
        items.push(Recommendation {
            kind: RecommendationKind::KeptPace,
            headline: "Your salary has kept pace with inflation".to_string(),
            detail: format!(
                "You are {} ({:.1}%) ahead of the inflation-adjusted baseline; frame any ask around performance.",
                format_currency(gap.dollar_gap),
                gap.percentage_gap
            ),
            target_amount: None,
        });
    }

    items.push(Recommendation {
        kind: RecommendationKind::InflationTalkingPoint,
        headline: format!(
            "Prices rose {:.1}% over {:.1} years",
            gap.inflation_rate, gap.years_elapsed
        ),
        detail: format!(
            "That is roughly {:.1}% per year (index {:.1} → {:.1}).",
            gap.annualized_inflation_rate, gap.historical_index, gap.current_index
        ),
        target_amount: None,
    });

    if gap.is_shortfall() && gap.severity >= Severity::Significant {
        items.push(Recommendation {
            kind: RecommendationKind::ReviewCadence,
            headline: "Ask for a scheduled cost-of-living review".to_string(),
            detail: "A gap this large builds up when pay is not revisited; request an annual adjustment tied to inflation.".to_string(),
            target_amount: None,
        });
    }

    RecommendationFeed {
        severity: gap.severity,
        summary: build_summary(gap),
        items,
    }
}

fn build_summary(gap: &GapResult) -> String {
    if !gap.is_shortfall() {
        return format!(
            "No purchasing-power loss. You are {:.1}% ahead of inflation.",
            gap.percentage_gap
        );
    }
    match gap.severity {
        Severity::Minimal => format!(
            "Minimal gap ({:.1}%). Inflation has only slightly outpaced your pay.",
            gap.percentage_gap.abs()
        ),
        Severity::Moderate => format!(
            "Moderate gap ({:.1}%). A catch-up adjustment is reasonable to request.",
            gap.percentage_gap.abs()
        ),
        Severity::Significant => format!(
            "Significant gap ({:.1}%). You have lost {} of real annual pay.",
            gap.percentage_gap.abs(),
            format_currency(gap.dollar_gap.abs())
        ),
        Severity::Severe => format!(
            "Severe gap ({:.1}%). Your real pay has fallen by {}; treat this as a priority conversation.",
            gap.percentage_gap.abs(),
            format_currency(gap.dollar_gap.abs())
        ),
    }
}

// Rounds up, ignoring float noise below a cent.
fn round_to_hundred(amount: f64) -> f64 {
    ((amount - 0.005) / 100.0).ceil() * 100.0
}

/// `$88,000` style formatting, whole dollars.
pub fn format_currency(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
