//! # Funnel Calculator
//!
//! Pure inverse-funnel math. Given a monthly hire target and a chain of six
//! stage conversion rates, walk backward from hires to first-contact outreach,
//! rounding up at every stage: a candidate cannot be partially converted.
//!
//! ```text
//! outreach ─response─► responses ─interest─► interested ─screen─► screens
//!    ─pass_through─► finals ─offer─► offers ─accept─► hires
//! ```
//!
//! Nothing in this module performs I/O or reads the clock.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::error::{FunnelError, Result};
use crate::record::{Metric, MonthlyFunnelRecord};

/// Absorbs float noise such as `30.000000000000004` before rounding up.
const CEIL_EPSILON: f64 = 1e-9;

/// Floor applied to learned rates so a month with zero conversions never
/// produces an unusable (zero) rate.
pub const MIN_LEARNED_RATE: f64 = 0.001;

/// Working days per week assumed by [`weekly_breakdown`].
pub const WORK_DAYS_PER_WEEK: u32 = 5;

// ---------------------------------------------------------------------------
// ConversionRates
// ---------------------------------------------------------------------------

/// Conditional probability of advancing from each stage to the next.
/// Missing fields deserialize to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRates {
    /// outreach → response
    pub response_rate: f64,
    /// response → interested
    pub interest_rate: f64,
    /// interested → screen
    pub screen_rate: f64,
    /// screen → final round
    pub pass_through: f64,
    /// final round → offer
    pub offer_rate: f64,
    /// offer → hire
    pub accept_rate: f64,
}

impl Default for ConversionRates {
    fn default() -> Self {
        Self {
            response_rate: 0.15,
            interest_rate: 0.60,
            screen_rate: 0.80,
            pass_through: 0.25,
            offer_rate: 0.50,
            accept_rate: 0.80,
        }
    }
}

impl ConversionRates {
    fn stages(&self) -> [(&'static str, f64); 6] {
        [
            ("response_rate", self.response_rate),
            ("interest_rate", self.interest_rate),
            ("screen_rate", self.screen_rate),
            ("pass_through", self.pass_through),
            ("offer_rate", self.offer_rate),
            ("accept_rate", self.accept_rate),
        ]
    }

    /// Every rate must be finite and in (0, 1].
    pub fn validate(&self) -> Result<()> {
        for (stage, value) in self.stages() {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                return Err(FunnelError::InvalidRate { stage, value });
            }
        }
        Ok(())
    }

    /// Overall outreach → hire probability.
    pub fn efficiency(&self) -> f64 {
        self.stages().iter().map(|(_, r)| r).product()
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A recruiting target. `name` is the join key used by every provider mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub monthly_hire_target: u32,
    #[serde(default)]
    pub rates: ConversionRates,
    #[serde(default)]
    pub search_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_rates: Option<ConversionRates>,
}

impl Role {
    pub fn new(name: impl Into<String>, monthly_hire_target: u32) -> Self {
        Self {
            name: name.into(),
            monthly_hire_target: monthly_hire_target.max(1),
            rates: ConversionRates::default(),
            search_terms: Vec::new(),
            learned_rates: None,
        }
    }

    pub fn with_rates(mut self, rates: ConversionRates) -> Self {
        self.rates = rates;
        self
    }

    /// Learned rates win over configured ones once they exist.
    pub fn effective_rates(&self) -> ConversionRates {
        self.learned_rates.unwrap_or(self.rates)
    }
}

// ---------------------------------------------------------------------------
// Inverse funnel
// ---------------------------------------------------------------------------

/// Stage counts needed to land `hires`. Each count is >= the next stage's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelRequirement {
    pub hires: u32,
    pub offers: u32,
    pub finals: u32,
    pub screens: u32,
    pub interested: u32,
    pub responses: u32,
    pub outreach: u32,
}

fn ceil_div(count: u32, rate: f64) -> u32 {
    let raw = (f64::from(count) / rate - CEIL_EPSILON).ceil();
    raw.max(f64::from(count)) as u32
}

/// Walk backward from `hire_target` to the outreach volume that produces it.
///
/// # Errors
/// [`FunnelError::InvalidRate`] when any rate is outside (0, 1].
pub fn required_outreach(hire_target: u32, rates: &ConversionRates) -> Result<FunnelRequirement> {
    rates.validate()?;
    let hires = hire_target;
    let offers = ceil_div(hires, rates.accept_rate);
    let finals = ceil_div(offers, rates.offer_rate);
    let screens = ceil_div(finals, rates.pass_through);
    let interested = ceil_div(screens, rates.screen_rate);
    let responses = ceil_div(interested, rates.interest_rate);
    let outreach = ceil_div(responses, rates.response_rate);
    Ok(FunnelRequirement {
        hires,
        offers,
        finals,
        screens,
        interested,
        responses,
        outreach,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBreakdown {
    pub monthly: u32,
    pub weekly: u32,
    pub daily: u32,
}

/// Spread a monthly outreach volume over weeks and five-day working weeks.
/// A `weeks_in_month` of 0 is treated as 1.
pub fn weekly_breakdown(monthly_outreach: u32, weeks_in_month: u32) -> WeeklyBreakdown {
    let weekly = monthly_outreach.div_ceil(weeks_in_month.max(1));
    let daily = weekly.div_ceil(WORK_DAYS_PER_WEEK);
    WeeklyBreakdown {
        monthly: monthly_outreach,
        weekly,
        daily,
    }
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDistribution {
    pub name: String,
    pub efficiency: f64,
    pub weighted_score: f64,
    /// Independently rounded; the sum across roles may drift from 100 by one or two.
    pub distribution_percent: u32,
}

/// Relative share of outreach effort per role, weighted by each role's
/// overall conversion efficiency and hire target. Never fails.
pub fn outreach_distribution(roles: &[Role]) -> Vec<RoleDistribution> {
    let scored: Vec<(String, f64, f64)> = roles
        .iter()
        .map(|role| {
            let efficiency = role.effective_rates().efficiency();
            let weighted = efficiency * f64::from(role.monthly_hire_target);
            let weighted = if weighted.is_finite() && weighted > 0.0 { weighted } else { 0.0 };
            (role.name.clone(), efficiency, weighted)
        })
        .collect();

    let total: f64 = scored.iter().map(|(_, _, w)| w).sum();

    scored
        .into_iter()
        .map(|(name, efficiency, weighted_score)| {
            let distribution_percent = if total > 0.0 {
                (100.0 * weighted_score / total).round() as u32
            } else {
                0
            };
            RoleDistribution {
                name,
                efficiency,
                weighted_score,
                distribution_percent,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pace and learned rates
// ---------------------------------------------------------------------------

/// What is left of a monthly target and the pace needed to close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthPace {
    pub remaining: u32,
    pub work_days_left: u32,
    pub per_work_day: u32,
}

/// Remaining volume for the month and the per-work-day pace from `today`
/// (inclusive). With no work days left the whole remainder is due today.
pub fn month_pace(target: u32, done: u32, today: NaiveDate) -> MonthPace {
    let remaining = target.saturating_sub(done);
    let work_days_left = calendar::work_days_remaining_in_month(today);
    let per_work_day = if work_days_left == 0 {
        remaining
    } else {
        remaining.div_ceil(work_days_left)
    };
    MonthPace {
        remaining,
        work_days_left,
        per_work_day,
    }
}

fn observed(numerator: u32, denominator: u32, min_sample: u32) -> Option<f64> {
    if denominator == 0 || denominator < min_sample {
        return None;
    }
    Some((f64::from(numerator) / f64::from(denominator)).clamp(MIN_LEARNED_RATE, 1.0))
}

/// Derive conversion rates for `role` from past monthly records.
///
/// Stages whose denominator across `history` is below `min_sample` keep the
/// value from `base`. Records carry no "interested" count, so the observed
/// responses → screens ratio is folded into `screen_rate` using
/// `base.interest_rate`. Returns `None` when no stage had enough data.
pub fn learn_rates(
    history: &[MonthlyFunnelRecord],
    role: &str,
    base: &ConversionRates,
    min_sample: u32,
) -> Option<ConversionRates> {
    let sum = |metric: Metric| -> u32 {
        history
            .iter()
            .map(|r| r.counts(metric).get(role).copied().unwrap_or(0))
            .sum()
    };
    let outreach = sum(Metric::Outreach);
    let responses = sum(Metric::Responses);
    let screens = sum(Metric::Screens);
    let finals = sum(Metric::Finals);
    let offers = sum(Metric::Offers);
    let hires = sum(Metric::Hires);

    let mut learned = *base;
    let mut touched = false;

    if let Some(rate) = observed(responses, outreach, min_sample) {
        learned.response_rate = rate;
        touched = true;
    }
    if let Some(combined) = observed(screens, responses, min_sample) {
        learned.screen_rate = (combined / base.interest_rate).clamp(MIN_LEARNED_RATE, 1.0);
        touched = true;
    }
    if let Some(rate) = observed(finals, screens, min_sample) {
        learned.pass_through = rate;
        touched = true;
    }
    if let Some(rate) = observed(offers, finals, min_sample) {
        learned.offer_rate = rate;
        touched = true;
    }
    if let Some(rate) = observed(hires, offers, min_sample) {
        learned.accept_rate = rate;
        touched = true;
    }

    touched.then_some(learned)
}
