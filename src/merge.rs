//! # Merge Policy
//!
//! Combines one cycle's provider results, the host's calendar screening
//! counts, and the previously persisted record into the month's
//! authoritative [`MonthlyFunnelRecord`].
//!
//! | metric                  | source                                            |
//! |-------------------------|---------------------------------------------------|
//! | outreach, responses     | CRM result if present, else prior                  |
//! | screens                 | per role `max(ats, calendar, prior)`, never summed |
//! | finals, offers, hires   | ATS result if present, else prior                  |
//!
//! The function is pure: the same inputs always produce the same record, and
//! feeding its output back in as `prior` with unchanged provider data yields
//! an identical record.

use std::collections::BTreeSet;

use crate::providers::{OutreachCounts, PipelineCounts};
use crate::record::{join_sources, split_label, Metric, MonthlyFunnelRecord, RoleCounts, Source};

pub fn merge(
    prior: &MonthlyFunnelRecord,
    crm: Option<&OutreachCounts>,
    ats: Option<&PipelineCounts>,
    calendar: &RoleCounts,
) -> MonthlyFunnelRecord {
    let mut merged = MonthlyFunnelRecord::default();

    let crm_metrics = crm.map(|c| [(Metric::Outreach, &c.outreach), (Metric::Responses, &c.responses)]);
    replace_or_keep(
        &mut merged,
        prior,
        Source::Crm,
        &[Metric::Outreach, Metric::Responses],
        crm_metrics.as_ref().map(|m| &m[..]),
    );

    let ats_metrics = ats.map(|a| {
        [
            (Metric::Finals, &a.finals),
            (Metric::Offers, &a.offers),
            (Metric::Hires, &a.hires),
        ]
    });
    replace_or_keep(
        &mut merged,
        prior,
        Source::Ats,
        &[Metric::Finals, Metric::Offers, Metric::Hires],
        ats_metrics.as_ref().map(|m| &m[..]),
    );

    merge_screens(&mut merged, prior, ats.map(|a| &a.screens), calendar);
    merged
}

/// Wholesale replacement per metric when the source answered this cycle;
/// otherwise the prior value and its label carry over untouched.
fn replace_or_keep(
    merged: &mut MonthlyFunnelRecord,
    prior: &MonthlyFunnelRecord,
    source: Source,
    metrics: &[Metric],
    fresh: Option<&[(Metric, &RoleCounts)]>,
) {
    match fresh {
        Some(fresh) => {
            for (metric, counts) in fresh {
                *merged.counts_mut(*metric) = (*counts).clone();
                if counts.values().any(|&n| n > 0) {
                    merged.provenance.insert(*metric, source.label().to_string());
                }
            }
        }
        None => {
            for metric in metrics {
                *merged.counts_mut(*metric) = prior.counts(*metric).clone();
                if let Some(label) = prior.provenance.get(metric) {
                    merged.provenance.insert(*metric, label.clone());
                }
            }
        }
    }
}

fn merge_screens(
    merged: &mut MonthlyFunnelRecord,
    prior: &MonthlyFunnelRecord,
    ats: Option<&RoleCounts>,
    calendar: &RoleCounts,
) {
    let prior_screens = &prior.screens;
    let prior_sources = split_label(prior.provenance.get(&Metric::Screens).map(String::as_str).unwrap_or(""));

    let roles: BTreeSet<&String> = prior_screens
        .keys()
        .chain(calendar.keys())
        .chain(ats.into_iter().flat_map(|a| a.keys()))
        .collect();

    let mut contributors = BTreeSet::new();
    for role in roles {
        let from_ats = ats.and_then(|a| a.get(role)).copied().unwrap_or(0);
        let from_calendar = calendar.get(role).copied().unwrap_or(0);
        let from_prior = prior_screens.get(role).copied().unwrap_or(0);
        let best = from_ats.max(from_calendar).max(from_prior);

        if best > 0 {
            if from_ats == best {
                contributors.insert(Source::Ats);
            }
            if from_calendar == best {
                contributors.insert(Source::Calendar);
            }
            if from_prior == best {
                contributors.extend(prior_sources.iter().copied());
            }
        }
        merged.screens.insert(role.clone(), best);
    }

    if !contributors.is_empty() {
        merged.provenance.insert(Metric::Screens, join_sources(&contributors));
    }
}
