//! Derived aggregates: burn rate and spending inequality.
//!
//! Runs after every intended load of a batch has finished. Reads a snapshot
//! of the fact/dimension tables and replaces both derived views in full;
//! there is no incremental path.
//!
//! Burn rate uses exactly one income-flagged and one consumption-flagged
//! fact per segment. It never sums facts: item rows and summary rows
//! coexist in the source, so a sum double-counts.

use crate::{
    config::{BurnRateBands, ValidatedConfig},
    error::{EtlError, EtlResult},
    store::{StoredFact, SurveyStore},
    types::{MetricFlag, SegmentId},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnRateStatus {
    Deficit,
    Breakeven,
    LowSaving,
    HealthySaving,
}

impl BurnRateStatus {
    pub fn from_pct(pct: Decimal, bands: &BurnRateBands) -> Self {
        if pct <= bands.healthy_saving_max {
            BurnRateStatus::HealthySaving
        } else if pct <= bands.low_saving_max {
            BurnRateStatus::LowSaving
        } else if pct <= bands.breakeven_max {
            BurnRateStatus::Breakeven
        } else {
            BurnRateStatus::Deficit
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BurnRateStatus::Deficit => "deficit",
            BurnRateStatus::Breakeven => "breakeven",
            BurnRateStatus::LowSaving => "low_saving",
            BurnRateStatus::HealthySaving => "healthy_saving",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deficit" => Some(BurnRateStatus::Deficit),
            "breakeven" => Some(BurnRateStatus::Breakeven),
            "low_saving" => Some(BurnRateStatus::LowSaving),
            "healthy_saving" => Some(BurnRateStatus::HealthySaving),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRateAggregate {
    pub segment_type: String,
    pub segment_value: String,
    pub income: Decimal,
    pub spending: Decimal,
    pub burn_rate_pct: Decimal,
    pub surplus_deficit: Decimal,
    pub status: BurnRateStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InequalityAggregate {
    pub segment_type: String,
    pub item_name: String,
    pub high_segment: String,
    pub high_spend: Decimal,
    pub low_segment: String,
    pub low_spend: Decimal,
    pub inequality_ratio: Decimal,
    pub avg_spend: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMetric {
    Income,
    Consumption,
}

impl AggregateMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateMetric::Income => "income",
            AggregateMetric::Consumption => "consumption",
        }
    }

    fn flag(self) -> MetricFlag {
        match self {
            AggregateMetric::Income => MetricFlag::Income,
            AggregateMetric::Consumption => MetricFlag::Consumption,
        }
    }
}

/// A segment left out of the burn-rate view, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub segment_type: String,
    pub segment_value: String,
    pub metric: AggregateMetric,
    /// Number of flagged rows found; 1 when the pair exists but its values
    /// are unusable (zero income, out of range).
    pub found: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateReport {
    pub burn_rate: Vec<BurnRateAggregate>,
    pub inequality: Vec<InequalityAggregate>,
    pub warnings: Vec<DataQualityWarning>,
    pub segments_considered: usize,
    pub segments_excluded: usize,
    pub items_excluded: usize,
    pub undefined_ratios: usize,
}

// ── Single-row metric lookup ─────────────────────────────────────────────────

/// The one value flagged as `metric` for a segment. Zero or several flagged
/// rows is an `AmbiguousAggregate` error, never a sum.
pub fn single_flagged(
    segment_id: SegmentId,
    facts: &[&StoredFact],
    metric: AggregateMetric,
) -> EtlResult<Decimal> {
    let flagged: Vec<&&StoredFact> = facts.iter().filter(|f| f.flag == metric.flag()).collect();
    match flagged.as_slice() {
        [only] => Ok(only.value),
        rows => Err(EtlError::AmbiguousAggregate {
            segment_id,
            metric: metric.as_str(),
            found: rows.len(),
        }),
    }
}

// ── Computation ──────────────────────────────────────────────────────────────

pub fn compute(facts: &[StoredFact], config: &ValidatedConfig) -> AggregateReport {
    let mut report = AggregateReport::default();
    compute_burn_rate(facts, config, &mut report);
    compute_inequality(facts, config, &mut report);
    report
}

fn compute_burn_rate(facts: &[StoredFact], config: &ValidatedConfig, report: &mut AggregateReport) {
    let mut by_segment: BTreeMap<SegmentId, Vec<&StoredFact>> = BTreeMap::new();
    for fact in facts {
        by_segment.entry(fact.segment_id).or_default().push(fact);
    }
    report.segments_considered = by_segment.len();

    let hundred = Decimal::ONE_HUNDRED;
    for (segment_id, rows) in &by_segment {
        let first = rows[0];
        let warn = |metric: AggregateMetric, found: usize, reason: String| DataQualityWarning {
            segment_type: first.segment_type.clone(),
            segment_value: first.segment_value.clone(),
            metric,
            found,
            reason,
        };

        let income = single_flagged(*segment_id, rows, AggregateMetric::Income);
        let spending = single_flagged(*segment_id, rows, AggregateMetric::Consumption);
        let (income, spending) = match (income, spending) {
            (Ok(income), Ok(spending)) => (income, spending),
            (income, spending) => {
                for (metric, result) in [
                    (AggregateMetric::Income, income),
                    (AggregateMetric::Consumption, spending),
                ] {
                    if let Err(EtlError::AmbiguousAggregate { found, .. }) = result {
                        let reason =
                            format!("expected exactly one {} row, found {found}", metric.as_str());
                        report.warnings.push(warn(metric, found, reason));
                    }
                }
                continue;
            }
        };

        if income.is_zero() {
            report
                .warnings
                .push(warn(AggregateMetric::Income, 1, "income is zero".to_string()));
            continue;
        }

        let computed = spending
            .checked_div(income)
            .and_then(|ratio| ratio.checked_mul(hundred))
            .zip(income.checked_sub(spending));
        let Some((pct, surplus_deficit)) = computed else {
            report.warnings.push(warn(
                AggregateMetric::Consumption,
                1,
                format!("burn rate of {spending} over {income} is out of decimal range"),
            ));
            continue;
        };

        let burn_rate_pct = pct.round_dp(2);
        report.burn_rate.push(BurnRateAggregate {
            segment_type: first.segment_type.clone(),
            segment_value: first.segment_value.clone(),
            income,
            spending,
            burn_rate_pct,
            surplus_deficit,
            status: BurnRateStatus::from_pct(burn_rate_pct, &config.aggregation.burn_rate_bands),
        });
    }

    report.segments_excluded = report.segments_considered - report.burn_rate.len();
    for w in &report.warnings {
        log::warn!(
            "aggregate: segment {}/{} excluded from burn rate: {}",
            w.segment_type,
            w.segment_value,
            w.reason
        );
    }
}

fn compute_inequality(facts: &[StoredFact], config: &ValidatedConfig, report: &mut AggregateReport) {
    let mut groups: BTreeMap<(&str, &str), Vec<&StoredFact>> = BTreeMap::new();
    let mut excluded_items = std::collections::BTreeSet::new();

    for fact in facts {
        if fact.flag != MetricFlag::Neither || config.is_excluded_item(&fact.item_name) {
            excluded_items.insert((fact.segment_type.as_str(), fact.item_name.as_str()));
            continue;
        }
        if config.is_summary_segment(&fact.segment_value) {
            continue;
        }
        groups
            .entry((fact.segment_type.as_str(), fact.item_name.as_str()))
            .or_default()
            .push(fact);
    }
    report.items_excluded = excluded_items.len();

    for ((segment_type, item_name), rows) in groups {
        if rows.len() < 2 {
            continue;
        }
        let ordered: Vec<&StoredFact> = rows.iter().copied().filter(|f| f.segment_order.is_some()).collect();

        let (high, low) = if ordered.len() >= 2 {
            (
                ordered.iter().max_by_key(|f| f.segment_order),
                ordered.iter().min_by_key(|f| f.segment_order),
            )
        } else {
            (
                rows.iter().max_by(|a, b| a.value.cmp(&b.value)),
                rows.iter().min_by(|a, b| a.value.cmp(&b.value)),
            )
        };
        let (Some(high), Some(low)) = (high, low) else { continue };

        if low.value.is_zero() {
            report.undefined_ratios += 1;
            log::debug!("aggregate: {segment_type}/{item_name} has zero low spend, ratio undefined");
            continue;
        }

        // The mean covers every non-summary segment, ordered or not.
        let avg_spend = rows
            .iter()
            .try_fold(Decimal::ZERO, |acc, f| acc.checked_add(f.value))
            .and_then(|total| total.checked_div(Decimal::from(rows.len())));
        let ratio = high.value.checked_div(low.value);
        let (Some(avg_spend), Some(ratio)) = (avg_spend, ratio) else {
            report.undefined_ratios += 1;
            log::warn!("aggregate: {segment_type}/{item_name} is out of decimal range, ratio undefined");
            continue;
        };

        report.inequality.push(InequalityAggregate {
            segment_type: segment_type.to_string(),
            item_name: item_name.to_string(),
            high_segment: high.segment_value.clone(),
            high_spend: high.value,
            low_segment: low.segment_value.clone(),
            low_spend: low.value,
            inequality_ratio: ratio.round_dp(2),
            avg_spend: avg_spend.round_dp(2),
        });
    }
}

/// Recompute both views from the store and replace them in one transaction.
pub fn refresh(store: &SurveyStore, config: &ValidatedConfig) -> EtlResult<AggregateReport> {
    let facts = store.all_facts()?;
    let report = compute(&facts, config);

    store.in_transaction(|s| {
        s.replace_burn_rate(&report.burn_rate)?;
        s.replace_inequality(&report.inequality)?;
        s.insert_aggregate_refresh(&report)?;
        Ok(())
    })?;

    log::info!(
        "aggregate: {} burn-rate rows, {} inequality rows, {} of {} segments excluded",
        report.burn_rate.len(),
        report.inequality.len(),
        report.segments_excluded,
        report.segments_considered
    );
    Ok(report)
}
