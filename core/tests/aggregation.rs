//! Aggregator tests: burn rate precondition, inequality exclusion, refresh.

use rust_decimal::Decimal;
use std::str::FromStr;
use survey_core::{
    aggregator::{self, single_flagged, AggregateMetric, BurnRateStatus},
    config::{PipelineConfig, ValidatedConfig, ValidatedFile},
    error::EtlError,
    extractor::extract,
    loader::{load, LoadMode},
    normalizer::{normalize, FactTuple},
    sheet::RawSheet,
    store::SurveyStore,
    types::MetricFlag,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn store() -> SurveyStore {
    let store = SurveyStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn config() -> ValidatedConfig {
    PipelineConfig::default_test().validate().unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn put(
    store: &SurveyStore,
    segment_type: &str,
    segment: &str,
    order: Option<i64>,
    item: &str,
    value: &str,
    flag: MetricFlag,
) {
    let id = store.upsert_segment(segment_type, segment, order, "test.csv").unwrap();
    store
        .insert_fact(
            id,
            &FactTuple {
                item_name: item.into(),
                segment_value: segment.into(),
                value: dec(value),
                flag,
            },
        )
        .unwrap();
}

const INCOME: &str = "Net money income per household";
const SPEND: &str = "Total consumption expenditure";

// ── Burn rate ────────────────────────────────────────────────────────────────

#[test]
fn burn_rate_uses_the_flagged_pair_only() {
    let store = store();
    put(&store, "Income Quintile", "1", Some(1), INCOME, "7510", MetricFlag::Income);
    put(&store, "Income Quintile", "1", Some(1), SPEND, "10979", MetricFlag::Consumption);
    put(&store, "Income Quintile", "1", Some(1), "Food", "2600", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    assert_eq!(report.burn_rate.len(), 1);

    let row = &report.burn_rate[0];
    assert_eq!(row.income, dec("7510"));
    assert_eq!(row.spending, dec("10979"));
    assert_eq!(row.surplus_deficit, dec("-3469"));
    assert_eq!(row.burn_rate_pct.round_dp(1), dec("146.2"));
    assert_eq!(row.status, BurnRateStatus::Deficit);
    assert!(report.warnings.is_empty());
}

#[test]
fn segments_without_exactly_one_flagged_pair_are_excluded_with_warnings() {
    let store = store();
    // Two income rows.
    put(&store, "Region", "North", None, INCOME, "9000", MetricFlag::Income);
    put(&store, "Region", "North", None, "Gross money income", "11000", MetricFlag::Income);
    put(&store, "Region", "North", None, SPEND, "8000", MetricFlag::Consumption);
    // No consumption row.
    put(&store, "Region", "South", None, INCOME, "8000", MetricFlag::Income);
    put(&store, "Region", "South", None, "Food", "2000", MetricFlag::Neither);
    // Healthy segment.
    put(&store, "Region", "Center", None, INCOME, "20000", MetricFlag::Income);
    put(&store, "Region", "Center", None, SPEND, "14000", MetricFlag::Consumption);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());

    let included: Vec<_> = report.burn_rate.iter().map(|r| r.segment_value.as_str()).collect();
    assert_eq!(included, ["Center"]);
    assert_eq!(report.segments_considered, 3);
    assert_eq!(report.segments_excluded, 2);

    let north = report.warnings.iter().find(|w| w.segment_value == "North").unwrap();
    assert_eq!(north.metric, AggregateMetric::Income);
    assert_eq!(north.found, 2);
    let south = report.warnings.iter().find(|w| w.segment_value == "South").unwrap();
    assert_eq!(south.metric, AggregateMetric::Consumption);
    assert_eq!(south.found, 0);
}

#[test]
fn single_flagged_refuses_to_sum() {
    let store = store();
    put(&store, "Region", "North", None, INCOME, "9000", MetricFlag::Income);
    put(&store, "Region", "North", None, "Gross money income", "11000", MetricFlag::Income);
    let facts = store.all_facts().unwrap();
    let refs: Vec<_> = facts.iter().collect();

    match single_flagged(facts[0].segment_id, &refs, AggregateMetric::Income) {
        Err(EtlError::AmbiguousAggregate { found, metric, .. }) => {
            assert_eq!(found, 2);
            assert_eq!(metric, "income");
        }
        other => panic!("expected ambiguous aggregate, got {other:?}"),
    }
}

#[test]
fn burn_rate_status_bands() {
    let bands = PipelineConfig::default_test().aggregation.burn_rate_bands;
    assert_eq!(BurnRateStatus::from_pct(dec("146.19"), &bands), BurnRateStatus::Deficit);
    assert_eq!(BurnRateStatus::from_pct(dec("98"), &bands), BurnRateStatus::Breakeven);
    assert_eq!(BurnRateStatus::from_pct(dec("90"), &bands), BurnRateStatus::LowSaving);
    assert_eq!(BurnRateStatus::from_pct(dec("70"), &bands), BurnRateStatus::HealthySaving);
}

#[test]
fn zero_income_is_excluded_not_divided() {
    let store = store();
    put(&store, "Region", "North", None, INCOME, "0", MetricFlag::Income);
    put(&store, "Region", "North", None, SPEND, "100", MetricFlag::Consumption);
    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    assert!(report.burn_rate.is_empty());
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn burn_rate_out_of_decimal_range_excludes_only_that_segment() {
    let store = store();
    put(&store, "Region", "North", None, INCOME, "0.0001", MetricFlag::Income);
    put(&store, "Region", "North", None, SPEND, "79228162514264337593543950", MetricFlag::Consumption);
    put(&store, "Region", "Center", None, INCOME, "20000", MetricFlag::Income);
    put(&store, "Region", "Center", None, SPEND, "14000", MetricFlag::Consumption);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());

    let included: Vec<_> = report.burn_rate.iter().map(|r| r.segment_value.as_str()).collect();
    assert_eq!(included, ["Center"]);
    assert_eq!(report.segments_excluded, 1);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].segment_value, "North");
}

#[test]
fn repeated_income_rows_never_reach_the_burn_rate_view() {
    let store = store();
    let file = ValidatedFile::compile(&PipelineConfig::default_test().files[0]).unwrap();
    let header: &[&str] = &["", "5", "1"];

    // Same name twice: the file is rejected before anything is loaded.
    let repeated = RawSheet::from_text_rows(&[
        &["title"],
        &[""],
        header,
        &[INCOME, "25000", "7510"],
        &[INCOME, "99999", "1"],
        &[SPEND, "19500", "10979"],
    ]);
    let table = extract(&repeated, &file).unwrap();
    assert!(matches!(normalize(&table, &file), Err(EtlError::LoadIntegrity { .. })));

    // Two differently named income rows both load, and the aggregate
    // refuses to pick one.
    let variants = RawSheet::from_text_rows(&[
        &["title"],
        &[""],
        header,
        &[INCOME, "25000", "7510"],
        &["Net money income per household, incl. imputed rent", "27000", "8100"],
        &[SPEND, "19500", "10979"],
    ]);
    let table = extract(&variants, &file).unwrap();
    let batch = normalize(&table, &file).unwrap();
    load(&store, &batch, LoadMode::SkipExisting).unwrap();

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    assert!(report.burn_rate.is_empty());
    assert_eq!(report.warnings.len(), 2);
    assert!(report
        .warnings
        .iter()
        .all(|w| w.metric == AggregateMetric::Income && w.found == 2));
}

// ── Inequality ───────────────────────────────────────────────────────────────

#[test]
fn travel_abroad_ratio_uses_segment_order() {
    let store = store();
    put(&store, "Income Quintile", "Q5", Some(5), "Travel abroad", "2499", MetricFlag::Neither);
    put(&store, "Income Quintile", "Q1", Some(1), "Travel abroad", "95.6", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    let row = report
        .inequality
        .iter()
        .find(|r| r.item_name == "Travel abroad")
        .expect("travel abroad must be in the view");
    assert_eq!(row.high_segment, "Q5");
    assert_eq!(row.low_segment, "Q1");
    assert_eq!(row.inequality_ratio.round_dp(1), dec("26.1"));
    assert_eq!(row.avg_spend, dec("1297.3"));
}

#[test]
fn national_insurance_never_appears_in_the_inequality_view() {
    let store = store();
    put(&store, "Income Quintile", "5", Some(5), "National Insurance payments", "4000", MetricFlag::Neither);
    put(&store, "Income Quintile", "1", Some(1), "National Insurance payments", "10", MetricFlag::Neither);
    put(&store, "Income Quintile", "5", Some(5), "Income tax", "6000", MetricFlag::Neither);
    put(&store, "Income Quintile", "1", Some(1), "Income tax", "5", MetricFlag::Neither);
    put(&store, "Income Quintile", "5", Some(5), "Bread", "90", MetricFlag::Neither);
    put(&store, "Income Quintile", "1", Some(1), "Bread", "60", MetricFlag::Neither);

    let config = config();
    let report = aggregator::compute(&store.all_facts().unwrap(), &config);
    let items: Vec<_> = report.inequality.iter().map(|r| r.item_name.as_str()).collect();
    assert_eq!(items, ["Bread"]);
    assert!(report.inequality.iter().all(|r| !config.is_excluded_item(&r.item_name)));
    assert_eq!(report.items_excluded, 2);
}

#[test]
fn flagged_rows_and_summary_segments_stay_out_of_inequality() {
    let store = store();
    put(&store, "Region", "North", None, SPEND, "9000", MetricFlag::Consumption);
    put(&store, "Region", "South", None, SPEND, "7000", MetricFlag::Consumption);
    put(&store, "Region", "North", None, "Bread", "50", MetricFlag::Neither);
    put(&store, "Region", "Total", None, "Bread", "5", MetricFlag::Neither);
    put(&store, "Region", "South", None, "Bread", "40", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    assert_eq!(report.inequality.len(), 1);
    let bread = &report.inequality[0];
    assert_eq!(bread.item_name, "Bread");
    assert_eq!(bread.high_segment, "North");
    assert_eq!(bread.low_segment, "South", "Total must not be picked as the low segment");
    assert_eq!(bread.inequality_ratio, dec("1.25"));
}

#[test]
fn unordered_segments_fall_back_to_raw_values() {
    let store = store();
    put(&store, "Religiosity", "Secular", None, "Books", "120", MetricFlag::Neither);
    put(&store, "Religiosity", "Religious", None, "Books", "300", MetricFlag::Neither);
    put(&store, "Religiosity", "Traditional", None, "Books", "150", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    let books = &report.inequality[0];
    assert_eq!(books.high_segment, "Religious");
    assert_eq!(books.high_spend, dec("300"));
    assert_eq!(books.low_segment, "Secular");
    assert_eq!(books.inequality_ratio, dec("2.5"));
    assert_eq!(books.avg_spend, dec("190"));
}

#[test]
fn zero_low_spend_and_single_segment_items_are_left_out() {
    let store = store();
    put(&store, "Region", "North", None, "Yacht fuel", "300", MetricFlag::Neither);
    put(&store, "Region", "South", None, "Yacht fuel", "0", MetricFlag::Neither);
    put(&store, "Region", "North", None, "Ski passes", "80", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    assert!(report.inequality.is_empty());
    assert_eq!(report.undefined_ratios, 1);
}

#[test]
fn out_of_range_ratios_are_undefined_not_fatal() {
    let store = store();
    let max = Decimal::MAX.to_string();
    put(&store, "Region", "North", None, "Yachts", "79228162514264337593543950", MetricFlag::Neither);
    put(&store, "Region", "South", None, "Yachts", "0.0001", MetricFlag::Neither);
    // Ratio 1, but the sum for the mean overflows.
    put(&store, "Region", "North", None, "Jets", &max, MetricFlag::Neither);
    put(&store, "Region", "South", None, "Jets", &max, MetricFlag::Neither);
    put(&store, "Region", "North", None, "Bread", "50", MetricFlag::Neither);
    put(&store, "Region", "South", None, "Bread", "40", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    let items: Vec<_> = report.inequality.iter().map(|r| r.item_name.as_str()).collect();
    assert_eq!(items, ["Bread"]);
    assert_eq!(report.undefined_ratios, 2);
}

#[test]
fn average_covers_unordered_segments_too() {
    let store = store();
    put(&store, "Income Quintile", "5", Some(5), "Books", "300", MetricFlag::Neither);
    put(&store, "Income Quintile", "1", Some(1), "Books", "100", MetricFlag::Neither);
    put(&store, "Income Quintile", "Other", None, "Books", "500", MetricFlag::Neither);

    let report = aggregator::compute(&store.all_facts().unwrap(), &config());
    let books = &report.inequality[0];
    assert_eq!((books.high_segment.as_str(), books.low_segment.as_str()), ("5", "1"));
    assert_eq!(books.inequality_ratio, dec("3"));
    assert_eq!(books.avg_spend, dec("300"));
}

// ── Refresh ──────────────────────────────────────────────────────────────────

#[test]
fn refresh_replaces_both_views_in_full() {
    let store = store();
    let config = config();
    put(&store, "Income Quintile", "1", Some(1), INCOME, "7510", MetricFlag::Income);
    put(&store, "Income Quintile", "1", Some(1), SPEND, "10979", MetricFlag::Consumption);
    put(&store, "Income Quintile", "5", Some(5), "Travel abroad", "2499", MetricFlag::Neither);
    put(&store, "Income Quintile", "1", Some(1), "Travel abroad", "95.6", MetricFlag::Neither);

    aggregator::refresh(&store, &config).unwrap();
    let report = aggregator::refresh(&store, &config).unwrap();

    let burn = store.burn_rate_rows().unwrap();
    assert_eq!(burn.len(), 1, "second refresh must not append");
    assert_eq!(burn[0].surplus_deficit, dec("-3469"));
    assert_eq!(burn[0].burn_rate_pct, dec("146.19"));
    assert_eq!(burn[0].status, BurnRateStatus::Deficit);

    let ineq = store.inequality_rows().unwrap();
    assert_eq!(ineq.len(), 1);
    assert_eq!(ineq[0].inequality_ratio, dec("26.14"));
    assert_eq!(ineq[0].low_spend, dec("95.6"));

    // Segment 5 has no flagged rows, so it is reported as excluded.
    assert_eq!(report.segments_excluded, 1);
    assert_eq!(store.last_refresh_excluded().unwrap(), Some(1));
}
