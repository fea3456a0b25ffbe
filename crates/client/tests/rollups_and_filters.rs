use chrono::NaiveDate;
use fdq_client::{OrderFilter, PlanSource};
use fdq_common::EngineConfig;
#[path = "support/mod.rs"]
mod support;

use support::{delivered, engine_with, floats, ints, sample_orders, strings, sum_ints};

fn rollup_config() -> EngineConfig {
    EngineConfig {
        use_rollups: true,
        ..EngineConfig::default()
    }
}

#[test]
fn rollup_backed_reports_match_raw_results() {
    let raw = engine_with(EngineConfig::default(), &sample_orders());
    let rolled = engine_with(rollup_config(), &sample_orders());
    rolled.refresh_rollups().expect("refresh");

    for name in ["monthly_revenue", "city_revenue"] {
        let from_orders = raw.report(name).expect("raw");
        let from_rollup = rolled.report(name).expect("rollup");
        assert_eq!(from_orders.source, PlanSource::Raw);
        assert_eq!(from_rollup.source, PlanSource::Rollup, "{name}");
        assert_eq!(from_orders.batch, from_rollup.batch, "{name}");
    }
}

#[test]
fn missing_rollups_fall_back_to_orders() {
    let engine = engine_with(rollup_config(), &sample_orders());
    let out = engine.report("city_revenue").expect("report");
    assert_eq!(out.source, PlanSource::Raw);
}

#[test]
fn replacing_orders_makes_rollups_stale() {
    let engine = engine_with(rollup_config(), &sample_orders());
    engine.refresh_rollups().expect("refresh");
    assert_eq!(
        engine.report("city_revenue").expect("fresh").source,
        PlanSource::Rollup
    );

    let mut more = sample_orders();
    more.push(delivered("O8", "C1", "R1", "2024-03-01", 1000.0));
    engine.register_orders(&more).expect("orders");
    let stale = engine.report("monthly_revenue").expect("stale");
    assert_eq!(stale.source, PlanSource::Raw);
    assert_eq!(stale.num_rows(), 3);

    let rollup = engine.rollup("city_performance").expect("rollup");
    assert_eq!(rollup.source, PlanSource::Raw);
    assert_eq!(sum_ints(&rollup.batch, "total_orders"), 8);
}

#[test]
fn stored_rollups_keep_their_keys() {
    let engine = engine_with(EngineConfig::default(), &sample_orders());
    engine.refresh_rollups().expect("refresh");

    let daily = engine.rollup("daily_summary").expect("daily");
    assert_eq!(daily.source, PlanSource::Rollup);
    assert_eq!(daily.num_rows(), 7);
    assert_eq!(sum_ints(&daily.batch, "cancelled_orders"), 3);

    let restaurants = engine.rollup("restaurant_performance").expect("restaurants");
    assert_eq!(
        strings(&restaurants.batch, "restaurant_id"),
        vec![
            Some("R1".to_string()),
            Some("R1".to_string()),
            Some("R2".to_string()),
            Some("R2".to_string())
        ]
    );
    assert_eq!(
        ints(&restaurants.batch, "month"),
        vec![Some(1), Some(2), Some(1), Some(2)]
    );

    let analytics = engine.rollup("order_analytics").expect("analytics");
    assert_eq!(analytics.num_rows(), 7);
    assert_eq!(ints(&analytics.batch, "order_hour")[0], Some(13));
}

#[test]
fn city_filter_is_case_insensitive() {
    let engine = engine_with(EngineConfig::default(), &sample_orders());
    let filter = OrderFilter::new().with_city("delhi");
    let out = engine.report_filtered("city_revenue", &filter).expect("report");
    assert_eq!(strings(&out.batch, "city"), vec![Some("Delhi".to_string())]);
    assert_eq!(floats(&out.batch, "revenue"), vec![Some(895.25)]);
}

#[test]
fn filtered_reports_recompute_rollups() {
    let engine = engine_with(rollup_config(), &sample_orders());
    engine.refresh_rollups().expect("refresh");
    let filter = OrderFilter::new()
        .with_date_from(NaiveDate::from_ymd_opt(2024, 2, 1).expect("date"))
        .with_date_to(NaiveDate::from_ymd_opt(2024, 2, 29).expect("date"));

    let out = engine.report_filtered("monthly_revenue", &filter).expect("report");
    assert_eq!(out.source, PlanSource::Rollup);
    assert_eq!(strings(&out.batch, "month"), vec![Some("2024-02".to_string())]);
    assert_eq!(floats(&out.batch, "total_revenue"), vec![Some(995.24)]);

    let unfiltered = engine.report("monthly_revenue").expect("report");
    assert_eq!(unfiltered.num_rows(), 2);
}

#[test]
fn cuisine_and_status_filters_combine() {
    let engine = engine_with(EngineConfig::default(), &sample_orders());
    let filter = OrderFilter::new().with_cuisine("indian").with_status("CANCELLED");
    let out = engine
        .report_filtered("restaurant_cancellation_rate", &filter)
        .expect("report");
    assert_eq!(strings(&out.batch, "restaurant_id"), vec![Some("R1".to_string())]);
    assert_eq!(ints(&out.batch, "total_orders"), vec![Some(2)]);
    assert_eq!(floats(&out.batch, "cancellation_rate"), vec![Some(100.0)]);
}

#[test]
fn explain_shows_rollup_alternative() {
    let engine = engine_with(EngineConfig::default(), &sample_orders());
    let text = engine.explain("city_revenue").expect("explain");
    assert!(text.contains("Scan table=orders"));
    assert!(text.contains("Scan table=city_performance"));

    let view = engine.explain("order_details").expect("explain view");
    assert!(view.contains("Join type=left on=restaurant_id=restaurant_id"));
}

#[test]
fn filtered_views_see_only_matching_orders() {
    let engine = engine_with(EngineConfig::default(), &sample_orders());
    let filter = OrderFilter::new().with_status("delivered");
    let out = engine.view_filtered("city_summary", &filter).expect("view");
    assert_eq!(sum_ints(&out.batch, "total_orders"), 4);
    assert_eq!(floats(&out.batch, "cancellation_rate"), vec![Some(0.0); 3]);
    assert_eq!(engine.view("city_summary").expect("view").num_rows(), 3);
}
