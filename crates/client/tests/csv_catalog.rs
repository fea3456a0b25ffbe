use std::fs::File;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use fdq_client::Engine;
use fdq_common::{EngineConfig, FdqError};
use parquet::arrow::ArrowWriter;
#[path = "support/mod.rs"]
mod support;

use support::{floats, strings, unique_temp_dir};

const ORDERS_CSV: &str = "\
Order_ID,Customer_ID,Restaurant_ID,Order_Date,Order_Time,City,Order_Value,Discount_Applied,Profit_Margin,Delivery_Time_Min,Order_Status,Cancellation_Reason,Payment_Mode
O1,C1,R1,2024-03-02,12:30,Pune,500,50,100,25,Delivered,,UPI
O2,C2,R1,2024-03-04,16:05,Pune,300,0,30,50,cancelled,Out of stock,Card
O3,C1,R2,2024-03-09,20:45,Mumbai,1200,200,240,40,Delivered,,UPI
";

const CUSTOMERS_CSV: &str = "\
customer_id,customer_name,customer_age,customer_gender,City
C1,Asha,24,F,Pune
C2,Ravi,41,M,Mumbai
";

fn write_restaurants_parquet(path: &std::path::Path) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("restaurant_id", DataType::Utf8, false),
        Field::new("restaurant_name", DataType::Utf8, true),
        Field::new("cuisine_type", DataType::Utf8, true),
        Field::new("Avg_Rating", DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec!["R1", "R2"])) as ArrayRef,
            Arc::new(StringArray::from(vec!["Spice Hub", "Dragon Bowl"])),
            Arc::new(StringArray::from(vec!["Indian", "Chinese"])),
            Arc::new(Float64Array::from(vec![4.1, 4.6])),
        ],
    )
    .expect("batch");
    let file = File::create(path).expect("create parquet");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("writer");
    writer.write(&batch).expect("write");
    writer.close().expect("close");
}

fn catalog_engine(config: EngineConfig) -> Engine {
    let dir = unique_temp_dir("fdq_catalog_it");
    std::fs::write(dir.join("orders.csv"), ORDERS_CSV).expect("orders csv");
    std::fs::write(dir.join("customers.csv"), CUSTOMERS_CSV).expect("customers csv");
    write_restaurants_parquet(&dir.join("restaurants.parquet"));
    let catalog = serde_json::json!([
        {"name": "orders", "uri": "orders.csv", "format": "csv"},
        {"name": "customers", "uri": "customers.csv", "format": "csv"},
        {
            "name": "restaurants",
            "uri": "restaurants.parquet",
            "format": "parquet",
            "options": {"alias.Avg_Rating": "restaurant_avg_rating"}
        }
    ]);
    let path = dir.join("catalog.json");
    std::fs::write(&path, catalog.to_string()).expect("catalog");

    let engine = Engine::new(config).expect("engine");
    engine.load_catalog_file(&path).expect("load catalog");
    engine
}

#[test]
fn catalog_tables_load_and_derive_missing_columns() {
    let engine = catalog_engine(EngineConfig::default());
    let details = engine.view("order_details").expect("order_details");
    assert_eq!(details.num_rows(), 3);
    assert_eq!(
        strings(&details.batch, "order_day"),
        vec![
            Some("Saturday".to_string()),
            Some("Monday".to_string()),
            Some("Saturday".to_string())
        ]
    );
    assert_eq!(
        strings(&details.batch, "order_day_type"),
        vec![
            Some("Weekend".to_string()),
            Some("Weekday".to_string()),
            Some("Weekend".to_string())
        ]
    );
    assert_eq!(
        floats(&details.batch, "final_amount"),
        vec![Some(450.0), Some(300.0), Some(1000.0)]
    );
    assert_eq!(
        floats(&details.batch, "profit_margin_percent"),
        vec![Some(20.0), Some(10.0), Some(20.0)]
    );
    assert_eq!(
        strings(&details.batch, "delivery_performance"),
        vec![
            Some("Fast".to_string()),
            Some("Delayed".to_string()),
            Some("On-Time".to_string())
        ]
    );
    assert_eq!(
        strings(&details.batch, "age_group"),
        vec![
            Some("Youth".to_string()),
            Some("Senior".to_string()),
            Some("Youth".to_string())
        ]
    );
    assert_eq!(
        strings(&details.batch, "customer_city"),
        vec![
            Some("Pune".to_string()),
            Some("Mumbai".to_string()),
            Some("Pune".to_string())
        ]
    );
    assert_eq!(
        floats(&details.batch, "restaurant_avg_rating"),
        vec![Some(4.1), Some(4.1), Some(4.6)]
    );
}

#[test]
fn catalog_backed_reports_match_expected_values() {
    let engine = catalog_engine(EngineConfig::default());

    let cuisines = engine.report("cuisine_revenue").expect("cuisine_revenue");
    assert_eq!(
        strings(&cuisines.batch, "cuisine_type"),
        vec![Some("Chinese".to_string()), Some("Indian".to_string())]
    );
    assert_eq!(floats(&cuisines.batch, "revenue"), vec![Some(1200.0), Some(800.0)]);

    let reasons = engine.report("cancellation_reasons").expect("reasons");
    assert_eq!(
        strings(&reasons.batch, "cancellation_reason"),
        vec![Some("Out of stock".to_string())]
    );

    let peak = engine.report("peak_hour_demand").expect("peak");
    assert_eq!(peak.num_rows(), 2);

    let checks = engine.check_references().expect("checks");
    assert_eq!(checks[0].orphan_rows, 0);
    assert!(!checks[2].dimension_present || checks[2].orphan_rows == 0);
}

#[test]
fn unsupported_format_is_rejected() {
    let dir = unique_temp_dir("fdq_catalog_bad");
    let path = dir.join("catalog.json");
    std::fs::write(&path, r#"[{"name":"orders","uri":"orders.xlsx","format":"xlsx"}]"#)
        .expect("catalog");
    let engine = Engine::new(EngineConfig::default()).expect("engine");
    assert!(matches!(
        engine.load_catalog_file(&path),
        Err(FdqError::Unsupported(_))
    ));
}
