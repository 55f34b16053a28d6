//! Report rendering tests against recorded plans.

use super::recorded_pipeline;
use pretty_assertions::assert_eq;
use sqlpipe::pipeline::Analysis;
use sqlpipe::report::{render, OutputFormat};

async fn filter_limit() -> Analysis {
    recorded_pipeline("filter_limit.json")
        .analyze("SELECT * FROM customer WHERE c_acctbal > 100 LIMIT 100")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_text_report() {
    let output = render(&[filter_limit().await], OutputFormat::Text).unwrap();

    let expected = "\
-- Query Execution Plan
-- Execution Time: 0.141 ms (planning 0.093 ms)
Limit  (actual time 0.117 ms, rows 100)
└─ Seq Scan on customer  (actual time 0.101 ms, rows 100)
      Filter: c_acctbal > '100'

-- Pipe Syntax
FROM customer
|> WHERE c_acctbal > '100'
|> LIMIT 100
";
    assert_eq!(output, expected);
}

#[tokio::test]
async fn test_text_report_numbers_multiple_statements() {
    let analyses = vec![filter_limit().await, filter_limit().await];
    let output = render(&analyses, OutputFormat::Text).unwrap();

    assert!(output.starts_with("-- Statement 1\n-- Query Execution Plan"));
    assert!(output.contains("\n\n-- Statement 2\n"));
}

#[tokio::test]
async fn test_json_report() {
    let output = render(&[filter_limit().await], OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(
        value["pipe_syntax"],
        "FROM customer\n|> WHERE c_acctbal > '100'\n|> LIMIT 100"
    );
    assert_eq!(value["explain"]["plan"]["Node Type"], "Limit");
    assert_eq!(value["pipe"]["ops"][0]["op"], "from");
    assert_eq!(value["steps"][0]["kind"], "LIMIT");
    assert_eq!(value["graph"]["nodes"][1]["label"], "Seq Scan on customer");
    assert_eq!(value["classification"]["access"], "ReadOnly");
}

#[tokio::test]
async fn test_json_report_is_array_for_many() {
    let analyses = vec![filter_limit().await, filter_limit().await];
    let output = render(&analyses, OutputFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_dot_report() {
    let analyses = vec![filter_limit().await, filter_limit().await];
    let output = render(&analyses, OutputFormat::Dot).unwrap();

    assert!(output.starts_with("digraph \"statement_1\" {"));
    assert!(output.contains("digraph \"statement_2\" {"));
    assert!(output.contains("n1 -> n0;"));
}

#[tokio::test]
async fn test_elements_report() {
    let output = render(&[filter_limit().await], OutputFormat::Elements).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();
    let elements = value.as_array().unwrap();

    assert_eq!(elements.len(), 3);
    assert_eq!(elements[0]["data"]["id"], "n0");
    assert_eq!(elements[0]["data"]["label"], "Limit");
    assert_eq!(elements[1]["data"]["label"], "Seq Scan on customer");
    assert_eq!(elements[2]["data"]["source"], "n0");
    assert_eq!(elements[2]["data"]["target"], "n1");
}

#[tokio::test]
async fn test_elements_report_numbers_many() {
    let analyses = vec![filter_limit().await, filter_limit().await];
    let output = render(&analyses, OutputFormat::Elements).unwrap();
    let value: serde_json::Value = serde_json::from_str(&output).unwrap();

    assert_eq!(value[1]["statement"], 2);
    assert_eq!(value[1]["elements"].as_array().map(Vec::len), Some(3));
}
