//! Pipeline tests against recorded TPC-H plans.

use super::recorded_pipeline;
use pretty_assertions::assert_eq;
use sqlpipe::error::SqlPipeError;
use sqlpipe::plan::StepKind;
use sqlpipe::safety::DataAccess;

const Q13: &str = "select c_count, count(*) as custdist
from (
    select c_custkey, count(o_orderkey)
    from customer left outer join orders
      on c_custkey = o_custkey and o_comment not like '%special%requests%'
    group by c_custkey
) as c_orders (c_custkey, c_count)
group by c_count
order by custdist desc, c_count desc";

const WINDOW: &str = "SELECT c.c_name, o.o_orderkey, o.o_totalprice,
       RANK() OVER (PARTITION BY c.c_custkey ORDER BY o.o_totalprice DESC) AS price_rank
FROM customer c JOIN orders o ON c.c_custkey = o.o_custkey
ORDER BY c.c_name, price_rank";

#[tokio::test]
async fn test_q13_pipe_syntax() {
    let analysis = recorded_pipeline("q13.json").analyze(Q13).await.unwrap();

    assert_eq!(
        analysis.pipe_syntax,
        "FROM orders\n\
         |> WHERE o_comment NOT LIKE '%special%requests%'\n\
         |> RIGHT JOIN customer ON o_custkey = c_custkey\n\
         |> AGGREGATE count(o_orderkey) AS c_count GROUP BY c_custkey\n\
         |> AGGREGATE count(*) AS custdist GROUP BY c_count\n\
         |> ORDER BY custdist DESC, c_count DESC\n\
         |> SELECT c_count, custdist"
    );
    assert_eq!(analysis.explain.execution_time_ms, Some(815.267));
    assert_eq!(analysis.classification.access, DataAccess::ReadOnly);
}

#[tokio::test]
async fn test_q13_steps_are_breadth_first() {
    let analysis = recorded_pipeline("q13.json").analyze(Q13).await.unwrap();

    let kinds: Vec<StepKind> = analysis.steps.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::Select,
            StepKind::Order,
            StepKind::Aggregate,
            StepKind::Aggregate,
            StepKind::Join,
            StepKind::Where,
            StepKind::From,
            StepKind::From,
        ]
    );
    assert_eq!(analysis.steps[0].details["Columns"], "c_count, custdist");
    assert_eq!(analysis.steps[2].details["Items"], "count(*) AS custdist");
    assert_eq!(
        analysis.steps[3].details["Items"],
        "count(o_orderkey) AS c_count"
    );
    assert_eq!(
        analysis.steps[5].details["Condition"],
        "o_comment NOT LIKE '%special%requests%'"
    );
    assert_eq!(analysis.steps[4].details["Join Type"], "Right");
}

#[tokio::test]
async fn test_q13_graph_covers_every_node() {
    let analysis = recorded_pipeline("q13.json").analyze(Q13).await.unwrap();

    assert_eq!(analysis.graph.nodes.len(), 7);
    assert_eq!(analysis.graph.edges.len(), 6);
    assert_eq!(analysis.graph.nodes[0].label, "Sort");
    assert_eq!(analysis.graph.nodes[1].label, "HashAggregate");
    assert_eq!(analysis.graph.nodes[4].label, "Seq Scan on orders");
}

#[tokio::test]
async fn test_filter_and_limit() {
    let analysis = recorded_pipeline("filter_limit.json")
        .analyze("SELECT * FROM customer WHERE c_acctbal > 100 LIMIT 100;")
        .await
        .unwrap();

    assert_eq!(
        analysis.pipe_syntax,
        "FROM customer\n|> WHERE c_acctbal > '100'\n|> LIMIT 100"
    );
}

#[tokio::test]
async fn test_window_function_becomes_extend() {
    let analysis = recorded_pipeline("window.json")
        .analyze(WINDOW)
        .await
        .unwrap();

    assert_eq!(
        analysis.pipe_syntax,
        "FROM orders AS o\n\
         |> JOIN customer AS c ON o_custkey = c_custkey\n\
         |> EXTEND RANK() OVER (PARTITION BY c_custkey ORDER BY o_totalprice DESC) AS price_rank\n\
         |> ORDER BY c_name, price_rank\n\
         |> SELECT c_name, o_orderkey, o_totalprice, price_rank"
    );
}

#[tokio::test]
async fn test_update_ends_with_set_and_update() {
    let analysis = recorded_pipeline("update.json")
        .analyze("UPDATE customer SET c_acctbal = c_acctbal + 10 WHERE c_custkey = 1")
        .await
        .unwrap();

    assert_eq!(
        analysis.pipe_syntax,
        "FROM customer\n|> WHERE c_custkey = 1\n|> SET c_acctbal = c_acctbal + 10\n|> UPDATE customer"
    );
    assert!(analysis.classification.access.modifies_data());
    assert!(!analysis.pipe_syntax.contains("SELECT"));
    assert_eq!(analysis.steps[0].kind, StepKind::Set);
    assert_eq!(
        analysis.steps[0].details["Assignments"],
        "c_acctbal = c_acctbal + 10"
    );
    assert_eq!(analysis.steps[1].kind, StepKind::Update);
    assert!(analysis.steps.iter().all(|s| s.kind != StepKind::Select));
}

#[tokio::test]
async fn test_rejected_statements_never_reach_the_plan() {
    let pipeline = recorded_pipeline("filter_limit.json");

    let err = pipeline.analyze("").await.unwrap_err();
    assert_eq!(err.to_string(), "Query error: No SQL input provided.");

    let err = pipeline
        .analyze("CREATE TABLE t (id int)")
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPipeError::Query(_)));

    let err = pipeline.analyze("SELEC * FROM customer").await.unwrap_err();
    assert!(err
        .to_string()
        .contains("Error in parsing SQL. Please ensure that the query is valid!"));
}

#[tokio::test]
async fn test_analyze_all_keeps_order_and_continues() {
    let pipeline = recorded_pipeline("filter_limit.json");
    let statements = sqlpipe::loader::load_from_str(
        "SELECT * FROM customer WHERE c_acctbal > 100 LIMIT 100;
         DROP TABLE customer;
         SELECT * FROM customer WHERE c_acctbal > 100 LIMIT 100;",
    );

    let results = pipeline.analyze_all(&statements).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok());
}
