use sql_gatekeeper::catalog::{SchemaCatalog, Table};
use sql_gatekeeper::contract::ColumnSelection;
use sql_gatekeeper::engine::{Candidate, Engine, EvaluationRequest, EvaluationResult, Stage};
use sql_gatekeeper::guard::Guard;
use sql_gatekeeper::repair::RepairAction;
use sql_gatekeeper::sql::parse;
use sql_gatekeeper::{ContractBuilder, EngineConfig, Plan, SafetyContract, TaskKind};

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new(vec![
        Table::new(
            "orders",
            &[
                ("id", "int"),
                ("status", "int"),
                ("customer_id", "int"),
                ("amount", "decimal(10,2)"),
                ("created_at", "datetime"),
            ],
        )
        .with_foreign_key("customer_id", "customers", "id"),
        Table::new("customers", &[("id", "int"), ("region", "varchar(32)")]),
        Table::new("users", &[("id", "int"), ("password", "varchar(64)")]),
    ])
}

fn request(plan: Plan, candidates: &[&str]) -> EvaluationRequest {
    EvaluationRequest {
        question_id: "q-1".to_string(),
        plan: Some(plan),
        catalog: Some(catalog()),
        candidates: candidates
            .iter()
            .enumerate()
            .map(|(i, sql)| Candidate::new(sql).with_label(&format!("c{}", i)))
            .collect(),
        ..Default::default()
    }
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

#[test]
fn test_missing_mandatory_predicate_is_repaired() {
    let plan = Plan::new(TaskKind::Count).must_predicate("status = 1");
    let result = engine()
        .evaluate(&request(plan, &["SELECT COUNT(*) AS cnt FROM orders o WHERE o.amount > 100"]))
        .unwrap();

    match result {
        EvaluationResult::Selected {
            sql, repairs_applied, ..
        } => {
            assert_eq!(
                sql,
                "SELECT COUNT(*) AS cnt FROM orders AS o WHERE o.amount > 100 AND o.status = 1"
            );
            assert_eq!(
                repairs_applied,
                vec![RepairAction::AddedPredicate {
                    branch: 0,
                    predicate: "o.status = 1".to_string(),
                }]
            );
        }
        other => panic!("expected a selection, got {:?}", other),
    }
}

#[test]
fn test_unknown_table_is_rejected_without_repair() {
    let plan = Plan::new(TaskKind::Lookup).must_predicate("status = 1");
    let result = engine()
        .evaluate(&request(plan, &["SELECT p.id FROM payments p"]))
        .unwrap();

    assert!(result.is_fallback());
    let rejection = &result.rejections()[0];
    assert_eq!(rejection.stage, Stage::Guard);
    assert!(rejection.reason.contains("Forbidden: unknown-table"), "{}", rejection.reason);
}

#[test]
fn test_unrepaired_candidate_wins() {
    let plan = Plan::new(TaskKind::Count).must_predicate("status = 1");
    let result = engine()
        .evaluate(&request(
            plan,
            &[
                "SELECT COUNT(*) AS cnt FROM orders o",
                "SELECT COUNT(*) AS cnt FROM orders o WHERE o.status = 1",
            ],
        ))
        .unwrap();

    match result {
        EvaluationResult::Selected {
            candidate_index,
            label,
            repairs_applied,
            ..
        } => {
            assert_eq!(candidate_index, 1);
            assert_eq!(label.as_deref(), Some("c1"));
            assert!(repairs_applied.is_empty());
        }
        other => panic!("expected a selection, got {:?}", other),
    }
}

#[test]
fn test_trend_without_date_ordering_is_excluded() {
    let plan = Plan::new(TaskKind::Trend).must_table("orders");
    let result = engine()
        .evaluate(&request(
            plan,
            &[
                "SELECT o.status, COUNT(*) AS cnt FROM orders o GROUP BY o.status",
                "SELECT DATE(o.created_at) AS day, COUNT(*) AS cnt FROM orders o GROUP BY DATE(o.created_at)",
            ],
        ))
        .unwrap();

    match &result {
        EvaluationResult::Selected {
            candidate_index,
            sql,
            repairs_applied,
            rejections,
            ..
        } => {
            assert_eq!(*candidate_index, 1);
            assert!(sql.ends_with("ORDER BY DATE(o.created_at) LIMIT 200"), "{}", sql);
            assert!(matches!(repairs_applied[0], RepairAction::AddedOrdering { .. }));
            assert_eq!(rejections.len(), 1);
            assert_eq!(rejections[0].stage, Stage::Finalize);
        }
        other => panic!("expected a selection, got {:?}", other),
    }
}

#[test]
fn test_all_candidates_failing_yields_fallback() {
    let plan = Plan::new(TaskKind::Lookup).must_predicate("status = 1");
    let candidates = [
        "DELETE FROM orders",
        "SELECT * FROM orders",
        "SELECT o.secret FROM orders o",
        "SELECT c.id FROM customers c",
    ];
    let result = engine().evaluate(&request(plan, &candidates)).unwrap();

    match &result {
        EvaluationResult::Fallback { sql, rejections, .. } => {
            assert_eq!(sql, "SELECT 1 WHERE 1 = 0");
            assert_eq!(rejections.len(), candidates.len());
            let stages: Vec<Stage> = rejections.iter().map(|r| r.stage).collect();
            assert_eq!(stages, vec![Stage::Parse, Stage::Guard, Stage::Guard, Stage::Repair]);
            assert!(rejections.iter().all(|r| !r.reason.is_empty()));
        }
        other => panic!("expected fallback, got {:?}", other),
    }
}

#[test]
fn test_fallback_passes_guard_with_empty_scope() {
    let plan = Plan::new(TaskKind::Lookup).must_table("orders");
    let result = engine()
        .evaluate(&request(plan, &["DROP TABLE orders", "SELECT u.password FROM users u, orders o WHERE"]))
        .unwrap();
    assert!(result.is_fallback());

    let fallback = parse(result.sql()).unwrap();
    assert!(fallback.branches.iter().all(|b| b.from.is_none()));

    let no_tables = SafetyContract::new(Plan::new(TaskKind::Lookup));
    let checked = Guard::new(&EngineConfig::default()).check(&fallback, &no_tables).unwrap();
    assert!(checked.branches[0].from.is_none());
    assert!(checked.branches[0].selection.is_some());
}

#[test]
fn test_union_branches_are_repaired_separately() {
    let plan = Plan::new(TaskKind::Lookup).must_predicate("status = 1");
    let result = engine()
        .evaluate(&request(
            plan.clone(),
            &["SELECT o.id FROM orders o WHERE o.amount > 100 UNION SELECT o.id FROM orders o WHERE o.status = 1"],
        ))
        .unwrap();
    match &result {
        EvaluationResult::Selected {
            sql, repairs_applied, ..
        } => {
            assert_eq!(
                repairs_applied,
                &vec![RepairAction::AddedPredicate {
                    branch: 0,
                    predicate: "o.status = 1".to_string(),
                }]
            );
            let reparsed = parse(sql).unwrap();
            assert_eq!(reparsed.branches.len(), 2);
            assert_eq!(reparsed.branches[0].predicate_count(), 2);
            assert_eq!(reparsed.branches[1].predicate_count(), 1);
        }
        other => panic!("expected a selection, got {:?}", other),
    }

    let result = engine()
        .evaluate(&request(plan, &["SELECT o.id FROM orders o UNION ALL SELECT o.customer_id FROM orders o"]))
        .unwrap();
    match &result {
        EvaluationResult::Selected { repairs_applied, .. } => {
            let branches: Vec<usize> = repairs_applied
                .iter()
                .filter_map(|r| match r {
                    RepairAction::AddedPredicate { branch, .. } => Some(*branch),
                    _ => None,
                })
                .collect();
            assert_eq!(branches, vec![0, 1]);
        }
        other => panic!("expected a selection, got {:?}", other),
    }
}

#[test]
fn test_mysql_offset_comma_limit_is_clamped() {
    let plan = Plan::new(TaskKind::Lookup).must_predicate("status = 1");
    let result = engine()
        .evaluate(&request(plan, &["SELECT o.id FROM orders o WHERE o.status = 1 LIMIT 10, 5000"]))
        .unwrap();
    assert_eq!(result.sql(), "SELECT o.id FROM orders AS o WHERE o.status = 1 LIMIT 200 OFFSET 10");
}

#[test]
fn test_backslash_literal_cannot_end_early() {
    let config = EngineConfig::default();
    let plan = Plan::new(TaskKind::Lookup).must_table("orders");
    let mut selection = ColumnSelection::new();
    selection.insert("orders".to_string(), vec!["id".to_string(), "status".to_string()]);
    let mut req = request(
        plan.clone(),
        &[r"SELECT o.id FROM orders o WHERE o.status = 'a\\' AND o.status = ' UNION SELECT password FROM users -- '"],
    );
    req.column_selection = Some(selection.clone());

    let result = engine().evaluate(&req).unwrap();
    let sql = match &result {
        EvaluationResult::Selected { sql, .. } => sql.clone(),
        other => panic!("expected a selection, got {:?}", other),
    };
    assert!(sql.contains(r"o.status = 'a\\' AND"), "{}", sql);

    let reparsed = parse(&sql).unwrap();
    assert_eq!(reparsed.branches.len(), 1, "{}", sql);
    let contract = ContractBuilder::new(&catalog(), &config)
        .build(&plan, Some(&selection))
        .unwrap();
    assert!(!contract.allows_table("users"));
    assert!(Guard::new(&config).check(&reparsed, &contract).is_ok());
}

#[test]
fn test_selection_is_deterministic() {
    let plan = Plan::new(TaskKind::Lookup)
        .must_join("orders.customer_id = customers.id")
        .should_predicate("customers.region = 'eu'");
    let candidates = [
        "SELECT o.id FROM orders o",
        "SELECT o.id FROM orders o JOIN customers c ON c.id = o.customer_id",
        "SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id WHERE c.region = 'eu'",
        "SELECT o.id FROM orders o JOIN customers c ON o.customer_id = c.id WHERE c.region = 'eu'",
    ];
    let engine = engine();
    let first = engine.evaluate(&request(plan.clone(), &candidates)).unwrap();
    for _ in 0..5 {
        assert_eq!(engine.evaluate(&request(plan.clone(), &candidates)).unwrap(), first);
    }
    match first {
        EvaluationResult::Selected { candidate_index, .. } => assert_eq!(candidate_index, 2),
        other => panic!("expected a selection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_matches_sequential() {
    let config = EngineConfig {
        max_workers: 2,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).unwrap();
    let plan = Plan::new(TaskKind::Count).must_predicate("status = 1");
    let req = request(
        plan,
        &[
            "SELECT COUNT(*) AS cnt FROM orders o",
            "UPDATE orders SET status = 2",
            "SELECT COUNT(*) AS cnt FROM orders o WHERE o.status = 1",
            "SELECT COUNT(o.id) AS total FROM orders o WHERE 1 = o.status",
        ],
    );
    let sequential = engine.evaluate(&req).unwrap();
    let concurrent = engine.evaluate_concurrent(req).await.unwrap();
    assert_eq!(sequential, concurrent);
}

#[test]
fn test_accepted_sql_stays_in_scope() {
    let config = EngineConfig::default();
    let plan = Plan::new(TaskKind::Lookup)
        .must_join("orders.customer_id = customers.id")
        .must_predicate("customers.region = 'eu'");
    let contract = ContractBuilder::new(&catalog(), &config).build(&plan, None).unwrap();
    let result = engine()
        .evaluate(&request(plan, &["SELECT o.id, o.amount FROM orders o"]))
        .unwrap();

    let final_sql = match &result {
        EvaluationResult::Selected { sql, .. } => sql.clone(),
        other => panic!("expected a selection, got {:?}", other),
    };
    let reparsed = parse(&final_sql).unwrap();
    assert!(Guard::new(&config).check(&reparsed, &contract).is_ok());
    assert!(final_sql.contains("JOIN customers ON o.customer_id = customers.id"), "{}", final_sql);
    assert!(final_sql.contains("customers.region = 'eu'"), "{}", final_sql);
}
