//! Execution seam
//!
//! The engine never connects to a database. Callers that want rows plug in a
//! [`QueryExecutor`]; only the SQL the engine selected is ever passed to it,
//! always under a caller-supplied timeout. Failures are reported, not retried.

pub mod result;

pub use result::QueryRows;

use crate::engine::EvaluationResult;
use crate::error::ExecutionError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Database access provided by the caller.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryRows, ExecutionError>;
}

/// Run the selected statement. The fallback is answered locally with no rows.
pub async fn execute_selected(
    executor: &dyn QueryExecutor,
    result: &EvaluationResult,
    timeout: Duration,
) -> Result<QueryRows, ExecutionError> {
    let sql = match result {
        EvaluationResult::Selected { sql, .. } => sql,
        EvaluationResult::Fallback { question_id, .. } => {
            info!("Question {}: fallback selected, skipping execution", question_id);
            return Ok(QueryRows::empty());
        }
    };

    let start = Instant::now();
    info!("Executing with {}: {}", executor.name(), sql);
    match tokio::time::timeout(timeout, executor.execute(sql, timeout)).await {
        Ok(Ok(mut rows)) => {
            rows.execution_time_ms = start.elapsed().as_millis() as u64;
            Ok(rows)
        }
        Ok(Err(e)) => {
            warn!("Execution failed: {}", e);
            Err(e)
        }
        Err(_) => {
            warn!("Execution timed out after {:?}", timeout);
            Err(ExecutionError::Timeout(timeout.as_millis()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockExecutor {
        delay: Duration,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockExecutor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl QueryExecutor for MockExecutor {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn execute(&self, _sql: &str, _timeout: Duration) -> Result<QueryRows, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ExecutionError::Failed("connection refused".to_string()));
            }
            Ok(QueryRows::new(vec!["cnt".to_string()], vec![vec![json!(3)]]))
        }
    }

    fn selected() -> EvaluationResult {
        EvaluationResult::Selected {
            question_id: "q".to_string(),
            candidate_index: 0,
            label: None,
            sql: "SELECT COUNT(*) AS cnt FROM orders AS o".to_string(),
            repairs_applied: Vec::new(),
            adjustments: Vec::new(),
            optional_applicable: Vec::new(),
            rejections: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_selected_sql_is_executed() {
        let executor = MockExecutor::new(Duration::from_millis(1));
        let rows = execute_selected(&executor, &selected(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(rows.rows, vec![vec![json!(3)]]);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_not_executed() {
        let executor = MockExecutor::new(Duration::from_millis(1));
        let fallback = EvaluationResult::Fallback {
            question_id: "q".to_string(),
            sql: "SELECT 1 WHERE 1 = 0".to_string(),
            rejections: Vec::new(),
        };
        let rows = execute_selected(&executor, &fallback, Duration::from_secs(1)).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let executor = MockExecutor::new(Duration::from_secs(5));
        let err = execute_selected(&executor, &selected(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::Timeout(20));
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let mut executor = MockExecutor::new(Duration::from_millis(1));
        executor.fail = true;
        let err = execute_selected(&executor, &selected(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed(_)));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }
}
