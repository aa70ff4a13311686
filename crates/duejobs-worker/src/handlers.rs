//! Built-in job handlers available to every worker process.

use duejobs_scheduler::Scheduler;
use serde_json::Value;
use tracing::info;

pub const ECHO: &str = "echo";

/// Register the built-in handlers on `scheduler`.
pub fn register_builtin(scheduler: &Scheduler) -> duejobs_scheduler::Result<()> {
    scheduler.register(ECHO, echo)?;
    Ok(())
}

/// Log the job's arguments. Useful for smoke-testing a deployment.
async fn echo(args: Vec<Value>) -> anyhow::Result<()> {
    info!(argc = args.len(), args = %serde_json::Value::Array(args), "echo job ran");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use duejobs_scheduler::{SchedulerError, SqliteJobStore, TableName};

    fn scheduler() -> Scheduler {
        let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        store.ensure_table(&TableName::parse("jobs").unwrap()).unwrap();
        Scheduler::builder().store(store).table("jobs").build().unwrap()
    }

    #[tokio::test]
    async fn echo_is_schedulable_and_runs() {
        let scheduler = scheduler();
        register_builtin(&scheduler).unwrap();

        let due = chrono::Utc::now() - chrono::Duration::seconds(1);
        let id = scheduler
            .schedule(due, ECHO, &serde_json::json!(["hello", 1]))
            .await
            .unwrap();
        let report = scheduler.sweep().await;

        assert_eq!(report.dispatched, 1);
        assert!(scheduler.get(id).await.unwrap().unwrap().run_at.is_some());
    }

    #[test]
    fn builtins_register_once() {
        let scheduler = scheduler();
        register_builtin(&scheduler).unwrap();
        assert_eq!(scheduler.job_types(), vec![ECHO.to_string()]);
        assert!(matches!(
            register_builtin(&scheduler),
            Err(SchedulerError::DuplicateRegistration { .. })
        ));
    }
}
