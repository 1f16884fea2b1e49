//! Pool bounds and retry behaviour, driven by a connector that fails on demand

mod common;

use std::time::Duration;

use common::{config_for, flaky_source, Faults};
use dbbox_core::{DbError, Dialect, RetryPolicy};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatch_never_exceeds_pool_size() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;
    faults.delay(Duration::from_millis(20));

    let handles: Vec<_> = (0..50i64)
        .map(|i| source.update("UPDATE counters SET n = n + 1 WHERE id = ?", vec![i.into()]))
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }

    let max_in_flight = Faults::get(&faults.max_in_flight);
    assert!(max_in_flight <= 10, "saw {max_in_flight} statements in flight");
    assert_eq!(Faults::get(&faults.executions), 50);
    assert_eq!(source.pool_status().checked_out, 0);
    assert!(Faults::get(&faults.connects) <= 10);
}

#[tokio::test]
async fn test_fewer_failures_than_attempts_succeed() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;
    faults.fail_next(2);

    let affected = source
        .update("DELETE FROM sessions WHERE expired = ?", vec![true.into()])
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(Faults::get(&faults.executions), 3);
    // each failed attempt threw its connection away
    assert_eq!(Faults::get(&faults.closes), 2);
    assert_eq!(source.pool_status().idle, 9);
}

#[tokio::test]
async fn test_every_attempt_failing_is_terminal_and_pool_survives() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;
    faults.fail_next(3);

    let err = source
        .query("SELECT * FROM users WHERE id = ?", vec![7i64.into()])
        .await
        .unwrap_err();

    match &err {
        DbError::Statement {
            sql,
            params,
            source: cause,
        } => {
            assert_eq!(sql, "SELECT * FROM users WHERE id = ?");
            assert_eq!(params, "7");
            assert!(matches!(**cause, DbError::Exhausted { attempts: 3, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), DbError::Driver(sqlx::Error::Io(_))));

    let status = source.pool_status();
    assert_eq!(status.idle, 9);
    assert_eq!(status.checked_out, 0);

    // the replacements work
    source.query("SELECT 1", Vec::new()).await.unwrap();
}

#[tokio::test]
async fn test_transient_only_stops_on_permanent_error() {
    let mut config = config_for(Dialect::MySql, "app");
    config.pool.retry_policy = RetryPolicy::TransientOnly;
    let (source, faults) = flaky_source(config).await;
    faults.fail_permanently();
    faults.fail_next(1);

    let err = source
        .query("SELECT missing FROM users", Vec::new())
        .await
        .unwrap_err();

    assert_eq!(Faults::get(&faults.executions), 1);
    assert!(!err.is_transient());
    match err {
        DbError::Statement { source: cause, .. } => {
            assert!(matches!(*cause, DbError::Driver(_)))
        }
        other => panic!("unexpected error: {other}"),
    }
    // the connection was healthy and went back to the pool
    assert_eq!(Faults::get(&faults.closes), 0);
    assert_eq!(source.pool_status().idle, 9);
}

#[tokio::test]
async fn test_default_policy_retries_permanent_errors_too() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;
    faults.fail_permanently();
    faults.fail_next(2);

    source.query("SELECT 1", Vec::new()).await.unwrap();
    assert_eq!(Faults::get(&faults.executions), 3);
}

#[tokio::test]
async fn test_dropped_handle_still_runs() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;

    drop(source.update("UPDATE jobs SET state = ?", vec!["done".into()]));

    for _ in 0..100 {
        if Faults::get(&faults.executions) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(Faults::get(&faults.executions), 1);
}

#[tokio::test]
async fn test_shutdown_closes_connections_and_rejects_work() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;

    source.shutdown().await.unwrap();
    assert_eq!(Faults::get(&faults.closes), 9);

    let err = source.query("SELECT 1", Vec::new()).await.unwrap_err();
    assert!(matches!(err.root_cause(), DbError::PoolClosed));
}

#[tokio::test]
async fn test_transaction_pool_is_separate() {
    let (source, faults) = flaky_source(config_for(Dialect::MySql, "app")).await;
    assert_eq!(source.transaction_pool_status().max_size, 2);

    let affected = source
        .transaction(|conn| {
            Box::pin(async move {
                let first = conn.execute("UPDATE a SET x = 1", &[]).await?;
                let second = conn.execute("UPDATE b SET y = 2", &[]).await?;
                Ok::<_, DbError>(first + second)
            })
        })
        .await
        .unwrap();

    assert_eq!(affected, 2);
    // nine pooled plus one opened on demand for the transaction
    assert_eq!(Faults::get(&faults.connects), 10);
    assert_eq!(source.transaction_pool_status().idle, 1);
    assert_eq!(source.pool_status().idle, 9);
}

#[tokio::test]
async fn test_cancelled_transactions_give_their_slots_back() {
    let (source, _faults) = flaky_source(config_for(Dialect::MySql, "app")).await;

    for _ in 0..2 {
        let stalled = source.transaction(|conn| {
            Box::pin(async move {
                conn.execute("UPDATE a SET x = 1", &[]).await?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DbError>(())
            })
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), stalled)
            .await
            .is_err());
    }

    let status = source.transaction_pool_status();
    assert_eq!(status.checked_out, 0);
    assert_eq!(status.idle, 0);

    let affected = tokio::time::timeout(
        Duration::from_secs(1),
        source.transaction(|conn| {
            Box::pin(async move { conn.execute("UPDATE a SET x = 2", &[]).await })
        }),
    )
    .await
    .expect("transaction pool is exhausted")
    .unwrap();
    assert_eq!(affected, 1);
}
