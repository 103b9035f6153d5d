use std::sync::Arc;

use common::{
    LoggedWrite, TestStorage, create_worker_pool, generate_points, wait_for_idle_workers,
    wait_until,
};
use loadline_ingestor_core::{Batch, IngestorError, PayloadOutcome, Result};
use tokio::sync::Semaphore;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_workers_write_five_batches() -> Result<()> {
    let storage = TestStorage::new();
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let outcome = client.write(Batch::split(generate_points(500), 100)).await?;

    assert_eq!(
        outcome,
        PayloadOutcome {
            batches: 5,
            rows_written: 500,
            rows_failed: 0,
            failed_batches: 0,
        }
    );
    assert_eq!(storage.storage.num_points().await, 500);
    assert_eq!(storage.storage.sessions_opened(), 2);
    assert_eq!(storage.session_writes().iter().sum::<usize>(), 5);
    assert!(storage.max_in_flight() <= 2);

    let status = client.status().await?;
    assert_eq!(status.active_workers, 0);
    assert_eq!(status.idle_workers, 2);
    assert_eq!(status.queued_batches, 0);
    assert_eq!(status.pending_payloads, 0);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_active_workers_never_exceed_limit() -> Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let storage = TestStorage::new().with_gate(gate.clone());
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let ticket = client.enqueue(Batch::split(generate_points(500), 100))?;

    wait_until(|| storage.in_flight() == 2).await;

    let status = client.status().await?;
    assert_eq!(status.active_workers, 2);
    assert_eq!(status.queued_batches, 3);
    assert_eq!(status.pending_payloads, 1);

    // Release the writes one at a time.
    for released in 1..=5 {
        gate.add_permits(1);
        wait_until(|| storage.session_writes().iter().sum::<usize>() == released).await;
        let status = client.status().await?;
        assert!(status.active_workers <= 2);
    }

    let outcome = ticket.wait().await?;
    assert_eq!(outcome.rows_written, 500);
    assert_eq!(storage.max_in_flight(), 2);
    assert!(storage.session_writes().iter().all(|writes| *writes > 0));

    let status = client.status().await?;
    assert_eq!(status.active_workers, 0);
    assert_eq!(status.queued_batches, 0);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_batches_keep_order_across_payloads() -> Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let storage = TestStorage::new().with_gate(gate.clone());
    let (task, client, _ct) = create_worker_pool(storage.clone(), 1, 10);

    let mut points = generate_points(50);
    let second = points.split_off(30);

    let first_ticket = client.enqueue(Batch::split(points, 10))?;
    let second_ticket = client.enqueue(Batch::split(second, 10))?;

    wait_until(|| storage.in_flight() == 1).await;
    gate.add_permits(5);

    assert_eq!(first_ticket.wait().await?.rows_written, 30);
    assert_eq!(second_ticket.wait().await?.rows_written, 20);

    let written = storage
        .write_log()
        .into_iter()
        .map(|write| write.first_tag_id)
        .collect::<Vec<_>>();
    assert_eq!(written, vec!["p0000", "p0010", "p0020", "p0030", "p0040"]);
    assert_eq!(storage.max_in_flight(), 1);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_first_idle_worker_is_picked() -> Result<()> {
    let storage = TestStorage::new();
    let (task, client, _ct) = create_worker_pool(storage.clone(), 3, 10);

    wait_for_idle_workers(&client, 3).await;

    let points = generate_points(20);
    client.write(Batch::split(points[..10].to_vec(), 10)).await?;
    client.write(Batch::split(points[10..].to_vec(), 10)).await?;

    assert_eq!(
        storage.write_log(),
        vec![
            LoggedWrite {
                worker: Some(1),
                first_tag_id: "p0000".to_string(),
            },
            LoggedWrite {
                worker: Some(1),
                first_tag_id: "p0010".to_string(),
            },
        ]
    );

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_failed_batch_is_dropped() -> Result<()> {
    let storage = TestStorage::new().with_failing_batch("p0200");
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let outcome = client.write(Batch::split(generate_points(500), 100)).await?;

    assert_eq!(
        outcome,
        PayloadOutcome {
            batches: 5,
            rows_written: 400,
            rows_failed: 100,
            failed_batches: 1,
        }
    );

    let lines = storage.storage.lines().await;
    assert_eq!(lines.len(), 400);
    assert!(!lines.iter().any(|line| line.contains("tagId=p0200 ")));
    assert!(lines.iter().any(|line| line.contains("tagId=p0499 ")));

    let status = client.status().await?;
    assert_eq!(status.active_workers, 0);
    assert_eq!(status.idle_workers, 2);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_worker_initialization_failure() -> Result<()> {
    let storage = TestStorage::new().with_init_failures(1);
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let outcome = client.write(Batch::split(generate_points(300), 100)).await?;
    assert_eq!(outcome.rows_written, 300);
    assert_eq!(storage.session_writes(), vec![3]);

    let status = client.status().await?;
    assert_eq!(status.unusable_workers, 1);
    assert_eq!(status.idle_workers, 1);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_no_usable_workers() -> Result<()> {
    let storage = TestStorage::new().with_init_failures(2);
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let err = client
        .write(Batch::split(generate_points(500), 100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestorError::NoUsableWorkers { num_batches: 5 }
    ));
    assert_eq!(storage.storage.num_points().await, 0);

    let status = client.status().await?;
    assert_eq!(status.unusable_workers, 2);
    assert_eq!(status.queued_batches, 0);
    assert_eq!(status.pending_payloads, 0);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_crashed_worker_is_accounted() -> Result<()> {
    let storage = TestStorage::new().with_panicking_batch("p0000");
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let outcome = client.write(Batch::split(generate_points(500), 100)).await?;
    assert_eq!(outcome.rows_written, 400);
    assert_eq!(outcome.rows_failed, 100);
    assert_eq!(outcome.failed_batches, 1);

    let status = client.status().await?;
    assert_eq!(status.active_workers, 0);
    assert_eq!(status.unusable_workers, 1);
    assert_eq!(status.idle_workers, 1);

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_empty_payload() -> Result<()> {
    let (task, client, _ct) = create_worker_pool(TestStorage::new(), 1, 100);

    let outcome = client.write(Vec::new()).await?;
    assert_eq!(outcome, PayloadOutcome::default());

    client.shutdown().await;
    task.await.expect("pool task");

    Ok(())
}

#[tokio::test]
async fn test_shutdown_drains_queue() -> Result<()> {
    let gate = Arc::new(Semaphore::new(0));
    let storage = TestStorage::new().with_gate(gate.clone());
    let (task, client, _ct) = create_worker_pool(storage.clone(), 2, 100);

    let ticket = client.enqueue(Batch::split(generate_points(500), 100))?;
    wait_until(|| storage.in_flight() == 2).await;

    let shutdown = tokio::spawn({
        let client = client.clone();
        async move { client.shutdown().await }
    });

    loop {
        if client.status().await?.draining {
            break;
        }
        tokio::task::yield_now().await;
    }

    let rejected = client.write(Batch::split(generate_points(10), 100)).await;
    assert!(matches!(rejected, Err(IngestorError::ShuttingDown)));

    gate.add_permits(5);

    let outcome = ticket.wait().await?;
    assert_eq!(outcome.rows_written, 500);

    shutdown.await.expect("shutdown task");
    task.await.expect("pool task");

    assert_eq!(storage.storage.num_points().await, 500);
    assert!(matches!(
        client.status().await,
        Err(IngestorError::PoolClosed)
    ));

    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_pool() -> Result<()> {
    let (task, client, ct) = create_worker_pool(TestStorage::new(), 2, 100);

    let outcome = client.write(Batch::split(generate_points(50), 100)).await?;
    assert_eq!(outcome.rows_written, 50);

    ct.cancel();
    task.await.expect("pool task");

    assert!(matches!(
        client.enqueue(Vec::new()),
        Err(IngestorError::PoolClosed)
    ));

    Ok(())
}
