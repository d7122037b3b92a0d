//! Testing concurrent workers claiming tasks

use futures::future::join_all;
use specimen_entity::task_status::Status;
use specimen_module_queue::{model::TaskOptions, service::TaskService};
use specimen_test_context::SpecimenContext;
use std::collections::HashSet;
use test_context::test_context;
use test_log::test;

/// Every task must be handed out exactly once, no matter how many workers compete for it.
#[test_context(SpecimenContext)]
#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn exclusive_claim(ctx: &SpecimenContext) -> Result<(), anyhow::Error> {
    const TASKS: usize = 30;
    const WORKERS: usize = 6;

    let service = TaskService::new(ctx.db.clone());

    let mut submitted = HashSet::new();
    for i in 0..TASKS {
        let id = service
            .submit_url(
                &format!("http://example.com/{i}"),
                TaskOptions {
                    priority: (i % 3) as i32 + 1,
                    ..Default::default()
                },
            )
            .await?;
        submitted.insert(id);
    }

    let workers = (0..WORKERS).map(|_| {
        let service = service.clone();
        tokio::spawn(async move {
            let mut claimed = vec![];
            while let Some(task) = service.claim().await? {
                claimed.push(task.id);
                service.set_status(task.id, Status::Completed).await?;
            }
            Ok::<_, anyhow::Error>(claimed)
        })
    });

    let mut claimed = vec![];
    for result in join_all(workers).await {
        claimed.extend(result??);
    }

    let unique = claimed.iter().copied().collect::<HashSet<_>>();

    assert_eq!(claimed.len(), TASKS, "no task must be claimed twice");
    assert_eq!(unique, submitted);
    assert_eq!(service.count(Some(Status::Completed)).await, TASKS as u64);
    assert!(service.claim().await?.is_none());

    Ok(())
}
