use super::{or_empty, split_labels, SampleService, TagService};
use crate::{
    model::{Clock, NewSample, NewTask, Task, TaskDetails, TaskError, TaskFilter, TaskOptions},
    Error,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select,
    TransactionTrait,
};
use sea_query::Expr;
use specimen_common::db::Database;
use specimen_entity::{tag, task, task_error, task_status::Status, task_tag};
use std::{collections::HashMap, path::Path};
use time::OffsetDateTime;
use tracing::instrument;

/// The task queue.
///
/// Workers [`claim`](Self::claim) pending tasks and report progress through
/// [`set_status`](Self::set_status). There is no in-process locking, all coordination happens
/// through conditional updates in the database. So any number of services, in any number of
/// processes, can share the same database.
#[derive(Clone, Debug)]
pub struct TaskService {
    db: Database,
    samples: SampleService,
    tags: TagService,
}

impl TaskService {
    pub fn new(db: Database) -> Self {
        Self {
            samples: SampleService::new(db.clone()),
            tags: TagService::new(db.clone()),
            db,
        }
    }

    pub fn samples(&self) -> &SampleService {
        &self.samples
    }

    pub fn tags(&self) -> &TagService {
        &self.tags
    }

    /// Queue a new task, returning its id.
    ///
    /// The task and its tag associations get stored in a single transaction.
    #[instrument(skip(self, task), fields(target = %task.target, category = %task.category), err)]
    pub async fn submit(&self, task: NewTask) -> Result<i32, Error> {
        task.validate()?;

        let labels = task
            .options
            .tags
            .as_deref()
            .map(split_labels)
            .unwrap_or_default();

        let tx = self.db.begin().await?;

        let mut tag_ids = Vec::with_capacity(labels.len());
        for label in &labels {
            tag_ids.push(self.tags.get_or_create_in(label, &tx).await?);
        }

        let id = insert(&tx, task, tag_ids, OffsetDateTime::now_utc()).await?;

        tx.commit().await?;

        log::info!("Added task {id}");

        Ok(id)
    }

    /// Queue a file, registering it as a sample.
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()), err)]
    pub async fn submit_path(
        &self,
        path: impl AsRef<Path>,
        options: TaskOptions,
    ) -> Result<i32, Error> {
        let path = path.as_ref();

        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(Error::Validation(format!(
                    "'{}' is not a regular file",
                    path.display()
                )))
            }
            Err(err) => {
                return Err(Error::Validation(format!(
                    "unable to access '{}': {err}",
                    path.display()
                )))
            }
        }

        let sample = NewSample::from_path(path).await?;
        let sample_id = self.samples.get_or_create(sample).await?;

        self.submit(NewTask::file(path.display().to_string(), sample_id, options))
            .await
    }

    /// Queue a URL.
    pub async fn submit_url(&self, url: &str, options: TaskOptions) -> Result<i32, Error> {
        self.submit(NewTask::url(url, options)).await
    }

    /// The task [`claim`](Self::claim) would pick next, without claiming it.
    #[instrument(skip(self), err)]
    pub async fn peek(&self) -> Result<Option<Task>, Error> {
        Ok(next_pending(task::Entity::find())
            .one(&self.db)
            .await?
            .map(Task::from))
    }

    /// Claim the next pending task.
    ///
    /// Picks the task with the highest priority, oldest first, and marks it as running. Returns
    /// `None` if there is no pending task.
    #[instrument(skip(self), err)]
    pub async fn claim(&self) -> Result<Option<Task>, Error> {
        loop {
            let Some(candidate) = next_pending(task::Entity::find())
                .select_only()
                .column(task::Column::Id)
                .into_tuple::<i32>()
                .one(&self.db)
                .await?
            else {
                return Ok(None);
            };

            let result = task::Entity::update_many()
                .col_expr(task::Column::Status, Expr::value(Status::Running))
                .col_expr(
                    task::Column::StartedOn,
                    Expr::value(OffsetDateTime::now_utc()),
                )
                .filter(task::Column::Id.eq(candidate))
                .filter(task::Column::Status.eq(Status::Pending))
                .exec(&self.db)
                .await?;

            if result.rows_affected == 0 {
                log::debug!("Task {candidate} was claimed by someone else, retrying");
                continue;
            }

            let task = task::Entity::find_by_id(candidate)
                .one(&self.db)
                .await?
                .ok_or(Error::NotFound(candidate))?;

            log::debug!("Claimed task {candidate}");

            return Ok(Some(task.into()));
        }
    }

    /// Move a task to a new status.
    ///
    /// A task can only become [`Status::Recovered`] through [`reschedule`](Self::reschedule),
    /// which queues its replacement.
    #[instrument(skip(self), err)]
    pub async fn set_status(&self, id: i32, status: Status) -> Result<(), Error> {
        loop {
            let current = task::Entity::find_by_id(id)
                .one(&self.db)
                .await?
                .ok_or(Error::NotFound(id))?;

            if status == Status::Recovered {
                return Err(Error::InvalidTransition {
                    from: current.status,
                    to: status,
                });
            }

            if transition(&self.db, &current, status).await? {
                return Ok(());
            }

            log::debug!("Status of task {id} changed concurrently, re-validating");
        }
    }

    /// Record a diagnostic for a task.
    ///
    /// This is best effort, failing to store the message is only logged.
    #[instrument(skip(self, message))]
    pub async fn add_error(&self, id: i32, message: &str) {
        let entity = task_error::ActiveModel {
            task_id: Set(id),
            message: Set(message.to_string()),
            ..Default::default()
        };

        if let Err(err) = entity.insert(&self.db).await {
            log::warn!("Failed to record error of task {id}: {err}");
        }
    }

    /// Mark a task as recovered, and queue an equivalent new task.
    ///
    /// Returns the id of the new task.
    #[instrument(skip(self), err)]
    pub async fn reschedule(&self, id: i32) -> Result<i32, Error> {
        loop {
            let tx = self.db.begin().await?;

            let current = task::Entity::find_by_id(id)
                .one(&tx)
                .await?
                .ok_or(Error::NotFound(id))?;

            if !transition(&tx, &current, Status::Recovered).await? {
                log::debug!("Status of task {id} changed concurrently, re-validating");
                continue;
            }

            let tag_ids = task_tag::Entity::find()
                .select_only()
                .column(task_tag::Column::TagId)
                .filter(task_tag::Column::TaskId.eq(id))
                .into_tuple::<i32>()
                .all(&tx)
                .await?;

            let task = NewTask {
                target: current.target,
                category: current.category,
                sample_id: current.sample_id,
                options: TaskOptions {
                    timeout: current.timeout,
                    priority: current.priority,
                    package: current.package,
                    options: current.options,
                    custom: current.custom,
                    platform: current.platform,
                    tags: None,
                    memory: current.memory,
                    enforce_timeout: current.enforce_timeout,
                    clock: Some(Clock::Timestamp(current.clock)),
                },
            };

            let new_id = insert(&tx, task, tag_ids, OffsetDateTime::now_utc()).await?;

            tx.commit().await?;

            log::info!("Rescheduled task {id} as {new_id}");

            return Ok(new_id);
        }
    }

    /// Reschedule all tasks which are still marked as running.
    ///
    /// Intended to be called on startup, before any worker claims tasks, to recover work which
    /// was interrupted by a previous shutdown. Returns pairs of the old and the new task id.
    #[instrument(skip(self), err)]
    pub async fn reschedule_running(&self) -> Result<Vec<(i32, i32)>, Error> {
        let running = task::Entity::find()
            .select_only()
            .column(task::Column::Id)
            .filter(task::Column::Status.eq(Status::Running))
            .order_by_asc(task::Column::Id)
            .into_tuple::<i32>()
            .all(&self.db)
            .await?;

        let mut result = Vec::with_capacity(running.len());

        for id in running {
            match self.reschedule(id).await {
                Ok(new_id) => result.push((id, new_id)),
                Err(err @ (Error::NotFound(_) | Error::InvalidTransition { .. })) => {
                    log::info!("Skipping task {id}, it changed in the meantime: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(result)
    }

    /// List tasks, the most recently added first.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: TaskFilter) -> Vec<Task> {
        or_empty(self.try_list(filter).await, "list tasks")
    }

    async fn try_list(&self, filter: TaskFilter) -> Result<Vec<Task>, DbErr> {
        let mut query = task::Entity::find();

        if let Some(status) = filter.status {
            query = query.filter(task::Column::Status.eq(status));
        }
        if let Some(status) = filter.exclude_status {
            query = query.filter(task::Column::Status.ne(status));
        }
        if let Some(category) = filter.category {
            query = query.filter(task::Column::Category.eq(category));
        }

        // SQLite doesn't accept an offset without a limit
        let limit = filter
            .limit
            .or_else(|| filter.offset.map(|_| i64::MAX as u64));

        let mut tasks = query
            .order_by_desc(task::Column::AddedOn)
            .order_by_desc(task::Column::Id)
            .limit(limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect::<Vec<_>>();

        if filter.details {
            load_details(&self.db, &mut tasks).await?;
        }

        Ok(tasks)
    }

    /// Count tasks, optionally only those with a specific status.
    #[instrument(skip(self))]
    pub async fn count(&self, status: Option<Status>) -> u64 {
        let mut query = task::Entity::find();
        if let Some(status) = status {
            query = query.filter(task::Column::Status.eq(status));
        }

        or_empty(query.count(&self.db).await, "count tasks")
    }

    #[instrument(skip(self))]
    pub async fn view(&self, id: i32, details: bool) -> Option<Task> {
        let result = async {
            let mut tasks = task::Entity::find_by_id(id)
                .all(&self.db)
                .await?
                .into_iter()
                .map(Task::from)
                .collect::<Vec<_>>();

            if details {
                load_details(&self.db, &mut tasks).await?;
            }

            Ok::<_, DbErr>(tasks.pop())
        }
        .await;

        or_empty(result, format!("view task {id}"))
    }

    /// Remove a task, including its errors and tag associations. The tags themselves are kept.
    #[instrument(skip(self), err)]
    pub async fn delete(&self, id: i32) -> Result<(), Error> {
        let tx = self.db.begin().await?;

        task_error::Entity::delete_many()
            .filter(task_error::Column::TaskId.eq(id))
            .exec(&tx)
            .await?;
        task_tag::Entity::delete_many()
            .filter(task_tag::Column::TaskId.eq(id))
            .exec(&tx)
            .await?;

        let result = task::Entity::delete_by_id(id).exec(&tx).await?;
        if result.rows_affected == 0 {
            return Err(Error::NotFound(id));
        }

        tx.commit().await?;

        log::info!("Deleted task {id}");

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn view_errors(&self, id: i32) -> Vec<TaskError> {
        let result = task_error::Entity::find()
            .filter(task_error::Column::TaskId.eq(id))
            .order_by_asc(task_error::Column::Id)
            .all(&self.db)
            .await
            .map(|errors| errors.into_iter().map(TaskError::from).collect());

        or_empty(result, format!("view errors of task {id}"))
    }
}

/// Insert a pending task, associated with the provided tags.
async fn insert<C: ConnectionTrait>(
    connection: &C,
    task: NewTask,
    tag_ids: Vec<i32>,
    now: OffsetDateTime,
) -> Result<i32, Error> {
    let NewTask {
        target,
        category,
        sample_id,
        options,
    } = task;

    let timeout = options.normalized_timeout();
    let priority = options.normalized_priority();
    let clock = options
        .clock
        .as_ref()
        .map(|clock| clock.resolve(now))
        .unwrap_or(now);

    let model = task::ActiveModel {
        target: Set(target),
        category: Set(category),
        timeout: Set(timeout),
        priority: Set(priority),
        custom: Set(options.custom),
        package: Set(options.package),
        options: Set(options.options),
        platform: Set(options.platform),
        memory: Set(options.memory),
        enforce_timeout: Set(options.enforce_timeout),
        clock: Set(clock),
        added_on: Set(now),
        started_on: Set(None),
        completed_on: Set(None),
        status: Set(Status::Pending),
        sample_id: Set(sample_id),
        ..Default::default()
    }
    .insert(connection)
    .await?;

    if !tag_ids.is_empty() {
        task_tag::Entity::insert_many(tag_ids.into_iter().map(|tag_id| task_tag::ActiveModel {
            task_id: Set(model.id),
            tag_id: Set(tag_id),
        }))
        .exec_without_returning(connection)
        .await?;
    }

    Ok(model.id)
}

/// Pending tasks, in the order they get claimed.
fn next_pending(query: Select<task::Entity>) -> Select<task::Entity> {
    query
        .filter(task::Column::Status.eq(Status::Pending))
        .order_by_desc(task::Column::Priority)
        .order_by_asc(task::Column::AddedOn)
        .order_by_asc(task::Column::Id)
}

/// Validate and apply a status change.
///
/// The change is conditional on the status of `current`. Returns `false` if the task was changed
/// in the meantime.
async fn transition<C: ConnectionTrait>(
    connection: &C,
    current: &task::Model,
    next: Status,
) -> Result<bool, Error> {
    if !current.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            from: current.status,
            to: next,
        });
    }

    let now = OffsetDateTime::now_utc();

    let mut update = task::Entity::update_many()
        .col_expr(task::Column::Status, Expr::value(next))
        .filter(task::Column::Id.eq(current.id))
        .filter(task::Column::Status.eq(current.status));

    if next == Status::Running && current.started_on.is_none() {
        update = update.col_expr(task::Column::StartedOn, Expr::value(now));
    }
    if next.is_finished() && current.completed_on.is_none() {
        update = update.col_expr(task::Column::CompletedOn, Expr::value(now));
    }

    Ok(update.exec(connection).await?.rows_affected > 0)
}

/// Load tags and errors of all tasks, with one query each.
async fn load_details<C: ConnectionTrait>(connection: &C, tasks: &mut [Task]) -> Result<(), DbErr> {
    if tasks.is_empty() {
        return Ok(());
    }

    let ids = tasks.iter().map(|task| task.id).collect::<Vec<_>>();

    let tags: Vec<(i32, String)> = task_tag::Entity::find()
        .select_only()
        .column(task_tag::Column::TaskId)
        .column(tag::Column::Name)
        .join(JoinType::InnerJoin, task_tag::Relation::Tag.def())
        .filter(task_tag::Column::TaskId.is_in(ids.clone()))
        .order_by_asc(tag::Column::Id)
        .into_tuple()
        .all(connection)
        .await?;

    let errors = task_error::Entity::find()
        .filter(task_error::Column::TaskId.is_in(ids))
        .order_by_asc(task_error::Column::Id)
        .all(connection)
        .await?;

    let mut details = HashMap::<i32, TaskDetails>::new();
    for (task_id, name) in tags {
        details.entry(task_id).or_default().tags.push(name);
    }
    for error in errors {
        details
            .entry(error.task_id)
            .or_default()
            .errors
            .push(error.into());
    }

    for task in tasks {
        task.details = Some(details.remove(&task.id).unwrap_or_default());
    }

    Ok(())
}
