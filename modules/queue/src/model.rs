use serde::{Deserialize, Serialize};
use specimen_common::hashing::{sniff_file_type, sniff_type, Digests};
use specimen_entity::{sample, task, task_category::Category, task_error, task_status::Status};
use std::path::Path;
use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

/// The identity of a submitted binary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: i32,
    pub file_size: i64,
    pub file_type: String,
    pub md5: String,
    pub crc32: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub ssdeep: Option<String>,
}

impl From<sample::Model> for Sample {
    fn from(value: sample::Model) -> Self {
        Self {
            id: value.id,
            file_size: value.file_size,
            file_type: value.file_type,
            md5: value.md5,
            crc32: value.crc32,
            sha1: value.sha1,
            sha256: value.sha256,
            sha512: value.sha512,
            ssdeep: value.ssdeep,
        }
    }
}

/// A sample which is not yet known to the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSample {
    pub file_size: i64,
    pub file_type: String,
    /// lower-case hex
    pub md5: String,
    /// upper-case hex, zero padded to 8 characters
    pub crc32: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub ssdeep: Option<String>,
}

impl NewSample {
    pub fn from_digests(digests: &Digests, file_type: impl Into<String>) -> Self {
        Self {
            file_size: digests.size as i64,
            file_type: file_type.into(),
            md5: digests.md5_hex(),
            crc32: digests.crc32_hex(),
            sha1: digests.sha1_hex(),
            sha256: digests.sha256_hex(),
            sha512: digests.sha512_hex(),
            ssdeep: None,
        }
    }

    pub fn from_bytes(data: impl AsRef<[u8]>) -> Self {
        let data = data.as_ref();
        Self::from_digests(&Digests::digest(data), sniff_type(data))
    }

    /// Compute the identity of a file, streaming its content once.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let digests = Digests::digest_file(path).await?;
        let file_type = sniff_file_type(path).await?;
        Ok(Self::from_digests(&digests, file_type))
    }
}

/// Ways to look up a sample by one of its digests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleLookup {
    Md5(String),
    Sha256(String),
}

/// The virtual wall clock of an analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Clock {
    Timestamp(OffsetDateTime),
    /// A timestamp in the format `MM-DD-YYYY HH:MM:SS`, interpreted as UTC.
    Text(String),
}

impl Clock {
    /// Resolve into a timestamp, falling back to `now` if the text can't be parsed.
    pub fn resolve(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            Self::Timestamp(timestamp) => *timestamp,
            Self::Text(text) => {
                let format = format_description!("[month]-[day]-[year] [hour]:[minute]:[second]");
                match PrimitiveDateTime::parse(text.trim(), format) {
                    Ok(timestamp) => timestamp.assume_utc(),
                    Err(err) => {
                        log::warn!("Invalid clock value '{text}', using the current time: {err}");
                        now
                    }
                }
            }
        }
    }
}

impl From<OffsetDateTime> for Clock {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

/// Submission options, shared by all kinds of targets.
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
    /// analysis timeout in seconds, values `<= 0` mean "package default"
    pub timeout: i32,
    /// higher values get claimed first, values `<= 0` are treated as `1`
    pub priority: i32,
    pub package: Option<String>,
    pub options: Option<String>,
    pub custom: Option<String>,
    pub platform: Option<String>,
    /// comma separated list of tag labels
    pub tags: Option<String>,
    pub memory: bool,
    pub enforce_timeout: bool,
    /// defaults to the time of submission
    pub clock: Option<Clock>,
}

impl TaskOptions {
    pub(crate) fn normalized_timeout(&self) -> i32 {
        self.timeout.max(0)
    }

    pub(crate) fn normalized_priority(&self) -> i32 {
        if self.priority <= 0 {
            1
        } else {
            self.priority
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewTask {
    pub target: String,
    pub category: Category,
    pub sample_id: Option<i32>,
    pub options: TaskOptions,
}

impl NewTask {
    pub fn file(target: impl Into<String>, sample_id: i32, options: TaskOptions) -> Self {
        Self {
            target: target.into(),
            category: Category::File,
            sample_id: Some(sample_id),
            options,
        }
    }

    pub fn url(target: impl Into<String>, options: TaskOptions) -> Self {
        Self {
            target: target.into(),
            category: Category::Url,
            sample_id: None,
            options,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), crate::Error> {
        if self.target.trim().is_empty() {
            return Err(crate::Error::Validation("empty target".into()));
        }

        match (self.category, self.sample_id) {
            (Category::File, None) => Err(crate::Error::Validation(
                "file tasks require a sample".into(),
            )),
            (Category::Url, Some(_)) => Err(crate::Error::Validation(
                "url tasks must not reference a sample".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub id: i32,
    pub task_id: i32,
    pub message: String,
}

impl From<task_error::Model> for TaskError {
    fn from(value: task_error::Model) -> Self {
        Self {
            id: value.id,
            task_id: value.task_id,
            message: value.message,
        }
    }
}

/// Associated information, only loaded on request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    pub tags: Vec<String>,
    pub errors: Vec<TaskError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i32,
    pub target: String,
    pub category: Category,
    pub timeout: i32,
    pub priority: i32,
    pub custom: Option<String>,
    pub package: Option<String>,
    pub options: Option<String>,
    pub platform: Option<String>,
    pub memory: bool,
    pub enforce_timeout: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub clock: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub added_on: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_on: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_on: Option<OffsetDateTime>,
    pub status: Status,
    pub sample_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TaskDetails>,
}

impl From<task::Model> for Task {
    fn from(value: task::Model) -> Self {
        Self {
            id: value.id,
            target: value.target,
            category: value.category,
            timeout: value.timeout,
            priority: value.priority,
            custom: value.custom,
            package: value.package,
            options: value.options,
            platform: value.platform,
            memory: value.memory,
            enforce_timeout: value.enforce_timeout,
            clock: value.clock,
            added_on: value.added_on,
            started_on: value.started_on,
            completed_on: value.completed_on,
            status: value.status,
            sample_id: value.sample_id,
            details: None,
        }
    }
}

/// Criteria for listing tasks.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub exclude_status: Option<Status>,
    pub category: Option<Category>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// also load tags and errors
    pub details: bool,
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[test]
    fn clock_from_text() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            Clock::Text("01-02-2013 04:05:06".into()).resolve(now),
            datetime!(2013-01-02 04:05:06 UTC)
        );
    }

    #[rstest]
    #[case("2013-01-02 04:05:06")]
    #[case("13-02-2013 04:05:06")]
    #[case("tomorrow")]
    #[case("")]
    fn clock_fallback(#[case] text: &str) {
        let now = OffsetDateTime::now_utc();
        assert_eq!(Clock::Text(text.into()).resolve(now), now);
    }

    #[rstest]
    #[case(0, 0, 0, 1)]
    #[case(-5, -1, 0, 1)]
    #[case(30, 3, 30, 3)]
    fn normalize(
        #[case] timeout: i32,
        #[case] priority: i32,
        #[case] expected_timeout: i32,
        #[case] expected_priority: i32,
    ) {
        let options = TaskOptions {
            timeout,
            priority,
            ..Default::default()
        };
        assert_eq!(options.normalized_timeout(), expected_timeout);
        assert_eq!(options.normalized_priority(), expected_priority);
    }

    #[test]
    fn validate() {
        assert!(NewTask::url("http://example.com", Default::default())
            .validate()
            .is_ok());
        assert!(NewTask::url("  ", Default::default()).validate().is_err());
        assert!(NewTask::file("/tmp/sample", 1, Default::default())
            .validate()
            .is_ok());

        let mut task = NewTask::file("/tmp/sample", 1, Default::default());
        task.sample_id = None;
        assert!(matches!(task.validate(), Err(crate::Error::Validation(_))));

        let mut task = NewTask::url("http://example.com", Default::default());
        task.sample_id = Some(1);
        assert!(matches!(task.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn sample_from_bytes() {
        let sample = NewSample::from_bytes(b"Hello World");
        assert_eq!(sample.file_size, 11);
        assert_eq!(sample.crc32, "4A17B156");
        assert_eq!(sample.md5, "b10a8db164e0754105b7a99be72e3fe5");
        assert_eq!(sample.sha512.len(), 128);
    }
}
