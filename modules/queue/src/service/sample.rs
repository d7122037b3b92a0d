use super::or_empty;
use crate::{
    model::{NewSample, Sample, SampleLookup},
    Error,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter,
};
use specimen_common::db::{Database, DatabaseErrors};
use specimen_entity::sample;
use tracing::instrument;

/// Registry of submitted binaries, deduplicated by their content digests.
#[derive(Clone, Debug)]
pub struct SampleService {
    db: Database,
}

impl SampleService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a sample, returning the id of the existing row if the same content is already
    /// known.
    #[instrument(skip(self, sample), fields(sha256 = %sample.sha256), err)]
    pub async fn get_or_create(&self, sample: NewSample) -> Result<i32, Error> {
        let entity = sample::ActiveModel {
            file_size: Set(sample.file_size),
            file_type: Set(sample.file_type.clone()),
            md5: Set(sample.md5.clone()),
            crc32: Set(sample.crc32.clone()),
            sha1: Set(sample.sha1.clone()),
            sha256: Set(sample.sha256.clone()),
            sha512: Set(sample.sha512.clone()),
            ssdeep: Set(sample.ssdeep.clone()),
            ..Default::default()
        };

        match entity.insert(&self.db).await {
            Ok(model) => Ok(model.id),
            Err(err) if err.is_duplicate() => {
                log::debug!("Sample {} already registered", sample.sha256);
                // someone else inserted the same content, use theirs
                match find_by_digests(&self.db, &sample).await? {
                    Some(existing) => Ok(existing.id),
                    None => Err(Error::Persistence(DbErr::RecordNotFound(format!(
                        "sample {}",
                        sample.sha256
                    )))),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn view(&self, id: i32) -> Option<Sample> {
        or_empty(
            sample::Entity::find_by_id(id).one(&self.db).await,
            format!("view sample {id}"),
        )
        .map(Sample::from)
    }

    #[instrument(skip(self))]
    pub async fn find(&self, lookup: SampleLookup) -> Option<Sample> {
        let query = match &lookup {
            SampleLookup::Md5(md5) => {
                sample::Entity::find().filter(sample::Column::Md5.eq(md5.to_lowercase()))
            }
            SampleLookup::Sha256(sha256) => {
                sample::Entity::find().filter(sample::Column::Sha256.eq(sha256.to_lowercase()))
            }
        };

        or_empty(
            query.one(&self.db).await,
            format!("search sample {lookup:?}"),
        )
        .map(Sample::from)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> u64 {
        or_empty(
            sample::Entity::find().count(&self.db).await,
            "count samples",
        )
    }
}

async fn find_by_digests<C: ConnectionTrait>(
    db: &C,
    sample: &NewSample,
) -> Result<Option<sample::Model>, DbErr> {
    sample::Entity::find()
        .filter(sample::Column::Md5.eq(&sample.md5))
        .filter(sample::Column::Crc32.eq(&sample.crc32))
        .filter(sample::Column::Sha1.eq(&sample.sha1))
        .filter(sample::Column::Sha256.eq(&sample.sha256))
        .filter(sample::Column::Sha512.eq(&sample.sha512))
        .one(db)
        .await
}
