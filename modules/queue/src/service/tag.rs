use crate::Error;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
};
use sea_query::OnConflict;
use specimen_common::db::Database;
use specimen_entity::tag;
use tracing::instrument;

/// Registry of tag labels.
#[derive(Clone, Debug)]
pub struct TagService {
    db: Database,
}

impl TagService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get the id of a tag, creating the tag if it doesn't exist yet.
    #[instrument(skip(self), err)]
    pub async fn get_or_create(&self, label: &str) -> Result<i32, Error> {
        self.get_or_create_in(label, &self.db).await
    }

    /// Same as [`Self::get_or_create`], but using the provided connection, which may be a
    /// transaction.
    pub async fn get_or_create_in<C: ConnectionTrait>(
        &self,
        label: &str,
        connection: &C,
    ) -> Result<i32, Error> {
        if label.is_empty() {
            return Err(Error::Validation("empty tag label".into()));
        }

        tag::Entity::insert(tag::ActiveModel {
            name: Set(label.to_string()),
            ..Default::default()
        })
        .on_conflict(OnConflict::column(tag::Column::Name).do_nothing().to_owned())
        .exec_without_returning(connection)
        .await?;

        let tag = tag::Entity::find()
            .filter(tag::Column::Name.eq(label))
            .one(connection)
            .await?
            .ok_or_else(|| Error::Persistence(DbErr::RecordNotFound(format!("tag '{label}'"))))?;

        Ok(tag.id)
    }
}

/// Split a comma separated list of labels.
///
/// Labels get trimmed, empty labels and duplicates are dropped. The order of the first occurrence
/// is kept.
pub fn split_labels(labels: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for label in labels.split(',').map(str::trim) {
        if !label.is_empty() && !result.iter().any(|existing| existing == label) {
            result.push(label.to_string());
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", &[])]
    #[case("foo", &["foo"])]
    #[case("foo,bar", &["foo", "bar"])]
    #[case(" foo , bar ,", &["foo", "bar"])]
    #[case("foo,,foo, bar,foo", &["foo", "bar"])]
    #[case("Foo,foo", &["Foo", "foo"])]
    fn split(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(split_labels(input), expected);
    }
}
