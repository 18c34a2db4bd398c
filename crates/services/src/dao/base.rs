use bson::Document;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Collection, Database};
use serde::{Serialize, de::DeserializeOwned};

#[derive(Debug, thiserror::Error)]
pub enum DaoError {
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Mongo error: {0}")]
    Mongo(mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

impl From<mongodb::error::Error> for DaoError {
    fn from(err: mongodb::error::Error) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(ref we)) = *err.kind
            && we.code == 11000
        {
            return DaoError::DuplicateKey(we.message.clone());
        }
        DaoError::Mongo(err)
    }
}

pub type DaoResult<T> = Result<T, DaoError>;

/// Typed access to one collection.
pub struct BaseDao<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin,
{
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin,
{
    pub fn new(db: &Database, name: &str) -> Self {
        Self {
            collection: db.collection::<T>(name),
        }
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    /// Updates the first match or inserts a new document built from the
    /// filter and `$setOnInsert`. Returns true when a document was inserted.
    pub async fn upsert_one(&self, filter: Document, update: Document) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(filter, update)
            .upsert(true)
            .await?;
        Ok(result.upserted_id.is_some())
    }
}
