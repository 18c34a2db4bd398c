use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::TranslationPreferencesDoc;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Translation preferences: one document per user
    create_indexes(
        db,
        TranslationPreferencesDoc::COLLECTION,
        vec![
            index_unique(bson::doc! { "user_id": 1 }),
            index(bson::doc! { "updated_at": -1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    coll.create_indexes(indexes).await?;
    Ok(())
}
