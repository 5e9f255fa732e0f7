//! Integration tests for [`PgResultStore`].
//!
//! Require a PostgreSQL server reachable through `DATABASE_URL`; each test
//! gets a fresh database from `#[sqlx::test]`.

use posewatch_core::types::VideoProcessingResult;
use posewatch_db::repositories::VideoProcessingResultRepo;
use posewatch_pipeline::{PgResultStore, ResultStore};
use sqlx::PgPool;

const TABLE: &str = "video_processing_results";

#[sqlx::test(migrations = false)]
async fn test_first_upsert_creates_table(pool: PgPool) {
    let store = PgResultStore::new(pool.clone(), TABLE);
    assert!(!store.is_table_ready());

    store
        .upsert(&VideoProcessingResult::new("clip1.mp4"))
        .await
        .unwrap();

    assert!(store.is_table_ready());
    let row = VideoProcessingResultRepo::find_by_filename(&pool, TABLE, "clip1.mp4")
        .await
        .unwrap()
        .expect("row written");
    assert_eq!(row.video_filename, "clip1.mp4");
}

#[sqlx::test(migrations = false)]
async fn test_upsert_after_explicit_setup(pool: PgPool) {
    let store = PgResultStore::new(pool.clone(), TABLE);
    store.ensure_table().await.unwrap();
    assert!(store.is_table_ready());

    store
        .upsert(&VideoProcessingResult::new("clip1.mp4"))
        .await
        .unwrap();
    store
        .upsert(&VideoProcessingResult::new("clip1.mp4"))
        .await
        .unwrap();

    assert_eq!(VideoProcessingResultRepo::count(&pool, TABLE).await.unwrap(), 1);
}
