// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::db::{Database, NewMetadata};
use tempfile::NamedTempFile;


/// Fresh database in a temp file; keep the file handle alive for the test
async fn temp_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

fn metadata(id: &str, categories: &str, update_date: &str) -> NewMetadata {
    NewMetadata {
        id: id.to_string(),
        title: format!("Title of {id}"),
        abstract_text: format!("Abstract of {id}"),
        authors: "A. Author".to_string(),
        categories: categories.to_string(),
        versions: r#"[{"version": "v1"}]"#.to_string(),
        update_date: update_date.to_string(),
        doi: None,
    }
}
