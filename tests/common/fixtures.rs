//! Catalog seeds and archive builders

use flate2::Compression;
use flate2::write::GzEncoder;
use metastudy::db::NewMetadata;
use metastudy::{Database, LabelId, QuestionId};
use std::io::Write;

/// Gzipped tarball holding `files`
pub fn targz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, name, *content)
            .expect("append tar entry");
    }
    let tar = builder.into_inner().expect("finish tar");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar).expect("gzip tar");
    encoder.finish().expect("finish gzip")
}

/// PDF-looking body of `len` bytes
pub fn pdf_body(len: usize) -> Vec<u8> {
    let mut body = b"%PDF-1.5\n".to_vec();
    body.resize(len, b' ');
    body
}

/// Catalog item with the given versions count
pub fn metadata(id: &str, title: &str, versions: u32) -> NewMetadata {
    let versions: Vec<serde_json::Value> = (1..=versions)
        .map(|v| serde_json::json!({"version": format!("v{v}"), "created": "Mon, 1 Jan 2024"}))
        .collect();
    NewMetadata {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: format!("We study {title}."),
        authors: "A. Author".to_string(),
        categories: "cs.SE cs.AI".to_string(),
        versions: serde_json::Value::Array(versions).to_string(),
        update_date: "2024-03-01".to_string(),
        doi: None,
    }
}

/// Seed a label, a question for it and the given items
pub async fn seed_catalog(db: &Database, items: &[NewMetadata]) -> (LabelId, QuestionId) {
    for item in items {
        db.upsert_metadata(item).await.expect("insert metadata");
    }
    let label = db
        .get_or_create_label("code-generation")
        .await
        .expect("create label");
    let question = db
        .insert_question("Is this paper about code generation?", label)
        .await
        .expect("create question");
    (label, question)
}
