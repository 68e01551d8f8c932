use notes_core::store::{Document, Filter, FindOptions, IndexModel, StoreError};
use notes_core::{
    Database, NewNote, NoteListQuery, NoteRepository, RepoConfig, RepoError, RequestContext,
    StoreConfig, StoreNoteRepository,
};
use serde_json::json;

fn raw_note(title: &str) -> Document {
    match json!({
        "title": title,
        "content": "seeded",
        "createdAt": 1_700_000_000_000_i64,
        "updatedAt": 1_700_000_000_000_i64,
    }) {
        serde_json::Value::Object(document) => document,
        _ => unreachable!(),
    }
}

#[test]
fn construction_creates_title_text_and_expiry_indexes() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let repo = StoreNoteRepository::try_new(&ctx, &db).unwrap();
    assert!(repo.expiry_enabled());

    let names: Vec<String> = repo
        .collection()
        .list_indexes(&ctx)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(
        names,
        vec!["expiresAt_1", "title_1", "title_text_content_text"]
    );
}

#[test]
fn reopening_file_store_is_idempotent_and_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: Some(dir.path().join("notes.sqlite3")),
        expiry_sweep_interval: None,
        ..StoreConfig::default()
    };
    let ctx = RequestContext::background();

    let id = {
        let db = Database::open(&config).unwrap();
        assert_eq!(db.mode(), "file");
        let repo = StoreNoteRepository::try_new(&ctx, &db).unwrap();
        repo.create(&ctx, NewNote::new("persisted", "durable words"))
            .unwrap()
            .id
    };

    let db = Database::open(&config).unwrap();
    let repo = StoreNoteRepository::try_new(&ctx, &db).unwrap();
    let again = StoreNoteRepository::try_new(&ctx, &db).unwrap();
    assert!(repo.expiry_enabled());
    assert!(again.expiry_enabled());

    assert_eq!(repo.by_id(&ctx, &id.to_hex()).unwrap().title, "persisted");
    let hits = repo
        .list(
            &ctx,
            &NoteListQuery {
                search: Some("durable".to_string()),
                limit: 5,
                skip: 0,
            },
        )
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(repo.collection().list_indexes(&ctx).unwrap().len(), 3);
}

#[test]
fn duplicate_titles_block_unique_index() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let collection = db.collection(&ctx, "notes").unwrap();
    collection.insert_one(&ctx, raw_note("twin")).unwrap();
    collection.insert_one(&ctx, raw_note("twin")).unwrap();

    let err = StoreNoteRepository::try_new(&ctx, &db).err().unwrap();
    assert!(err.is_duplicate_key(), "unexpected error: {err}");
}

#[test]
fn conflicting_expiry_index_disables_expiry_only() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let collection = db.collection(&ctx, "notes").unwrap();
    collection
        .create_index(&ctx, &IndexModel::ascending("expiresAt"))
        .unwrap();

    let repo = StoreNoteRepository::try_new(&ctx, &db).unwrap();
    assert!(!repo.expiry_enabled());

    let note = repo.create(&ctx, NewNote::new("still", "works")).unwrap();
    assert_eq!(repo.by_id(&ctx, &note.id.to_hex()).unwrap(), note);
}

#[test]
fn foreign_text_index_aborts_construction() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let collection = db.collection(&ctx, "notes").unwrap();
    collection
        .create_index(&ctx, &IndexModel::text(&["title"]))
        .unwrap();

    let err = StoreNoteRepository::try_new(&ctx, &db).err().unwrap();
    assert!(
        matches!(err, RepoError::Store(StoreError::IndexConflict { .. })),
        "unexpected error: {err}"
    );
}

#[test]
fn text_filter_without_text_index_is_rejected() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let collection = db.collection(&ctx, "plain").unwrap();
    collection.insert_one(&ctx, raw_note("lonely")).unwrap();

    let err = collection
        .find(&ctx, &Filter::Text("lonely".to_string()), &FindOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::TextIndexRequired { .. }));
}

#[test]
fn custom_collection_is_isolated() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    let notes = StoreNoteRepository::try_new(&ctx, &db).unwrap();
    let archive = StoreNoteRepository::with_config(
        &ctx,
        &db,
        &RepoConfig {
            collection: "archive".to_string(),
        },
    )
    .unwrap();

    notes.create(&ctx, NewNote::new("shared", "a")).unwrap();
    archive.create(&ctx, NewNote::new("shared", "b")).unwrap();
    assert_eq!(notes.stats(&ctx).unwrap().count, 1);
    assert_eq!(archive.stats(&ctx).unwrap().count, 1);
    assert_eq!(archive.collection().name(), "archive");
}

#[test]
fn invalid_collection_names_are_rejected() {
    let ctx = RequestContext::background();
    let db = Database::open_in_memory().unwrap();
    for name in ["", "notes__text", "1notes", "drop table"] {
        let err = db.collection(&ctx, name).err().unwrap();
        assert!(matches!(err, StoreError::InvalidRequest(_)), "{name}: {err}");
    }
}
