use notes_core::{Database, NewNote, NoteRepository, NoteStats, RequestContext, StoreNoteRepository};

fn setup() -> StoreNoteRepository {
    let db = Database::open_in_memory().unwrap();
    StoreNoteRepository::try_new(&RequestContext::background(), &db).unwrap()
}

#[test]
fn stats_on_empty_collection_are_zero() {
    let repo = setup();
    let stats = repo.stats(&RequestContext::background()).unwrap();
    assert_eq!(stats, NoteStats::default());
    assert_eq!(stats.count, 0);
    assert_eq!(stats.avg_length, 0.0);
}

#[test]
fn stats_average_content_length() {
    let repo = setup();
    let ctx = RequestContext::background();
    repo.create(&ctx, NewNote::new("a", "abcd")).unwrap();
    repo.create(&ctx, NewNote::new("b", "abcdef")).unwrap();

    let stats = repo.stats(&ctx).unwrap();
    assert_eq!(stats.count, 2);
    assert!((stats.avg_length - 5.0).abs() < f64::EPSILON);
}

#[test]
fn stats_count_characters_not_bytes() {
    let repo = setup();
    let ctx = RequestContext::background();
    repo.create(&ctx, NewNote::new("accent", "héllo")).unwrap();
    repo.create(&ctx, NewNote::new("kanji", "日本")).unwrap();

    let stats = repo.stats(&ctx).unwrap();
    assert_eq!(stats.count, 2);
    assert!((stats.avg_length - 3.5).abs() < f64::EPSILON);
}

#[test]
fn stats_follow_deletes_and_updates() {
    let repo = setup();
    let ctx = RequestContext::background();
    let first = repo.create(&ctx, NewNote::new("one", "xx")).unwrap();
    repo.create(&ctx, NewNote::new("two", "yyyy")).unwrap();

    repo.update(
        &ctx,
        &first.id.to_hex(),
        &notes_core::NotePatch::default().content("zzzzzzzz"),
    )
    .unwrap();
    let stats = repo.stats(&ctx).unwrap();
    assert!((stats.avg_length - 6.0).abs() < f64::EPSILON);

    repo.delete(&ctx, &first.id.to_hex()).unwrap();
    let stats = repo.stats(&ctx).unwrap();
    assert_eq!(stats.count, 1);
    assert!((stats.avg_length - 4.0).abs() < f64::EPSILON);
}

#[test]
fn stats_serialize_with_camel_case_keys() {
    let stats = NoteStats {
        count: 3,
        avg_length: 2.5,
    };
    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["count"], 3);
    assert_eq!(json["avgLength"], 2.5);
}
