// Reviews survive reopening the database file.

use rusqlite::Connection;
use simplificator_reviews::db::init_db;
use simplificator_reviews::{NewReview, ReviewStats, ReviewStore, Trend};

fn open(path: &std::path::Path) -> ReviewStore {
    let conn = Connection::open(path).unwrap();
    init_db(&conn).unwrap();
    ReviewStore::new(conn)
}

#[test]
fn reviews_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simplificator.db");

    let id = {
        let store = open(&path);
        for score in [9u8, 8] {
            store
                .insert(NewReview {
                    title: "Event sourcing for a blog".into(),
                    code_snippet: "CQRS everywhere".into(),
                    description: "personal blog".into(),
                    score,
                    suggestions: vec!["Write to one table".into()],
                })
                .unwrap();
        }
        store
            .insert(NewReview {
                title: "Static site".into(),
                code_snippet: "index.html".into(),
                description: "personal blog".into(),
                score: 1,
                suggestions: Vec::new(),
            })
            .unwrap()
            .id
    };

    let store = open(&path);
    let reviews = store.list_recent(10).unwrap();
    assert_eq!(reviews.len(), 3);
    assert_eq!(reviews[0].id, id);

    let stats = ReviewStats::from_reviews(&reviews);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.trend, Trend::Improving);
}
