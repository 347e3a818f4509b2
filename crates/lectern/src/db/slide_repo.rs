//! Slide repository — the generated deck for a session.
//!
//! Slide content is stored as a JSON array of bullet strings; confidence
//! data is an opaque JSON blob carried through from transcription.

use rusqlite::{params, Row};
use serde_json::Value;

use super::{Database, DatabaseError};

/// A stored slide row.
#[derive(Debug, Clone)]
pub struct SlideRow {
    pub id: i64,
    pub session_id: String,
    pub slide_number: i64,
    pub title: String,
    /// JSON array of bullet strings, as stored.
    pub content: String,
    /// Optional JSON blob, as stored.
    pub confidence_data: Option<String>,
    pub created_at: String,
}

impl SlideRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            slide_number: row.get("slide_number")?,
            title: row.get("title")?,
            content: row.get("content")?,
            confidence_data: row.get("confidence_data")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Decodes the stored content JSON into bullet lines. Rows written by
    /// this crate always hold an array of strings; anything else decodes
    /// to an empty list.
    pub fn bullets(&self) -> Vec<String> {
        match serde_json::from_str::<Value>(&self.content) {
            Ok(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A slide about to be written.
#[derive(Debug, Clone)]
pub struct NewSlide {
    pub slide_number: i64,
    pub title: String,
    pub content: Vec<String>,
    pub confidence_data: Option<Value>,
}

/// Replaces the whole deck for a session atomically. Readers either see
/// the complete old deck or the complete new one, never a mix.
pub fn replace_for_session(
    db: &Database,
    session_id: &str,
    slides: &[NewSlide],
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_tx(|tx| {
        tx.execute(
            "DELETE FROM slides WHERE session_id = ?1",
            params![session_id],
        )?;

        let mut stmt = tx.prepare(
            "INSERT INTO slides (session_id, slide_number, title, content, confidence_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for slide in slides {
            // Serializing a list of strings cannot realistically fail.
            let content_json = serde_json::to_string(&slide.content)
                .unwrap_or_else(|_| "[]".to_string());
            let confidence_json = slide
                .confidence_data
                .as_ref()
                .map(|v| v.to_string());
            stmt.execute(params![
                session_id,
                slide.slide_number,
                slide.title,
                content_json,
                confidence_json,
                now,
            ])?;
        }

        Ok(slides.len())
    })
}

/// Lists the deck for a session in presentation order.
pub fn list_for_session(db: &Database, session_id: &str) -> Result<Vec<SlideRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM slides WHERE session_id = ?1 ORDER BY slide_number ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], SlideRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_for_session(db: &Database, session_id: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM slides WHERE session_id = ?1",
            params![session_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::session_repo;
    use serde_json::json;

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        session_repo::insert(&db, "s1", Some("Test lecture"), "2026-01-01T00:00:00+00:00")
            .unwrap();
        db
    }

    fn slide(n: i64, title: &str) -> NewSlide {
        NewSlide {
            slide_number: n,
            title: title.to_string(),
            content: vec![format!("Point {}a", n), format!("Point {}b", n)],
            confidence_data: None,
        }
    }

    #[test]
    fn test_replace_and_list() {
        let db = seeded_db();
        let written = replace_for_session(
            &db,
            "s1",
            &[slide(1, "Intro"), slide(2, "Body"), slide(3, "Summary")],
            "2026-01-01T00:10:00+00:00",
        )
        .unwrap();
        assert_eq!(written, 3);

        let deck = list_for_session(&db, "s1").unwrap();
        assert_eq!(deck.len(), 3);
        assert_eq!(deck[0].slide_number, 1);
        assert_eq!(deck[0].title, "Intro");
        assert_eq!(deck[2].title, "Summary");
        assert_eq!(deck[1].bullets(), vec!["Point 2a", "Point 2b"]);
    }

    #[test]
    fn test_replace_discards_previous_deck() {
        let db = seeded_db();
        replace_for_session(
            &db,
            "s1",
            &[slide(1, "Old 1"), slide(2, "Old 2")],
            "2026-01-01T00:10:00+00:00",
        )
        .unwrap();
        replace_for_session(
            &db,
            "s1",
            &[slide(1, "New 1")],
            "2026-01-01T00:20:00+00:00",
        )
        .unwrap();

        let deck = list_for_session(&db, "s1").unwrap();
        assert_eq!(deck.len(), 1);
        assert_eq!(deck[0].title, "New 1");
    }

    #[test]
    fn test_replace_with_empty_deck_clears() {
        let db = seeded_db();
        replace_for_session(&db, "s1", &[slide(1, "Only")], "2026-01-01T00:10:00+00:00")
            .unwrap();
        replace_for_session(&db, "s1", &[], "2026-01-01T00:20:00+00:00").unwrap();
        assert_eq!(count_for_session(&db, "s1").unwrap(), 0);
    }

    #[test]
    fn test_confidence_data_round_trip() {
        let db = seeded_db();
        let mut s = slide(1, "With confidence");
        s.confidence_data = Some(json!({"low_confidence_words": [{"word": "eigen", "confidence": 0.42}]}));
        replace_for_session(&db, "s1", &[s], "2026-01-01T00:10:00+00:00").unwrap();

        let deck = list_for_session(&db, "s1").unwrap();
        let stored: Value =
            serde_json::from_str(deck[0].confidence_data.as_deref().unwrap()).unwrap();
        assert_eq!(stored["low_confidence_words"][0]["word"], "eigen");
    }

    #[test]
    fn test_duplicate_slide_number_rejected_and_rolled_back() {
        let db = seeded_db();
        let result = replace_for_session(
            &db,
            "s1",
            &[slide(1, "A"), slide(1, "B")],
            "2026-01-01T00:10:00+00:00",
        );
        assert!(result.is_err());
        // Whole write rolled back, not just the second insert.
        assert_eq!(count_for_session(&db, "s1").unwrap(), 0);
    }

    #[test]
    fn test_deleting_session_cascades_to_slides() {
        let db = seeded_db();
        replace_for_session(&db, "s1", &[slide(1, "A")], "2026-01-01T00:10:00+00:00")
            .unwrap();
        db.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = 's1'", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(count_for_session(&db, "s1").unwrap(), 0);
    }
}
