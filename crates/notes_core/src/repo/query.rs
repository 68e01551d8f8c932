//! List/cursor parameters to store-native filter and find options.
//!
//! # Invariants
//! - Limits outside `1..=NOTES_LIMIT_MAX` become `NOTES_DEFAULT_LIMIT`, for
//!   offset and cursor listing alike.
//! - Blank search text applies no text filter.
//! - An unparsable cursor applies no cursor filter.

use crate::model::note::NoteId;
use crate::store::{FindOptions, Filter, SortDirection, SortKey};
use log::debug;

pub const NOTES_DEFAULT_LIMIT: u64 = 20;
pub const NOTES_LIMIT_MAX: u64 = 200;

/// Offset pagination parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteListQuery {
    /// Optional `$search` text over title and content.
    pub search: Option<String>,
    /// Page size; `<= 0` or `> 200` falls back to 20.
    pub limit: i64,
    /// Number of newest notes to skip.
    pub skip: u64,
}

/// Cursor pagination parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteCursorQuery {
    pub search: Option<String>,
    /// Hex id of the last note of the previous page.
    pub after: Option<String>,
    /// Page size; `<= 0` or `> 200` falls back to 20.
    pub limit: i64,
}

/// Normalizes a requested page size.
pub fn normalize_limit(limit: i64) -> u64 {
    if limit <= 0 || limit as u64 > NOTES_LIMIT_MAX {
        NOTES_DEFAULT_LIMIT
    } else {
        limit as u64
    }
}

/// Builds the `createdAt`-descending page for [`NoteListQuery`].
pub fn build_list_query(query: &NoteListQuery) -> (Filter, FindOptions) {
    let filter = Filter::and(search_filter(query.search.as_deref()).into_iter().collect());
    let options = FindOptions {
        sort: vec![
            SortKey::field("createdAt", SortDirection::Descending),
            SortKey::id(SortDirection::Descending),
        ],
        skip: query.skip,
        limit: Some(normalize_limit(query.limit)),
    };
    (filter, options)
}

/// Builds the `_id`-descending page for [`NoteCursorQuery`].
pub fn build_cursor_query(query: &NoteCursorQuery) -> (Filter, FindOptions) {
    let mut parts = Vec::new();
    if let Some(after) = query.after.as_deref().filter(|after| !after.is_empty()) {
        match NoteId::parse_hex(after) {
            Ok(cursor) => parts.push(Filter::IdLt(cursor)),
            Err(_) => debug!(
                "event=note_list_cursor module=repo status=cursor_ignored cursor_len={}",
                after.len()
            ),
        }
    }
    parts.extend(search_filter(query.search.as_deref()));

    let options = FindOptions {
        sort: vec![SortKey::id(SortDirection::Descending)],
        skip: 0,
        limit: Some(normalize_limit(query.limit)),
    };
    (Filter::and(parts), options)
}

fn search_filter(search: Option<&str>) -> Option<Filter> {
    search
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| Filter::Text(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{
        build_cursor_query, build_list_query, normalize_limit, NoteCursorQuery, NoteListQuery,
    };
    use crate::store::{Filter, ObjectId, SortDirection, SortKey};

    #[test]
    fn limit_defaults_outside_accepted_range() {
        assert_eq!(normalize_limit(0), 20);
        assert_eq!(normalize_limit(-5), 20);
        assert_eq!(normalize_limit(500), 20);
        assert_eq!(normalize_limit(201), 20);
        assert_eq!(normalize_limit(200), 200);
        assert_eq!(normalize_limit(50), 50);
        assert_eq!(normalize_limit(1), 1);
    }

    #[test]
    fn list_query_sorts_newest_first_and_keeps_skip() {
        let (filter, options) = build_list_query(&NoteListQuery {
            search: Some("  rust  ".to_string()),
            limit: 10,
            skip: 30,
        });
        assert_eq!(filter, Filter::Text("rust".to_string()));
        assert_eq!(options.skip, 30);
        assert_eq!(options.limit, Some(10));
        assert_eq!(
            options.sort[0],
            SortKey::field("createdAt", SortDirection::Descending)
        );
    }

    #[test]
    fn blank_search_applies_no_filter() {
        let (filter, _) = build_list_query(&NoteListQuery {
            search: Some("   ".to_string()),
            ..NoteListQuery::default()
        });
        assert_eq!(filter, Filter::All);
    }

    #[test]
    fn cursor_query_composes_cursor_and_search() {
        let cursor = ObjectId::new();
        let (filter, options) = build_cursor_query(&NoteCursorQuery {
            search: Some("mongo".to_string()),
            after: Some(cursor.to_hex()),
            limit: 0,
        });
        assert_eq!(
            filter,
            Filter::And(vec![Filter::IdLt(cursor), Filter::Text("mongo".to_string())])
        );
        assert_eq!(options.sort, vec![SortKey::id(SortDirection::Descending)]);
        assert_eq!(options.limit, Some(20));
    }

    #[test]
    fn unparsable_cursor_is_ignored() {
        let (filter, _) = build_cursor_query(&NoteCursorQuery {
            search: None,
            after: Some("not-a-cursor".to_string()),
            limit: 5,
        });
        assert_eq!(filter, Filter::All);
    }
}
