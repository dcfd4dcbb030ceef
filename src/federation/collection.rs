//! Collection pagination
//!
//! One builder turns any homogeneous slice of mapped entities into an
//! ordered collection document. Without a requested page it emits the
//! base collection; with one it emits a page that links `next` only when
//! the count reaches past the following page boundary and `prev` only
//! past the first page.

use serde::Serialize;

use crate::domain::Page;
use crate::error::{AppError, Result};
use crate::federation::vocab::{Collection, CollectionType};

/// Build the collection document for `base_iri`
///
/// `total` is the full count across all pages; `items` is the single
/// page worth of already-mapped wire values. A `page` of `None` renders
/// the base OrderedCollection carrying only `totalItems` and `first`.
pub fn build_collection<T: Serialize>(
    base_iri: &str,
    items: &[T],
    total: u64,
    page: Option<Page>,
) -> Result<Collection> {
    let ordered_items = items
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::NotValid(format!("unserializable collection item: {e}")))?;

    let paged = page.filter(|p| p.requested());

    let mut col = Collection {
        kind: match paged {
            Some(_) => CollectionType::OrderedCollectionPage,
            None => CollectionType::OrderedCollection,
        },
        id: match paged {
            Some(p) => format!("{base_iri}{}", p.query_string()),
            None => base_iri.to_string(),
        },
        total_items: total,
        ordered_items,
        first: None,
        next: None,
        prev: None,
        part_of: None,
    };

    if total > 0 || !col.ordered_items.is_empty() {
        if let Some(p) = paged {
            col.part_of = Some(base_iri.to_string());
            col.first = Some(format!("{base_iri}{}", p.first().query_string()));
            if total > u64::from(p.page + 1) * u64::from(p.size) {
                col.next = Some(format!("{base_iri}{}", p.next().query_string()));
            }
            if p.page > 1 {
                col.prev = Some(format!("{base_iri}{}", p.prev().query_string()));
            }
        } else {
            col.first = Some(format!(
                "{base_iri}{}",
                Page::new(1, 0).query_string()
            ));
        }
    }

    Ok(col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_collection_carries_count_and_first() {
        let col = build_collection("https://local.example/api/self/outbox", &[1, 2, 3], 3, None)
            .unwrap();
        assert_eq!(col.kind, CollectionType::OrderedCollection);
        assert_eq!(col.total_items, 3);
        assert_eq!(
            col.first.as_deref(),
            Some("https://local.example/api/self/outbox?page=1")
        );
        assert!(col.next.is_none());
        assert!(col.prev.is_none());
    }

    #[test]
    fn middle_page_links_both_neighbors() {
        // 200 items, 50 per page: beyond page 2 a full further page
        // remains, so both neighbors exist
        let items: Vec<u32> = (51..=100).collect();
        let col = build_collection(
            "https://local.example/api/self/outbox",
            &items,
            200,
            Some(Page::new(2, 50)),
        )
        .unwrap();
        assert_eq!(col.kind, CollectionType::OrderedCollectionPage);
        assert_eq!(
            col.id,
            "https://local.example/api/self/outbox?page=2"
        );
        assert_eq!(
            col.next.as_deref(),
            Some("https://local.example/api/self/outbox?page=3")
        );
        assert_eq!(
            col.prev.as_deref(),
            Some("https://local.example/api/self/outbox?page=1")
        );
        assert_eq!(
            col.part_of.as_deref(),
            Some("https://local.example/api/self/outbox")
        );
    }

    #[test]
    fn first_page_has_no_prev() {
        let items: Vec<u32> = (1..=50).collect();
        let col = build_collection(
            "https://local.example/api/self/outbox",
            &items,
            120,
            Some(Page::new(1, 50)),
        )
        .unwrap();
        assert!(col.prev.is_none());
        assert!(col.next.is_some());
    }

    #[test]
    fn last_page_has_no_next() {
        let items: Vec<u32> = (101..=120).collect();
        let col = build_collection(
            "https://local.example/api/self/outbox",
            &items,
            120,
            Some(Page::new(3, 50)),
        )
        .unwrap();
        assert!(col.next.is_none());
        assert!(col.prev.is_some());
    }

    #[test]
    fn exact_boundary_page_has_no_next() {
        // 100 items over 2 pages of 50: page 2 is the last
        let items: Vec<u32> = (51..=100).collect();
        let col = build_collection(
            "https://local.example/api/self/outbox",
            &items,
            100,
            Some(Page::new(2, 50)),
        )
        .unwrap();
        assert!(col.next.is_none());
    }

    #[test]
    fn empty_collection_has_no_navigation() {
        let col = build_collection::<u32>("https://local.example/api/self/liked", &[], 0, None)
            .unwrap();
        assert_eq!(col.total_items, 0);
        assert!(col.first.is_none());
    }
}
