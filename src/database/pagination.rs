use serde::Serialize;
use serde_json::Value;

use crate::config::CONFIG;
use crate::database::document::Document;
use crate::database::store::{DatabaseError, DocumentStore, FindOptions};
use crate::filter::{FilterError, FilterOrder, FilterOrderInfo};

/// Page request parsed from list `options`
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub page: u64,
    pub limit: u64,
    pub pagination: bool,
    pub sort: Vec<FilterOrderInfo>,
}

impl PageOptions {
    /// Reads `page`, `limit`, `pagination` and `sort`; `select` and
    /// `populate` are applied on output.
    pub fn from_options(options: &Value) -> Result<Self, FilterError> {
        let api = &CONFIG.api;
        let page = options.get("page").and_then(Value::as_u64).filter(|p| *p > 0).unwrap_or(1);
        let limit = options
            .get("limit")
            .and_then(Value::as_u64)
            .filter(|l| *l > 0)
            .unwrap_or(api.default_page_limit)
            .min(api.max_page_limit);
        let pagination = options.get("pagination").and_then(Value::as_bool).unwrap_or(true);
        let sort = match options.get("sort") {
            Some(sort) => FilterOrder::validate_and_parse(sort)?,
            None => vec![],
        };
        Ok(Self { page, limit, pagination, sort })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginator {
    pub item_count: u64,
    pub per_page: u64,
    pub page_count: u64,
    pub current_page: u64,
    pub sl_no: u64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

impl Paginator {
    pub fn new(item_count: u64, per_page: u64, current_page: u64) -> Self {
        let page_count = if per_page == 0 { 1 } else { item_count.div_ceil(per_page).max(1) };
        let has_prev_page = current_page > 1;
        let has_next_page = current_page < page_count;
        Self {
            item_count,
            per_page,
            page_count,
            current_page,
            sl_no: current_page.saturating_sub(1).saturating_mul(per_page).saturating_add(1),
            has_prev_page,
            has_next_page,
            prev: has_prev_page.then(|| current_page - 1),
            next: has_next_page.then(|| current_page + 1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub docs: Vec<Document>,
    pub paginator: Paginator,
}

/// Count, then fetch the requested page
pub async fn paginate(
    store: &dyn DocumentStore,
    collection: &str,
    query: &Value,
    options: &PageOptions,
) -> Result<Page, DatabaseError> {
    let item_count = store.count(collection, query).await?;

    let (page, per_page, find) = if options.pagination {
        let skip = options.page.saturating_sub(1).saturating_mul(options.limit);
        if skip >= item_count {
            return Ok(Page { docs: vec![], paginator: Paginator::new(item_count, options.limit, options.page) });
        }
        let find = FindOptions {
            sort: options.sort.clone(),
            skip,
            limit: Some(options.limit),
        };
        (options.page, options.limit, find)
    } else {
        let find = FindOptions { sort: options.sort.clone(), skip: 0, limit: None };
        (1, item_count.max(1), find)
    };

    let docs = store.find(collection, query, &find).await?;
    Ok(Page { docs, paginator: Paginator::new(item_count, per_page, page) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::json;

    #[test]
    fn paginator_middle_page() {
        let p = Paginator::new(25, 10, 2);
        assert_eq!(p.page_count, 3);
        assert_eq!(p.sl_no, 11);
        assert_eq!((p.prev, p.next), (Some(1), Some(3)));
        assert!(p.has_prev_page && p.has_next_page);
    }

    #[test]
    fn paginator_huge_page_saturates() {
        let p = Paginator::new(3, 10, u64::MAX);
        assert_eq!(p.sl_no, u64::MAX);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(u64::MAX - 1));
    }

    #[test]
    fn paginator_empty_result_has_one_page() {
        let p = Paginator::new(0, 10, 1);
        assert_eq!(p.page_count, 1);
        assert!(!p.has_next_page);
        assert_eq!(p.next, None);
    }

    #[test]
    fn options_fall_back_to_defaults() {
        let opts = PageOptions::from_options(&json!({ "page": 0, "sort": { "sequence": -1 } })).unwrap();
        assert_eq!(opts.page, 1);
        assert_eq!(opts.limit, CONFIG.api.default_page_limit);
        assert!(opts.pagination);
        assert_eq!(opts.sort.len(), 1);
    }

    #[tokio::test]
    async fn paginates_sorted_results() {
        let store = MemoryStore::new();
        for (i, seq) in [3, 1, 2].iter().enumerate() {
            let doc = json!({ "_id": format!("m{}", i), "sequence": seq });
            store.insert_one("master", doc.as_object().cloned().unwrap()).await.unwrap();
        }
        let opts = PageOptions::from_options(&json!({ "limit": 2, "page": 2, "sort": "sequence" })).unwrap();
        let page = paginate(&store, "master", &json!({}), &opts).await.unwrap();
        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.docs[0]["sequence"], json!(3));
        assert_eq!(page.paginator.item_count, 3);

        let past_end = PageOptions::from_options(&json!({ "page": i64::MAX, "limit": 10 })).unwrap();
        let page = paginate(&store, "master", &json!({}), &past_end).await.unwrap();
        assert!(page.docs.is_empty());
        assert_eq!(page.paginator.item_count, 3);
        assert!(!page.paginator.has_next_page);

        let all = PageOptions::from_options(&json!({ "pagination": false })).unwrap();
        let page = paginate(&store, "master", &json!({}), &all).await.unwrap();
        assert_eq!(page.docs.len(), 3);
        assert_eq!(page.paginator.page_count, 1);
    }
}
