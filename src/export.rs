//! Export engine: the cached full dump, locale(+tag) JSON pages, and flat
//! bundles, plus the gateway that runs the dump off the request context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::ExportCache;
use crate::db::{ExportRow, KeyContent, Store, Tag};
use crate::error::{ServiceError, ServiceResult};
use crate::query::{PageRequest, PageResult};

/// One page of the full export; this is the unit the result cache stores.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAllPage {
    pub translations: Vec<ExportRow>,
    pub current_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

/// Page plus the wall-clock time spent in the store query. A cache hit skips
/// the query entirely, so the reported time is then zero.
#[derive(Debug, Clone)]
pub struct ExportAllResult {
    pub page: ExportAllPage,
    pub query_time_ms: u64,
}

/// Unrestricted dump of every translation, memoized per (page, size).
pub async fn export_all(
    store: &Store,
    cache: &ExportCache,
    page: PageRequest,
) -> ServiceResult<ExportAllResult> {
    if let Some(hit) = cache.get(page.page, page.size).await {
        debug!(page = page.page, size = page.size, "export-all cache hit");
        return Ok(ExportAllResult {
            page: hit,
            query_time_ms: 0,
        });
    }

    let started = Instant::now();
    let result = store.export_translations(page).await?;
    let query_time_ms = started.elapsed().as_millis() as u64;

    let payload = ExportAllPage {
        current_page: result.page,
        total_items: result.total_items,
        total_pages: result.total_pages(),
        translations: result.items,
    };
    cache.insert(page.page, page.size, &payload).await;

    Ok(ExportAllResult {
        page: payload,
        query_time_ms,
    })
}

/// Submits the full export to the runtime's worker pool and returns a handle
/// the caller can await later. A query failure resolves the handle as an
/// error rather than being swallowed; dropping the handle detaches the task.
pub fn export_all_task(
    store: Store,
    cache: Arc<ExportCache>,
    page: PageRequest,
) -> JoinHandle<ServiceResult<ExportAllResult>> {
    tokio::spawn(async move { export_all(&store, &cache, page).await })
}

/// Shared fetch for the locale(+tag) export paths. A supplied tag name is
/// resolved first; an unknown name surfaces as NotFound.
async fn locale_tag_page(
    store: &Store,
    locale: &str,
    tag_name: Option<&str>,
    page: Option<PageRequest>,
) -> ServiceResult<PageResult<KeyContent>> {
    let tag: Option<Tag> = match tag_name.filter(|name| !name.is_empty()) {
        Some(name) => Some(
            store
                .find_tag_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Tag not found: {name}")))?,
        ),
        None => None,
    };

    store.locale_pairs(locale, tag.map(|t| t.id), page).await
}

fn empty_result_message(locale: &str, tag_name: Option<&str>) -> String {
    match tag_name.filter(|name| !name.is_empty()) {
        Some(tag) => format!("No translations found for locale: {locale} and tag: {tag}"),
        None => format!("No translations found for locale: {locale}"),
    }
}

/// Paged key/content export for one locale, optionally narrowed by tag.
///
/// An empty page is an error by design: callers rely on it to distinguish
/// "locale exists but has no translations yet" from an ordinary empty page
/// elsewhere in the system.
pub async fn export_json(
    store: &Store,
    locale: &str,
    tag_name: Option<&str>,
    page: PageRequest,
) -> ServiceResult<PageResult<KeyContent>> {
    let result = locale_tag_page(store, locale, tag_name, Some(page)).await?;
    if result.is_empty() {
        return Err(ServiceError::NotFound(empty_result_message(
            locale, tag_name,
        )));
    }
    Ok(result)
}

/// Unpaginated flat bundle for one locale(+tag), e.g. frontend i18n assets.
///
/// Emptiness comes back as an empty map rather than an error — the HTTP
/// boundary turns that into a bare 404, which keeps this path's observable
/// distinct from `export_json`'s structured NotFound.
pub async fn export_bundle(
    store: &Store,
    locale: &str,
    tag_name: Option<&str>,
) -> ServiceResult<BTreeMap<String, String>> {
    let result = locale_tag_page(store, locale, tag_name, None).await?;
    Ok(flatten_pairs(result.items))
}

/// Flattens ordered pairs into one mapping. Rows arrive newest-first and the
/// first occurrence wins, so a key shared across tags resolves to its most
/// recently updated content.
pub fn flatten_pairs(items: Vec<KeyContent>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for pair in items {
        map.entry(pair.key).or_insert(pair.content);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TranslationInput;
    use std::time::Duration;

    // ==================== Helper Functions ====================

    async fn memory_store() -> Store {
        Store::connect("sqlite::memory:")
            .await
            .expect("Failed to create store")
    }

    async fn seed(store: &Store, key: &str, locale_id: i64, tag_id: Option<i64>, content: &str) {
        store
            .create_translation(&TranslationInput {
                key: key.to_string(),
                locale_id,
                tag_id,
                content: content.to_string(),
            })
            .await
            .expect("create translation");
    }

    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    fn page(page: i64, size: i64) -> PageRequest {
        PageRequest::new(page, size).expect("valid page")
    }

    // ==================== export_json Tests ====================

    #[tokio::test]
    async fn test_export_json_empty_locale_is_not_found() {
        let store = memory_store().await;
        store.create_locale("en").await.expect("locale");

        let err = export_json(&store, "en", None, page(0, 10))
            .await
            .expect_err("empty export");
        match err {
            ServiceError::NotFound(message) => {
                assert_eq!(message, "No translations found for locale: en");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_export_json_unknown_tag_is_not_found() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        let err = export_json(&store, "en", Some("mobile"), page(0, 10))
            .await
            .expect_err("unknown tag");
        match err {
            ServiceError::NotFound(message) => {
                assert_eq!(message, "Tag not found: mobile");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_export_json_empty_tag_filter_is_ignored() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        let result = export_json(&store, "en", Some(""), page(0, 10))
            .await
            .expect("empty tag acts as no filter");
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn test_export_json_empty_message_names_the_tag() {
        let store = memory_store().await;
        store.create_locale("en").await.expect("locale");
        store.create_tag("mobile").await.expect("tag");

        let err = export_json(&store, "en", Some("mobile"), page(0, 10))
            .await
            .expect_err("empty export");
        match err {
            ServiceError::NotFound(message) => {
                assert_eq!(
                    message,
                    "No translations found for locale: en and tag: mobile"
                );
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_export_json_returns_locale_rows_only() {
        let store = memory_store().await;
        let en = store.create_locale("en").await.expect("locale");
        let fr = store.create_locale("fr").await.expect("locale");
        seed(&store, "hello", en.id, None, "Hi").await;
        seed(&store, "hello", fr.id, None, "Salut").await;

        let result = export_json(&store, "en", None, page(0, 10))
            .await
            .expect("export");
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].content, "Hi");
        assert_eq!(result.total_items, 1);
    }

    #[tokio::test]
    async fn test_export_json_paginates() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        for i in 0..5 {
            seed(&store, &format!("key{i}"), locale.id, None, "x").await;
            tick().await;
        }

        let result = export_json(&store, "en", None, page(1, 2))
            .await
            .expect("export");
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.total_items, 5);
        assert_eq!(result.total_pages(), 3);
    }

    // ==================== export_bundle Tests ====================

    #[tokio::test]
    async fn test_export_bundle_flattens_to_map() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        let tag = store.create_tag("mobile").await.expect("tag");
        seed(&store, "hello", locale.id, Some(tag.id), "Hi").await;
        seed(&store, "bye", locale.id, Some(tag.id), "Bye").await;

        let bundle = export_bundle(&store, "en", Some("mobile"))
            .await
            .expect("bundle");
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("hello").map(String::as_str), Some("Hi"));
        assert_eq!(bundle.get("bye").map(String::as_str), Some("Bye"));
    }

    #[tokio::test]
    async fn test_export_bundle_empty_locale_yields_empty_map() {
        let store = memory_store().await;
        store.create_locale("en").await.expect("locale");

        let bundle = export_bundle(&store, "en", None).await.expect("bundle");
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn test_export_bundle_unknown_tag_still_errors() {
        let store = memory_store().await;
        store.create_locale("en").await.expect("locale");

        let err = export_bundle(&store, "en", Some("nope"))
            .await
            .expect_err("unknown tag");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_bundle_is_idempotent() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;
        seed(&store, "bye", locale.id, None, "Bye").await;

        let first = export_bundle(&store, "en", None).await.expect("bundle");
        let second = export_bundle(&store, "en", None).await.expect("bundle");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_export_bundle_newest_content_wins_on_shared_keys() {
        let store = memory_store().await;
        let locale = store.create_locale("en").await.expect("locale");
        let mobile = store.create_tag("mobile").await.expect("tag");
        let web = store.create_tag("web").await.expect("tag");

        seed(&store, "hello", locale.id, Some(mobile.id), "Old greeting").await;
        tick().await;
        seed(&store, "hello", locale.id, Some(web.id), "New greeting").await;

        let bundle = export_bundle(&store, "en", None).await.expect("bundle");
        assert_eq!(bundle.len(), 1);
        assert_eq!(
            bundle.get("hello").map(String::as_str),
            Some("New greeting")
        );
    }

    #[tokio::test]
    async fn test_flatten_pairs_first_occurrence_wins() {
        let items = vec![
            KeyContent {
                key: "hello".into(),
                content: "newest".into(),
            },
            KeyContent {
                key: "hello".into(),
                content: "older".into(),
            },
            KeyContent {
                key: "bye".into(),
                content: "Bye".into(),
            },
        ];
        let map = flatten_pairs(items);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("hello").map(String::as_str), Some("newest"));
    }

    // ==================== export_all Tests ====================

    #[tokio::test]
    async fn test_export_all_reports_page_metadata() {
        let store = memory_store().await;
        let cache = ExportCache::new(Duration::from_secs(60));
        let locale = store.create_locale("en").await.expect("locale");
        for i in 0..3 {
            seed(&store, &format!("key{i}"), locale.id, None, "x").await;
        }

        let result = export_all(&store, &cache, page(0, 2)).await.expect("export");
        assert_eq!(result.page.translations.len(), 2);
        assert_eq!(result.page.current_page, 0);
        assert_eq!(result.page.total_items, 3);
        assert_eq!(result.page.total_pages, 2);
    }

    #[tokio::test]
    async fn test_export_all_serves_stale_page_within_ttl() {
        let store = memory_store().await;
        let cache = ExportCache::new(Duration::from_secs(60));
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        let first = export_all(&store, &cache, page(0, 10)).await.expect("first");
        assert_eq!(first.page.total_items, 1);

        // An intervening write does not invalidate the cached page
        seed(&store, "bye", locale.id, None, "Bye").await;

        let second = export_all(&store, &cache, page(0, 10)).await.expect("second");
        assert_eq!(second.page.total_items, 1);
        assert_eq!(
            serde_json::to_string(&first.page).expect("json"),
            serde_json::to_string(&second.page).expect("json"),
        );
    }

    #[tokio::test]
    async fn test_export_all_recomputes_after_ttl() {
        let store = memory_store().await;
        let cache = ExportCache::new(Duration::from_millis(20));
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        export_all(&store, &cache, page(0, 10)).await.expect("first");
        seed(&store, "bye", locale.id, None, "Bye").await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let fresh = export_all(&store, &cache, page(0, 10)).await.expect("fresh");
        assert_eq!(fresh.page.total_items, 2);
    }

    #[tokio::test]
    async fn test_export_all_does_not_cache_empty_pages() {
        let store = memory_store().await;
        let cache = ExportCache::new(Duration::from_secs(60));

        let empty = export_all(&store, &cache, page(0, 10)).await.expect("empty");
        assert!(empty.page.translations.is_empty());

        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        // The empty page was not pinned; the new row shows up immediately
        let populated = export_all(&store, &cache, page(0, 10)).await.expect("populated");
        assert_eq!(populated.page.total_items, 1);
    }

    #[tokio::test]
    async fn test_export_all_pages_cache_independently() {
        let store = memory_store().await;
        let cache = ExportCache::new(Duration::from_secs(60));
        let locale = store.create_locale("en").await.expect("locale");
        for i in 0..4 {
            seed(&store, &format!("key{i}"), locale.id, None, "x").await;
            tick().await;
        }

        let page0 = export_all(&store, &cache, page(0, 2)).await.expect("page 0");
        let page1 = export_all(&store, &cache, page(1, 2)).await.expect("page 1");
        assert_ne!(
            page0.page.translations[0].key,
            page1.page.translations[0].key
        );
        assert_eq!(cache.len().await, 2);
    }

    // ==================== Async Gateway Tests ====================

    #[tokio::test]
    async fn test_export_all_task_resolves_with_payload() {
        let store = memory_store().await;
        let cache = Arc::new(ExportCache::new(Duration::from_secs(60)));
        let locale = store.create_locale("en").await.expect("locale");
        seed(&store, "hello", locale.id, None, "Hi").await;

        let handle = export_all_task(store, cache, page(0, 10));
        let result = handle.await.expect("join").expect("export");
        assert_eq!(result.page.total_items, 1);
    }

    #[tokio::test]
    async fn test_export_all_task_propagates_query_failure() {
        let store = memory_store().await;
        let cache = Arc::new(ExportCache::new(Duration::from_secs(60)));

        // Closing the pool makes the underlying query fail; the failure must
        // come back through the handle, not vanish.
        store.pool().close().await;

        let handle = export_all_task(store, cache, page(0, 10));
        let result = handle.await.expect("join");
        assert!(result.is_err());
    }
}
