//! Paginated match-list retrieval
//!
//! The remote API serves an account's match list in pages. Each page reports
//! its exclusive `endIndex` and the account's `totalGames`; while
//! `endIndex < totalGames - 1` the next page is requested at `endIndex`.
//! Paging is an explicit loop bounded by `max_pages`, and a page that makes no
//! forward progress is treated as inconsistent remote data.

use crate::api::{AccountId, MatchId, MatchListQuery, RemoteApi};
use crate::crawler::retry::{with_retry, RetryPolicy};
use crate::{ApiError, ApiResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Retrieves complete match lists for single accounts
pub struct MatchListFetcher {
    api: Arc<dyn RemoteApi>,
    query: MatchListQuery,
    retry: RetryPolicy,
    max_pages: u32,
}

impl MatchListFetcher {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        query: MatchListQuery,
        retry: RetryPolicy,
        max_pages: u32,
    ) -> Self {
        Self {
            api,
            query,
            retry,
            max_pages: max_pages.max(1),
        }
    }

    /// Fetches every page of `account`'s match list and stitches them together
    ///
    /// Match ids keep page order; an id repeated across page boundaries is kept
    /// once. Transient failures retry the same page per the retry policy;
    /// permanent failures are returned immediately.
    pub async fn fetch_all(&self, account: AccountId) -> ApiResult<Vec<MatchId>> {
        let mut match_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut begin_index = 0u32;
        let mut pages = 0u32;

        loop {
            if pages >= self.max_pages {
                return Err(ApiError::Inconsistent(format!(
                    "match list for account {} exceeded {} pages",
                    account, self.max_pages
                )));
            }

            let page = with_retry(&self.retry, "match list page", || {
                self.api
                    .fetch_match_list_page(account, begin_index, self.query)
            })
            .await?;
            pages += 1;

            match_ids.extend(
                page.matches
                    .iter()
                    .map(|entry| entry.match_id)
                    .filter(|id| seen.insert(*id)),
            );

            if !page.has_more() {
                tracing::info!(
                    "Account {} played {} matches ({} pages)",
                    account,
                    page.total_games,
                    pages
                );
                return Ok(match_ids);
            }

            if page.end_index <= begin_index {
                return Err(ApiError::Inconsistent(format!(
                    "match list for account {} stalled at index {} (total {})",
                    account, begin_index, page.total_games
                )));
            }

            tracing::debug!(
                "Account {}: fetched up to {} of {} matches",
                account,
                page.end_index,
                page.total_games
            );
            begin_index = page.end_index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MatchListEntry, MatchListPage, MatchRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves scripted pages keyed by begin index
    struct PagedApi {
        total: u32,
        page_size: u32,
        /// Begin indexes that fail transiently once before succeeding
        flaky: Mutex<HashSet<u32>>,
        /// Overrides the reported end index (for stalled paging)
        stuck_end: Option<u32>,
        status: Option<u16>,
        requests: Mutex<Vec<u32>>,
    }

    impl PagedApi {
        fn new(total: u32, page_size: u32) -> Self {
            Self {
                total,
                page_size,
                flaky: Mutex::new(HashSet::new()),
                stuck_end: None,
                status: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteApi for PagedApi {
        async fn resolve_account_id(&self, _name: &str) -> ApiResult<AccountId> {
            unreachable!()
        }

        async fn fetch_match_list_page(
            &self,
            _account: AccountId,
            begin_index: u32,
            _query: MatchListQuery,
        ) -> ApiResult<MatchListPage> {
            self.requests.lock().unwrap().push(begin_index);

            if let Some(status) = self.status {
                return Err(crate::api::classify_status(
                    reqwest::StatusCode::from_u16(status).unwrap(),
                    None,
                    String::new(),
                ));
            }

            if self.flaky.lock().unwrap().remove(&begin_index) {
                return Err(ApiError::Transient {
                    status: Some(500),
                    message: "flaky".to_string(),
                    retry_after: None,
                });
            }

            let end = self
                .stuck_end
                .unwrap_or_else(|| (begin_index + self.page_size).min(self.total));
            let matches = (begin_index..end.max(begin_index))
                .map(|i| MatchListEntry {
                    match_id: MatchId(1000 + i as i64),
                })
                .collect();

            Ok(MatchListPage {
                matches,
                start_index: begin_index,
                end_index: end,
                total_games: self.total,
            })
        }

        async fn fetch_match(&self, _match_id: MatchId) -> ApiResult<MatchRecord> {
            unreachable!()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn fetcher(api: Arc<PagedApi>) -> MatchListFetcher {
        MatchListFetcher::new(api, MatchListQuery::default(), fast_retry(), 50)
    }

    #[tokio::test]
    async fn test_stitches_three_pages() {
        let api = Arc::new(PagedApi::new(237, 100));
        let ids = fetcher(Arc::clone(&api)).fetch_all(AccountId(1)).await.unwrap();

        assert_eq!(ids.len(), 237);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 237);
        let expected: Vec<_> = (0..237).map(|i| MatchId(1000 + i)).collect();
        assert_eq!(ids, expected);
        assert_eq!(*api.requests.lock().unwrap(), vec![0, 100, 200]);
    }

    #[tokio::test]
    async fn test_single_short_page() {
        let api = Arc::new(PagedApi::new(12, 100));
        let ids = fetcher(Arc::clone(&api)).fetch_all(AccountId(1)).await.unwrap();

        assert_eq!(ids.len(), 12);
        assert_eq!(*api.requests.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_transient_page_failure_retries_same_page() {
        let api = Arc::new(PagedApi::new(237, 100));
        api.flaky.lock().unwrap().insert(100);

        let ids = fetcher(Arc::clone(&api)).fetch_all(AccountId(1)).await.unwrap();

        assert_eq!(ids.len(), 237);
        assert_eq!(*api.requests.lock().unwrap(), vec![0, 100, 100, 200]);
    }

    #[tokio::test]
    async fn test_stalled_end_index_is_inconsistent() {
        let mut api = PagedApi::new(500, 100);
        api.stuck_end = Some(0);
        let api = Arc::new(api);

        let err = fetcher(Arc::clone(&api))
            .fetch_all(AccountId(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Inconsistent(_)));
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_page_bound_enforced() {
        let api = Arc::new(PagedApi::new(10_000, 10));
        let fetcher = MatchListFetcher::new(
            Arc::clone(&api) as Arc<dyn RemoteApi>,
            MatchListQuery::default(),
            fast_retry(),
            5,
        );

        let err = fetcher.fetch_all(AccountId(1)).await.unwrap_err();

        assert!(matches!(err, ApiError::Inconsistent(_)));
        assert_eq!(api.requests.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let mut api = PagedApi::new(237, 100);
        api.status = Some(404);
        let api = Arc::new(api);

        let err = fetcher(Arc::clone(&api))
            .fetch_all(AccountId(1))
            .await
            .unwrap_err();

        assert!(err.is_not_found_or_unauthorized());
        assert_eq!(api.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let mut api = PagedApi::new(237, 100);
        api.status = Some(502);
        let api = Arc::new(api);

        let err = fetcher(Arc::clone(&api))
            .fetch_all(AccountId(1))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(api.requests.lock().unwrap().len(), 3);
    }
}
