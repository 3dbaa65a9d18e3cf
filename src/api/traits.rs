//! The remote API seam consumed by the crawler

use crate::api::types::{AccountId, MatchId, MatchListPage, MatchListQuery, MatchRecord};
use crate::ApiResult;
use async_trait::async_trait;

/// Remote gaming API capability
///
/// Implementations are responsible for throttling their own calls and for
/// classifying failures as transient or permanent.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Resolves a player name to an account id
    async fn resolve_account_id(&self, name: &str) -> ApiResult<AccountId>;

    /// Fetches one page of an account's match list starting at `begin_index`
    async fn fetch_match_list_page(
        &self,
        account: AccountId,
        begin_index: u32,
        query: MatchListQuery,
    ) -> ApiResult<MatchListPage>;

    /// Fetches a full match record
    async fn fetch_match(&self, match_id: MatchId) -> ApiResult<MatchRecord>;
}
