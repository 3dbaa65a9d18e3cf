//! Seed bootstrap: turning configured seeds into a deduplicated account set

use crate::api::traits::RemoteApi;
use crate::api::types::{AccountId, MatchRecord};
use crate::config::SeedConfig;
use crate::SpiderError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// A seed match dump: `{"matches": [ <match record>, ... ]}`
#[derive(Debug, Deserialize)]
struct SeedDump {
    #[serde(default)]
    matches: Vec<serde_json::Value>,
}

/// Extracts the participant account ids from a seed match dump file
pub fn load_seed_file(path: &Path) -> Result<Vec<AccountId>, SpiderError> {
    let content = std::fs::read_to_string(path)?;
    let dump: SeedDump = serde_json::from_str(&content)?;

    let mut seen = HashSet::new();
    let accounts = dump
        .matches
        .into_iter()
        .filter_map(MatchRecord::from_body)
        .flat_map(|record| record.participants())
        .filter(|id| seen.insert(*id))
        .collect::<Vec<_>>();

    tracing::info!(
        "Extracted {} unique accounts from seed file {}",
        accounts.len(),
        path.display()
    );

    Ok(accounts)
}

/// Builds the seed set from explicit ids, seed files and player names
///
/// Names that cannot be resolved are logged and skipped; unreadable seed
/// files are an error. The result is deduplicated and keeps first-seen order.
pub async fn collect_seeds(
    api: &dyn RemoteApi,
    seeds: &SeedConfig,
) -> Result<Vec<AccountId>, SpiderError> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::new();
    let mut push = |id: AccountId, accounts: &mut Vec<AccountId>| {
        if seen.insert(id) {
            accounts.push(id);
        }
    };

    for id in &seeds.accounts {
        push(AccountId(*id), &mut accounts);
    }

    for file in &seeds.seed_files {
        for id in load_seed_file(Path::new(file))? {
            push(id, &mut accounts);
        }
    }

    for name in &seeds.summoners {
        match api.resolve_account_id(name).await {
            Ok(id) => {
                tracing::debug!("Resolved {} to account {}", name, id);
                push(id, &mut accounts);
            }
            Err(e) => tracing::warn!("Could not resolve player {}: {}", name, e),
        }
    }

    Ok(accounts)
}
