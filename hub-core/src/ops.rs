use crate::config::HubConfig;
use crate::driver::{Driver, ListPage, ObjectKey};
use crate::error::{HubResult, ValidationError};
use crate::path::ObjectPath;
use crate::principal::Principal;
use crate::revocation::RevocationClock;
use crate::token::{self, HubUrlPolicy, VerifiedToken};
use crate::upload::random_history_suffix;
use std::sync::Arc;

/// Shared auth prelude for delete/list (§4.6): resolve revocation, then
/// verify the token against it.
async fn authenticate(
    authorization_header: &str,
    principal: &Principal,
    hub_url_policy: HubUrlPolicy<'_>,
    revocation: &RevocationClock,
    config: &HubConfig,
    now_unix: i64,
) -> HubResult<VerifiedToken> {
    let revoked_before = revocation.get(principal.as_str()).await?;
    let whitelist: Option<Vec<Principal>> = config
        .writer_whitelist
        .as_ref()
        .map(|names| names.iter().filter_map(|n| Principal::parse(n).ok()).collect());
    let verified = token::verify(
        authorization_header,
        principal,
        hub_url_policy,
        revoked_before,
        whitelist.as_deref(),
        now_unix,
    )?;
    Ok(verified)
}

/// Runs the delete handler of §4.6: when archival scopes apply, a delete is
/// a rename to a historical (tombstone) name; otherwise a direct
/// `perform_delete`. `DoesNotExist` from the driver is surfaced either way.
pub async fn handle_delete(
    principal_str: &str,
    path_str: &str,
    authorization_header: &str,
    driver: &Arc<dyn Driver>,
    revocation: &RevocationClock,
    hub_url_policy: HubUrlPolicy<'_>,
    config: &HubConfig,
    now_unix: i64,
) -> HubResult<()> {
    let principal = Principal::parse(principal_str)?;
    let object_path = ObjectPath::parse(path_str)?;
    let verified = authenticate(
        authorization_header,
        &principal,
        hub_url_policy,
        revocation,
        config,
        now_unix,
    )
    .await?;

    if object_path.is_reserved() {
        return Err(crate::error::HubError::ConflictingName(object_path.as_str().to_string()));
    }

    if !verified.scopes.authorizes_delete(object_path.as_str()) {
        return Err(ValidationError::ScopeDenied.into());
    }

    let key = ObjectKey {
        storage_top_level: principal.as_str().to_string(),
        path: object_path.as_str().to_string(),
    };

    let result = if verified.scopes.is_archival() {
        let historical =
            object_path.historical_sibling(now_unix as u64, &random_history_suffix());
        driver.perform_rename(key, historical.as_str().to_string()).await
    } else {
        driver.perform_delete(key).await
    };
    if result.is_ok() {
        tracing::info!(
            principal = principal.as_str(),
            path = object_path.as_str(),
            "object deleted"
        );
    }
    result
}

pub struct ListFilesRequest<'a> {
    pub principal: &'a str,
    pub authorization_header: &'a str,
    pub page: Option<&'a str>,
    pub stat: bool,
}

/// Runs the list handler of §4.6: no scope check (listing is an implicit
/// capability of the principal). When archival scopes apply, historical
/// entries are filtered out; if filtering empties an otherwise-non-empty
/// page that still had a cursor, a `None` sentinel is appended so the
/// client knows more pages may follow.
pub async fn handle_list(
    req: ListFilesRequest<'_>,
    driver: &Arc<dyn Driver>,
    revocation: &RevocationClock,
    hub_url_policy: HubUrlPolicy<'_>,
    config: &HubConfig,
    now_unix: i64,
) -> HubResult<ListPage> {
    let principal = Principal::parse(req.principal)?;
    let verified = authenticate(
        req.authorization_header,
        &principal,
        hub_url_policy,
        revocation,
        config,
        now_unix,
    )
    .await?;

    let page = if req.stat {
        driver.list_files_stat(principal.as_str(), req.page).await?
    } else {
        driver.list_files(principal.as_str(), req.page).await?
    };

    if !verified.scopes.is_archival() {
        return Ok(page);
    }

    let had_cursor = page.page.is_some();
    let filtered: Vec<_> = page
        .entries
        .into_iter()
        .filter(|entry| {
            entry
                .as_ref()
                .map(|e| !ObjectPath::parse(&e.name).map(|p| p.is_historical()).unwrap_or(false))
                .unwrap_or(true)
        })
        .collect();

    let entries = if filtered.is_empty() && had_cursor {
        vec![None]
    } else {
        filtered
    };

    Ok(ListPage {
        entries,
        page: page.page,
    })
}

/// Bumps the revocation clock for `principal` to `oldest_valid_timestamp`,
/// authenticated by the same token-verification prelude (a self-revocation
/// is still a mutating operation per §6).
pub async fn handle_revoke_all(
    principal_str: &str,
    authorization_header: &str,
    oldest_valid_timestamp: i64,
    revocation: &RevocationClock,
    hub_url_policy: HubUrlPolicy<'_>,
    config: &HubConfig,
    now_unix: i64,
) -> HubResult<()> {
    let principal = Principal::parse(principal_str)?;
    authenticate(
        authorization_header,
        &principal,
        hub_url_policy,
        revocation,
        config,
        now_unix,
    )
    .await?;
    revocation.set(principal.as_str(), oldest_valid_timestamp).await
}
