pub mod association;
pub mod envelope;
pub mod scopes;

pub use scopes::{ScopeKind, ScopeSet};

use crate::error::ValidationError;
use crate::principal::Principal;
use association::resolve_root_principal;
use envelope::decode_and_verify;

/// A signing principal and the scope set their token carries, produced by
/// `verify` once every check in §4.2 has passed.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub principal: Principal,
    pub scopes: ScopeSet,
}

/// The hub-identity checks a token's `hubUrl` claim is pinned against.
#[derive(Debug, Clone, Copy)]
pub struct HubUrlPolicy<'a> {
    pub server_name: &'a str,
    pub valid_hub_urls: &'a [String],
    pub require_correct_hub_url: bool,
}

/// Runs the full verification order from §4.2 against a raw `Authorization`
/// header value. `revoked_before` is the caller-resolved revocation-clock
/// value for `requested_principal` (step 7); `whitelist`, when present,
/// restricts writers (step 8).
pub fn verify(
    authorization_header: &str,
    requested_principal: &Principal,
    hub_url_policy: HubUrlPolicy<'_>,
    revoked_before: i64,
    whitelist: Option<&[Principal]>,
    now_unix: i64,
) -> Result<VerifiedToken, ValidationError> {
    let token = strip_bearer(authorization_header)?;
    let envelope = decode_and_verify(token)?;

    if let Some(exp) = envelope.payload.exp {
        if exp < now_unix {
            return Err(ValidationError::Expired);
        }
    }

    let root_pubkey_hex = resolve_root_principal(
        &envelope.payload.iss,
        envelope.payload.association_token.as_deref(),
        now_unix,
    )?;
    let pubkey_bytes =
        envelope::hex::decode(&root_pubkey_hex).map_err(|_| ValidationError::AssociationInvalid)?;
    let signing_principal = Principal::from_public_key_bytes(&pubkey_bytes);

    if &signing_principal != requested_principal {
        return Err(ValidationError::PrincipalMismatch);
    }

    if hub_url_policy.require_correct_hub_url {
        let claim = envelope.payload.hub_url.as_deref().unwrap_or("");
        let accepted = std::iter::once(hub_url_policy.server_name)
            .chain(hub_url_policy.valid_hub_urls.iter().map(String::as_str));
        if !accepted.any(|candidate| hub_url_matches(claim, candidate)) {
            return Err(ValidationError::WrongHub);
        }
    }

    if envelope.payload.iat < revoked_before {
        return Err(ValidationError::Revoked);
    }

    if let Some(list) = whitelist {
        if !list.iter().any(|p| p == &signing_principal) {
            return Err(ValidationError::NotWhitelisted);
        }
    }

    let scopes = ScopeSet::from_raw(&envelope.payload.scopes);

    Ok(VerifiedToken {
        principal: signing_principal,
        scopes,
    })
}

fn strip_bearer(header: &str) -> Result<&str, ValidationError> {
    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().ok_or(ValidationError::MissingAuthorization)?;
    let token = parts.next().ok_or(ValidationError::MissingAuthorization)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ValidationError::MissingAuthorization);
    }
    Ok(token)
}

/// Compares hub-URL claim and configured server name ignoring a trailing
/// slash and an optional `http(s)://` scheme on the claim side (§4.2 step 6).
fn hub_url_matches(claim: &str, server_name: &str) -> bool {
    fn normalize(s: &str) -> &str {
        let s = s.trim_end_matches('/');
        s.strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"))
            .unwrap_or(s)
    }
    normalize(claim) == normalize(server_name)
}
