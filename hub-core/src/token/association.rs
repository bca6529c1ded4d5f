use crate::error::ValidationError;
use crate::token::envelope::decode_and_verify_raw;
use serde::{Deserialize, Serialize};

/// Payload shape of an association-token link: `iss` authorizes
/// `child_to_authorize` to act on its behalf (§3, §4.2 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationPayload {
    pub iss: String,
    #[serde(rename = "childToAuthorize")]
    pub child_to_authorize: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default, rename = "associationToken")]
    pub association_token: Option<String>,
}

/// Walks an association-token chain starting from the leaf token's claimed
/// `associationToken`, verifying each link's signature and that each link
/// authorizes the next key down the chain, ending with the leaf key.
///
/// Returns the root public key (the original signing principal), or the
/// `leaf_iss` unchanged if there is no association token at all.
pub fn resolve_root_principal(
    leaf_iss: &str,
    association_token: Option<&str>,
    now_unix: i64,
) -> Result<String, ValidationError> {
    let Some(first_link) = association_token else {
        return Ok(leaf_iss.to_string());
    };

    let mut authorized_key = leaf_iss.to_string();
    let mut next_token = Some(first_link.to_string());

    // Bound the chain length defensively; a legitimate chain is never deep.
    for _ in 0..16 {
        let Some(token) = next_token.take() else {
            return Ok(authorized_key);
        };
        let (_header, raw_payload) = decode_and_verify_raw(&token)?;
        let payload: AssociationPayload =
            serde_json::from_value(raw_payload).map_err(|_| ValidationError::AssociationInvalid)?;

        if payload.child_to_authorize != authorized_key {
            return Err(ValidationError::AssociationInvalid);
        }
        if let Some(exp) = payload.exp {
            if exp < now_unix {
                return Err(ValidationError::Expired);
            }
        }

        authorized_key = payload.iss;
        next_token = payload.association_token;
    }

    Err(ValidationError::AssociationInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::envelope::EnvelopeHeader;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use k256::ecdsa::SigningKey;
    use k256::ecdsa::signature::hazmat::PrehashSigner;
    use k256::ecdsa::Signature;
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha256};

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn sign_payload(payload: &impl Serialize, signing_key: &SigningKey) -> String {
        let header = EnvelopeHeader {
            alg: "ES256K".to_string(),
            typ: Some("JWT".to_string()),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).unwrap());
        let signing_input = format!("{header_b64}.{payload_b64}");
        let digest = Sha256::digest(signing_input.as_bytes());
        let signature: Signature = signing_key.sign_prehash(&digest).unwrap();
        let sig_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        format!("{signing_input}.{sig_b64}")
    }

    #[test]
    fn resolves_root_through_one_link() {
        let root_key = SigningKey::random(&mut OsRng);
        let root_pub = hex_encode(
            k256::ecdsa::VerifyingKey::from(&root_key)
                .to_encoded_point(true)
                .as_bytes(),
        );
        let leaf_key = SigningKey::random(&mut OsRng);
        let leaf_pub = hex_encode(
            k256::ecdsa::VerifyingKey::from(&leaf_key)
                .to_encoded_point(true)
                .as_bytes(),
        );

        let link = AssociationPayload {
            iss: root_pub.clone(),
            child_to_authorize: leaf_pub.clone(),
            exp: None,
            association_token: None,
        };
        let link_token = sign_payload(&link, &root_key);

        let root = resolve_root_principal(&leaf_pub, Some(&link_token), 0).unwrap();
        assert_eq!(root, root_pub);
    }

    #[test]
    fn rejects_link_authorizing_a_different_key() {
        let root_key = SigningKey::random(&mut OsRng);
        let root_pub = hex_encode(
            k256::ecdsa::VerifyingKey::from(&root_key)
                .to_encoded_point(true)
                .as_bytes(),
        );
        let leaf_pub = "deadbeef".to_string();
        let other_pub = "abcdef01".to_string();

        let link = AssociationPayload {
            iss: root_pub,
            child_to_authorize: other_pub,
            exp: None,
            association_token: None,
        };
        let link_token = sign_payload(&link, &root_key);

        let err = resolve_root_principal(&leaf_pub, Some(&link_token), 0).unwrap_err();
        assert_eq!(err, ValidationError::AssociationInvalid);
    }

    #[test]
    fn no_association_token_returns_leaf_key_unchanged() {
        let root = resolve_root_principal("leafkey", None, 0).unwrap();
        assert_eq!(root, "leafkey");
    }
}
