use crate::error::ValidationError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// JOSE-style header. Only `alg`/`typ` matter here; unknown algorithms are
/// rejected rather than silently accepted (§4.2 step 1-2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub alg: String,
    #[serde(default)]
    pub typ: Option<String>,
}

/// The payload fields described in §6's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopePayload {
    pub iss: String,
    pub iat: i64,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default, rename = "gaiaChallenge")]
    pub gaia_challenge: Option<String>,
    #[serde(default, rename = "hubUrl")]
    pub hub_url: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default, rename = "associationToken")]
    pub association_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<RawScopeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScopeEntry {
    pub scope: String,
    pub domain: String,
}

/// A decoded, signature-verified envelope. `iss` is the hex-encoded
/// compressed public key of the leaf signer, already checked against the
/// signature over `header.payload`.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub payload: EnvelopePayload,
}

const SUPPORTED_ALG: &str = "ES256K";

/// Decodes and signature-verifies a three-segment envelope, returning the
/// header and the payload as a raw JSON value. Used both for the leaf token
/// (parsed into `EnvelopePayload`) and for association-token links, whose
/// payload shape differs (`AssociationPayload` in `super::association`).
pub fn decode_and_verify_raw(
    token: &str,
) -> Result<(EnvelopeHeader, serde_json::Value), ValidationError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(ValidationError::BadTokenFormat)?;
    let payload_b64 = parts.next().ok_or(ValidationError::BadTokenFormat)?;
    let sig_b64 = parts.next().ok_or(ValidationError::BadTokenFormat)?;
    if parts.next().is_some() {
        return Err(ValidationError::BadTokenFormat);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| ValidationError::BadTokenFormat)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| ValidationError::BadTokenFormat)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| ValidationError::BadTokenFormat)?;

    let header: EnvelopeHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| ValidationError::BadTokenFormat)?;
    if header.alg != SUPPORTED_ALG {
        return Err(ValidationError::BadTokenFormat);
    }
    let payload: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| ValidationError::BadTokenFormat)?;
    let iss = payload
        .get("iss")
        .and_then(|v| v.as_str())
        .ok_or(ValidationError::BadTokenFormat)?;

    let pubkey_bytes = hex::decode(iss).map_err(|_| ValidationError::BadTokenFormat)?;
    let verifying_key = VerifyingKey::from_sec1_bytes(&pubkey_bytes)
        .map_err(|_| ValidationError::SignatureInvalid)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| ValidationError::SignatureInvalid)?;

    let signing_input = format!("{header_b64}.{payload_b64}");
    let digest = Sha256::digest(signing_input.as_bytes());
    verifying_key
        .verify_prehash(&digest, &signature)
        .map_err(|_| ValidationError::SignatureInvalid)?;

    Ok((header, payload))
}

/// Decodes and verifies a single three-segment envelope (`header.payload.signature`)
/// into the leaf token payload shape. Does not walk the association-token
/// chain; callers recurse for that (§4.2 step 3).
pub fn decode_and_verify(token: &str) -> Result<Envelope, ValidationError> {
    let (header, raw_payload) = decode_and_verify_raw(token)?;
    let payload: EnvelopePayload =
        serde_json::from_value(raw_payload).map_err(|_| ValidationError::BadTokenFormat)?;
    Ok(Envelope { header, payload })
}

/// Hex decoding is only used here for the compressed pubkey field, so we
/// keep it tiny rather than pulling in a feature we'd use once.
pub(crate) mod hex {
    pub fn decode(s: &str) -> Result<Vec<u8>, ()> {
        if s.len() % 2 != 0 {
            return Err(());
        }
        let mut out = Vec::with_capacity(s.len() / 2);
        let bytes = s.as_bytes();
        for chunk in bytes.chunks(2) {
            let hi = (chunk[0] as char).to_digit(16).ok_or(())?;
            let lo = (chunk[1] as char).to_digit(16).ok_or(())?;
            out.push(((hi << 4) | lo) as u8);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use k256::ecdsa::signature::hazmat::PrehashSigner;
    use rand::rngs::OsRng;

    fn make_token(payload: &EnvelopePayload, signing_key: &SigningKey) -> String {
        let header = EnvelopeHeader {
            alg: SUPPORTED_ALG.to_string(),
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

    fn sample_payload(iss: String) -> EnvelopePayload {
        EnvelopePayload {
            iss,
            iat: 100,
            exp: None,
            gaia_challenge: None,
            hub_url: None,
            salt: None,
            association_token: None,
            scopes: Vec::new(),
        }
    }

    #[test]
    fn round_trips_a_validly_signed_token() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let iss = hex_encode(verifying_key.to_encoded_point(true).as_bytes());
        let token = make_token(&sample_payload(iss.clone()), &signing_key);

        let envelope = decode_and_verify(&token).unwrap();
        assert_eq!(envelope.payload.iss, iss);
    }

    #[test]
    fn rejects_tampered_payload() {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let iss = hex_encode(verifying_key.to_encoded_point(true).as_bytes());
        let token = make_token(&sample_payload(iss), &signing_key);

        let mut parts: Vec<&str> = token.split('.').collect();
        let mut tampered_payload =
            String::from_utf8(URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        tampered_payload.push(' ');
        parts[1] = Box::leak(
            URL_SAFE_NO_PAD
                .encode(tampered_payload.as_bytes())
                .into_boxed_str(),
        );
        let tampered = parts.join(".");

        assert_eq!(
            decode_and_verify(&tampered).unwrap_err(),
            ValidationError::SignatureInvalid
        );
    }

    #[test]
    fn rejects_malformed_envelope() {
        assert_eq!(
            decode_and_verify("not-a-token").unwrap_err(),
            ValidationError::BadTokenFormat
        );
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
