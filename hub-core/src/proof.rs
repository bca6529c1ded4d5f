use crate::error::HubResult;
use async_trait::async_trait;

/// The social-proof gate consulted at upload step 5 (§4.5). This hub treats
/// it as a delegated collaborator: the concrete verification logic (e.g.
/// checking a profile's declared proofs against the signing principal) is
/// out of scope here — implementations plug in a real checker; `Err`
/// surfaces to callers as `HubError::NotEnoughProof`.
#[async_trait]
pub trait ProofChecker: Send + Sync {
    async fn check(&self, principal: &str, path: &str) -> HubResult<()>;
}

/// A checker that allows every write, for deployments (and tests) that
/// don't gate on social proof at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllProofChecker;

#[async_trait]
impl ProofChecker for AllowAllProofChecker {
    async fn check(&self, _principal: &str, _path: &str) -> HubResult<()> {
        Ok(())
    }
}
