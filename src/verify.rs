//! Verification predicates over the ballot chain of custody.
//!
//! Each predicate checks exactly one link and fails with the error naming
//! that link, so a failed attestation, a broken voter binding, and a
//! mismatched ballot stay distinguishable. The machine runs all three
//! before accepting a ballot; the voter re-runs them over the receipt.

use ed25519_dalek::{PublicKey, Signature};

use crate::crypt;
use crate::crypt::BallotDigest;
use crate::sealed::EncryptedEnvelope;
use crate::VerificationError;

/// Check the official's attestation over the raw bytes of the commitment
/// envelope.
///
/// A valid attestation proves the official authorized this exact sealed
/// commitment, even though the official could not read it.
pub fn verify_official_attestation(
    commitment: &EncryptedEnvelope,
    attestation: &Signature,
    official_public: &PublicKey,
) -> Result<(), VerificationError> {
    if crypt::verify(commitment.as_bytes(), attestation, official_public) {
        Ok(())
    } else {
        Err(VerificationError::AuthorizationFailed)
    }
}

/// Check the voter's signature over the ballot digest.
///
/// A valid signature proves the commitment originated with the voter and
/// was not substituted in transit.
pub fn verify_voter_binding(
    digest: &BallotDigest,
    digest_sig: &Signature,
    voter_public: &PublicKey,
) -> Result<(), VerificationError> {
    if crypt::verify(digest.as_bytes(), digest_sig, voter_public) {
        Ok(())
    } else {
        Err(VerificationError::VoterBindingFailed)
    }
}

/// Check that a ballot hashes to the authorized digest.
pub fn verify_digest_match(
    digest: &BallotDigest,
    ballot: &[u8],
) -> Result<(), VerificationError> {
    if crypt::hash(ballot) == *digest {
        Ok(())
    } else {
        Err(VerificationError::DigestMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed;

    #[test]
    fn attestation_checks_signer_and_bytes() {
        let (official_secret, official_public) = crypt::generate_keypair();
        let (_, machine_key) = sealed::generate_keypair();

        let commitment = sealed::encrypt(&machine_key, b"commitment payload");
        let attestation = crypt::sign(commitment.as_bytes(), &official_secret);

        assert!(
            verify_official_attestation(&commitment, &attestation, &official_public).is_ok()
        );

        // Signature by someone other than the official
        let (impostor_secret, _) = crypt::generate_keypair();
        let forged = crypt::sign(commitment.as_bytes(), &impostor_secret);
        assert!(matches!(
            verify_official_attestation(&commitment, &forged, &official_public),
            Err(VerificationError::AuthorizationFailed)
        ));

        // Attestation over a different envelope
        let other = sealed::encrypt(&machine_key, b"other payload");
        assert!(matches!(
            verify_official_attestation(&other, &attestation, &official_public),
            Err(VerificationError::AuthorizationFailed)
        ));
    }

    #[test]
    fn voter_binding_checks_signer() {
        let (voter_secret, voter_public) = crypt::generate_keypair();
        let digest = crypt::hash(b"Candidate A");
        let digest_sig = crypt::sign(digest.as_bytes(), &voter_secret);

        assert!(verify_voter_binding(&digest, &digest_sig, &voter_public).is_ok());

        let (_, other_public) = crypt::generate_keypair();
        assert!(matches!(
            verify_voter_binding(&digest, &digest_sig, &other_public),
            Err(VerificationError::VoterBindingFailed)
        ));
    }

    #[test]
    fn digest_match_detects_substitution() {
        let digest = crypt::hash(b"Candidate A");

        assert!(verify_digest_match(&digest, b"Candidate A").is_ok());
        assert!(matches!(
            verify_digest_match(&digest, b"Candidate B"),
            Err(VerificationError::DigestMismatch)
        ));
    }
}
