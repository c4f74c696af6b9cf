//! The official: authenticates voters, checks eligibility, and attests to
//! ballot commitments it cannot read.

use ed25519_dalek::{PublicKey, SecretKey};
use log::warn;
use std::collections::BTreeSet;

use crate::crypt;
use crate::messages::{
    AuthorizationPayload, AuthorizationToMachine, SubmissionPayload, SubmissionToOfficial,
};
use crate::sealed;
use crate::sealed::EnvelopePublicKey;
use crate::serde_hex::{EdPublicKeyHex, Hex};
use crate::Identity;
use crate::VerificationError;

/// The eligibility roster the official consults before authorizing.
///
/// Callers bring their own backing store; the protocol only requires these
/// two operations. `mark_voted` is called exactly once per authorized
/// submission, after all checks pass.
pub trait EligibilityRoster {
    /// May this identity cast a ballot: registered and not yet voted.
    fn is_eligible(&self, identity: &Identity) -> bool;

    /// Record that this identity has voted.
    fn mark_voted(&mut self, identity: &Identity);
}

/// An in-memory roster, useful for testing and small elections.
#[derive(Serialize, Deserialize, Default, Clone)]
pub struct MemRoster {
    registered: BTreeSet<Identity>,
    voted: BTreeSet<Identity>,
}

impl MemRoster {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add an identity to the electoral roll.
    pub fn register(&mut self, identity: impl Into<Identity>) {
        self.registered.insert(identity.into());
    }

    pub fn has_voted(&self, identity: &Identity) -> bool {
        self.voted.contains(identity)
    }
}

impl EligibilityRoster for MemRoster {
    fn is_eligible(&self, identity: &Identity) -> bool {
        self.registered.contains(identity) && !self.voted.contains(identity)
    }

    fn mark_voted(&mut self, identity: &Identity) {
        self.voted.insert(identity.clone());
    }
}

/// The election official for one election.
///
/// Publishes a signing public key, which the machine and voters use to
/// check attestations, and an envelope public key, which voters seal their
/// submissions to. Both are derived from a single secret held by the
/// caller.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Official {
    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,
    pub encryption_key: EnvelopePublicKey,
}

impl Official {
    /// Create a new official. Returns the secret key, it is never stored.
    pub fn new() -> (Self, SecretKey) {
        let (secret, public_key) = crypt::generate_keypair();
        let (_, encryption_key) = sealed::derive_keypair(&secret);
        let official = Official {
            public_key,
            encryption_key,
        };
        (official, secret)
    }

    /// Process a voter's submission into an authorization for the machine.
    ///
    /// Opens the submission, authenticates the voter's identity signature
    /// against the registered public key, and consults the roster. On
    /// success the official signs the raw bytes of the commitment envelope,
    /// marks the voter as having voted, and seals the authorization to the
    /// machine. The commitment envelope passes through untouched and
    /// unread.
    pub fn authorize<R: EligibilityRoster>(
        &self,
        submission: &SubmissionToOfficial,
        secret: &SecretKey,
        voter_public: &PublicKey,
        machine_key: &EnvelopePublicKey,
        roster: &mut R,
    ) -> Result<AuthorizationToMachine, VerificationError> {
        let (envelope_secret, _) = sealed::derive_keypair(secret);
        let payload = SubmissionPayload::open(submission, &envelope_secret)?;

        if !crypt::verify(payload.identity.as_bytes(), &payload.identity_sig, voter_public) {
            warn!(
                "athens: official: identity signature failed for session {}",
                payload.session
            );
            return Err(VerificationError::AuthenticationFailed);
        }

        if !roster.is_eligible(&payload.identity) {
            warn!(
                "athens: official: rejected ineligible voter {} in session {}",
                payload.identity, payload.session
            );
            return Err(VerificationError::VoterNotEligible);
        }

        let attestation = crypt::sign(payload.commitment.as_bytes(), secret);
        let authorization = AuthorizationPayload {
            attestation,
            commitment: payload.commitment,
        }
        .seal(payload.session, machine_key);

        roster.mark_voted(&payload.identity);

        Ok(authorization)
    }
}
