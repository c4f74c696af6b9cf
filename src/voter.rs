//! The voter: commits to a ballot, submits it, and checks the receipt.

use ed25519_dalek::{PublicKey, SecretKey};

use crate::crypt;
use crate::machine::Receipt;
use crate::messages;
use crate::messages::{
    BallotSubmissionToMachine, CommitmentPayload, SessionId, SubmissionPayload,
    SubmissionToOfficial,
};
use crate::sealed::EnvelopePublicKey;
use crate::serde_hex::{EdPublicKeyHex, Hex};
use crate::Error;
use crate::VerificationError;

/// A voter's registered identity, as the eligibility roster knows it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let identity = std::str::from_utf8(bytes).map_err(|_| Error::IdentityBadUtf8)?;
        Ok(Identity(identity.to_owned()))
    }
}

impl From<&str> for Identity {
    fn from(identity: &str) -> Self {
        Identity(identity.to_owned())
    }
}

impl From<String> for Identity {
    fn from(identity: String) -> Self {
        Identity(identity)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A voter in a single voting session.
///
/// Holds the public half of the voter's key; the secret key stays with the
/// caller and is passed in per operation. One `Voter` value is one session:
/// casting again means constructing a new one with a fresh session id.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Voter {
    pub identity: Identity,
    pub session: SessionId,
    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,
}

impl Voter {
    /// Create a new voter with a fresh keypair and session id.
    ///
    /// In a real deployment the keypair comes from voter registration and
    /// the registrar publishes the public key. Returns the secret key, it
    /// is never stored.
    pub fn new(identity: impl Into<Identity>) -> (Self, SecretKey) {
        let (secret, public_key) = crypt::generate_keypair();
        let voter = Voter {
            identity: identity.into(),
            session: SessionId::new(),
            public_key,
        };
        (voter, secret)
    }

    /// Build the sealed submission that opens this voting session with the
    /// official.
    ///
    /// The ballot itself never enters this message. The voter commits to it
    /// by signing its digest, and seals digest and signature to the machine
    /// so the official attests to an envelope it cannot read.
    pub fn prepare_submission(
        &self,
        ballot: &[u8],
        secret: &SecretKey,
        machine_key: &EnvelopePublicKey,
        official_key: &EnvelopePublicKey,
    ) -> SubmissionToOfficial {
        let digest = crypt::hash(ballot);
        let digest_sig = crypt::sign(digest.as_bytes(), secret);
        let commitment = CommitmentPayload { digest, digest_sig }.seal(machine_key);

        let identity_sig = crypt::sign(self.identity.as_bytes(), secret);

        SubmissionPayload {
            session: self.session,
            identity: self.identity.clone(),
            identity_sig,
            commitment,
        }
        .seal(official_key)
    }

    /// Seal the ballot to the machine, on the direct channel.
    ///
    /// Independent of the official's channel: the two may arrive at the
    /// machine in either order.
    pub fn submit_ballot(
        &self,
        ballot: &[u8],
        machine_key: &EnvelopePublicKey,
    ) -> BallotSubmissionToMachine {
        BallotSubmissionToMachine {
            session: self.session,
            sealed: messages::seal_ballot(ballot, machine_key),
        }
    }

    /// Check a receipt against the ballot this voter actually cast.
    ///
    /// Re-runs the machine's acceptance checks on the voter's side: the
    /// receipt must belong to this session, carry a valid attestation by
    /// the official, bind the digest to this voter's key, and match the
    /// cast ballot.
    pub fn confirm_receipt(
        &self,
        receipt: &Receipt,
        ballot: &[u8],
        official_public: &PublicKey,
    ) -> Result<(), VerificationError> {
        if receipt.session != self.session {
            return Err(VerificationError::ReceiptSessionMismatch);
        }
        receipt.verify(ballot, &self.public_key, official_public)
    }
}
