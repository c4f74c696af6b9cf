//! The voting machine: pairs the two inbound channels, verifies the chain
//! of custody, and records accepted ballots.
//!
//! The machine never learns who is voting. It sees a session id, an
//! authorization relayed by the official, and a sealed ballot; nothing in
//! any of them names the voter.

use ed25519_dalek::{PublicKey, SecretKey, Signature};
use log::{debug, warn};
use std::collections::BTreeMap;

use crate::crypt;
use crate::crypt::BallotDigest;
use crate::messages;
use crate::messages::{
    AuthorizationPayload, AuthorizationToMachine, BallotSubmissionToMachine, CommitmentPayload,
    SessionId,
};
use crate::sealed;
use crate::sealed::{EncryptedEnvelope, EnvelopePublicKey};
use crate::serde_hex::{BallotDigestHex, EdSignatureHex, Hex};
use crate::verify::{verify_digest_match, verify_official_attestation, verify_voter_binding};
use crate::Error;
use crate::VerificationError;

/// One session's half-arrived messages.
#[derive(Default, Debug, Clone)]
struct PendingSession {
    authorization: Option<AuthorizationToMachine>,
    submission: Option<BallotSubmissionToMachine>,
}

/// The voting machine for one election.
///
/// Publishes an envelope public key that voters and the official seal
/// machine-bound messages to. Messages from the two inbound channels are
/// buffered by session id until both halves are present; no decryption or
/// verification happens until then.
pub struct Machine {
    pub encryption_key: EnvelopePublicKey,
    pending: BTreeMap<SessionId, PendingSession>,
}

impl Machine {
    /// Create a new machine. Returns the secret key, it is never stored.
    pub fn new() -> (Self, SecretKey) {
        let (secret, _) = crypt::generate_keypair();
        let (_, encryption_key) = sealed::derive_keypair(&secret);
        let machine = Machine {
            encryption_key,
            pending: BTreeMap::new(),
        };
        (machine, secret)
    }

    /// Take delivery of an authorization from the official's channel.
    ///
    /// Returns the completed pair once the session's ballot submission has
    /// also arrived, in either order. A retransmission replaces the
    /// buffered message for its channel.
    pub fn receive_authorization(
        &mut self,
        authorization: AuthorizationToMachine,
    ) -> Option<(AuthorizationToMachine, BallotSubmissionToMachine)> {
        let session = authorization.session;
        let slot = self.pending.entry(session).or_default();
        if slot.authorization.replace(authorization).is_some() {
            debug!(
                "athens: machine: replaced buffered authorization for session {}",
                session
            );
        }
        self.take_completed(session)
    }

    /// Take delivery of a ballot submission from the voter's channel.
    ///
    /// The counterpart of [`Machine::receive_authorization`].
    pub fn receive_submission(
        &mut self,
        submission: BallotSubmissionToMachine,
    ) -> Option<(AuthorizationToMachine, BallotSubmissionToMachine)> {
        let session = submission.session;
        let slot = self.pending.entry(session).or_default();
        if slot.submission.replace(submission).is_some() {
            debug!(
                "athens: machine: replaced buffered ballot submission for session {}",
                session
            );
        }
        self.take_completed(session)
    }

    /// Number of sessions still waiting on one of their two channels.
    pub fn pending_sessions(&self) -> usize {
        self.pending.len()
    }

    fn take_completed(
        &mut self,
        session: SessionId,
    ) -> Option<(AuthorizationToMachine, BallotSubmissionToMachine)> {
        let complete = {
            let slot = self.pending.get(&session)?;
            slot.authorization.is_some() && slot.submission.is_some()
        };
        if !complete {
            return None;
        }

        let slot = self.pending.remove(&session)?;
        match (slot.authorization, slot.submission) {
            (Some(authorization), Some(submission)) => Some((authorization, submission)),
            _ => None,
        }
    }

    /// Verify a completed pair and accept the ballot.
    ///
    /// Checks, in order: the sessions match across channels, the official's
    /// attestation covers the commitment envelope, the commitment is signed
    /// by the voter, and the submitted ballot hashes to the committed
    /// digest. Nothing is accepted unless every check passes.
    pub fn accept_and_verify(
        authorization: &AuthorizationToMachine,
        submission: &BallotSubmissionToMachine,
        secret: &SecretKey,
        official_public: &PublicKey,
        voter_public: &PublicKey,
    ) -> Result<(AcceptedBallot, Receipt), VerificationError> {
        let session = authorization.session;
        if session != submission.session {
            return Err(Error::SessionMismatch.into());
        }

        let (envelope_secret, _) = sealed::derive_keypair(secret);
        let authorization = AuthorizationPayload::open(authorization, &envelope_secret)?;

        verify_official_attestation(
            &authorization.commitment,
            &authorization.attestation,
            official_public,
        )
        .map_err(|e| {
            warn!(
                "athens: machine: possible forged authorization for session {}: {}",
                session, e
            );
            e
        })?;

        let commitment = CommitmentPayload::open(&authorization.commitment, &envelope_secret)?;
        verify_voter_binding(&commitment.digest, &commitment.digest_sig, voter_public).map_err(
            |e| {
                warn!("athens: machine: rejected session {}: {}", session, e);
                e
            },
        )?;

        let ballot = messages::open_ballot(&submission.sealed, &envelope_secret)?;
        verify_digest_match(&commitment.digest, &ballot).map_err(|e| {
            warn!("athens: machine: rejected session {}: {}", session, e);
            e
        })?;

        let receipt = Receipt {
            session,
            digest: commitment.digest,
            digest_sig: commitment.digest_sig,
            commitment: authorization.commitment.clone(),
            attestation: authorization.attestation,
        };
        let accepted = AcceptedBallot {
            session,
            ballot,
            digest: commitment.digest,
            digest_sig: commitment.digest_sig,
            commitment: authorization.commitment,
            attestation: authorization.attestation,
        };

        Ok((accepted, receipt))
    }
}

/// A ballot the machine has verified and accepted, ready for the ballot
/// box.
///
/// Keeps the full evidence chain alongside the plaintext ballot, so an
/// audit can re-run every check without the machine's secret key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AcceptedBallot {
    pub session: SessionId,
    #[serde(with = "hex_serde")]
    pub ballot: Vec<u8>,
    #[serde(with = "BallotDigestHex")]
    pub digest: BallotDigest,
    #[serde(with = "EdSignatureHex")]
    pub digest_sig: Signature,
    pub commitment: EncryptedEnvelope,
    #[serde(with = "EdSignatureHex")]
    pub attestation: Signature,
}

/// The machine's receipt for an accepted ballot.
///
/// Carries no ballot plaintext, only the digest and the signatures over
/// it, so a receipt can be published without revealing the vote. The voter
/// confirms it with [`Receipt::verify`] against the ballot they cast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub session: SessionId,
    #[serde(with = "BallotDigestHex")]
    pub digest: BallotDigest,
    #[serde(with = "EdSignatureHex")]
    pub digest_sig: Signature,
    pub commitment: EncryptedEnvelope,
    #[serde(with = "EdSignatureHex")]
    pub attestation: Signature,
}

impl Receipt {
    /// Re-run the acceptance checks against a ballot.
    ///
    /// Needs no secret key: the receipt carries everything except the
    /// ballot, which the verifying party supplies.
    pub fn verify(
        &self,
        ballot: &[u8],
        voter_public: &PublicKey,
        official_public: &PublicKey,
    ) -> Result<(), VerificationError> {
        verify_official_attestation(&self.commitment, &self.attestation, official_public)?;
        verify_voter_binding(&self.digest, &self.digest_sig, voter_public)?;
        verify_digest_match(&self.digest, ballot)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        messages::from_bytes_sniffed(bytes)
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("athens: unexpected error packing receipt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::seal_ballot;

    fn dummy_authorization(
        session: SessionId,
        machine_key: &EnvelopePublicKey,
    ) -> AuthorizationToMachine {
        let (official_secret, _) = crypt::generate_keypair();
        let commitment = sealed::encrypt(machine_key, b"commitment");
        AuthorizationPayload {
            attestation: crypt::sign(commitment.as_bytes(), &official_secret),
            commitment,
        }
        .seal(session, machine_key)
    }

    fn dummy_submission(
        session: SessionId,
        machine_key: &EnvelopePublicKey,
    ) -> BallotSubmissionToMachine {
        BallotSubmissionToMachine {
            session,
            sealed: seal_ballot(b"Candidate A", machine_key),
        }
    }

    #[test]
    fn pairs_channels_in_either_order() {
        let (mut machine, _) = Machine::new();
        let key = machine.encryption_key.clone();

        // Authorization first
        let session = SessionId::new();
        assert!(machine
            .receive_authorization(dummy_authorization(session, &key))
            .is_none());
        assert_eq!(machine.pending_sessions(), 1);
        let (authorization, submission) = machine
            .receive_submission(dummy_submission(session, &key))
            .unwrap();
        assert_eq!(authorization.session, session);
        assert_eq!(submission.session, session);
        assert_eq!(machine.pending_sessions(), 0);

        // Submission first
        let session = SessionId::new();
        assert!(machine
            .receive_submission(dummy_submission(session, &key))
            .is_none());
        assert!(machine
            .receive_authorization(dummy_authorization(session, &key))
            .is_some());
        assert_eq!(machine.pending_sessions(), 0);
    }

    #[test]
    fn sessions_do_not_cross_pair() {
        let (mut machine, _) = Machine::new();
        let key = machine.encryption_key.clone();

        let one = SessionId::new();
        let two = SessionId::new();

        assert!(machine
            .receive_authorization(dummy_authorization(one, &key))
            .is_none());
        assert!(machine.receive_submission(dummy_submission(two, &key)).is_none());
        assert_eq!(machine.pending_sessions(), 2);

        // Each session completes only with its own counterpart
        let (authorization, _) = machine
            .receive_submission(dummy_submission(one, &key))
            .unwrap();
        assert_eq!(authorization.session, one);
        assert_eq!(machine.pending_sessions(), 1);
    }

    #[test]
    fn retransmission_replaces_the_buffered_message() {
        let (mut machine, _) = Machine::new();
        let key = machine.encryption_key.clone();

        let session = SessionId::new();
        let stale = dummy_submission(session, &key);
        let fresh = dummy_submission(session, &key);
        let fresh_sealed = fresh.sealed.clone();

        assert!(machine.receive_submission(stale).is_none());
        assert!(machine.receive_submission(fresh).is_none());
        assert_eq!(machine.pending_sessions(), 1);

        let (_, submission) = machine
            .receive_authorization(dummy_authorization(session, &key))
            .unwrap();
        assert_eq!(submission.sealed, fresh_sealed);
    }

    #[test]
    fn mismatched_sessions_are_rejected() {
        let (machine, secret) = Machine::new();
        let (_, official_public) = crypt::generate_keypair();
        let (_, voter_public) = crypt::generate_keypair();

        let authorization = dummy_authorization(SessionId::new(), &machine.encryption_key);
        let submission = dummy_submission(SessionId::new(), &machine.encryption_key);

        let result = Machine::accept_and_verify(
            &authorization,
            &submission,
            &secret,
            &official_public,
            &voter_public,
        );
        assert!(matches!(
            result,
            Err(VerificationError::Message(Error::SessionMismatch))
        ));
    }
}
