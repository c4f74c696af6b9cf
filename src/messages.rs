//! The messages exchanged between voter, official, and machine.
//!
//! Every message is a sealed envelope addressed to exactly one recipient,
//! optionally paired with a plaintext session identifier for correlation.
//! Inside the envelope sits a one-byte message kind followed by a
//! codec-framed field sequence, so a payload decrypted with the wrong
//! expectation is rejected before any field is read.

use ed25519_dalek::{SecretKey, Signature};
use log::warn;
use num_enum::TryFromPrimitive;
use uuid::Uuid;

use crate::codec;
use crate::codec::Field;
use crate::sealed;
use crate::sealed::{EncryptedEnvelope, EnvelopePublicKey};
use crate::BallotDigest;
use crate::Error;
use crate::Identity;

const FIELD_SESSION: &str = "session";
const FIELD_IDENTITY: &str = "identity";
const FIELD_IDENTITY_SIG: &str = "identity_sig";
const FIELD_COMMITMENT: &str = "commitment";
const FIELD_ATTESTATION: &str = "attestation";
const FIELD_DIGEST: &str = "digest";
const FIELD_DIGEST_SIG: &str = "digest_sig";
const FIELD_BALLOT: &str = "ballot";

/// A session identifier correlating one voter's messages across channels.
///
/// Generated by the voter, fresh per voting session. It carries no voter
/// information: to the machine it is an opaque correlation handle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session identifier.
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Uuid::from_slice(bytes)
            .map(SessionId)
            .map_err(|_| Error::FieldBadLen(FIELD_SESSION))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind tag sealed inside every envelope payload.
///
/// Opening an envelope checks the tag against the expected kind, so a
/// payload replayed into the wrong slot is rejected outright.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MessageKind {
    Submission = 1,
    Authorization = 2,
    Ballot = 3,
    Commitment = 4,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            MessageKind::Submission => "submission",
            MessageKind::Authorization => "authorization",
            MessageKind::Ballot => "ballot",
            MessageKind::Commitment => "commitment",
        };
        write!(f, "{}", s)
    }
}

/// Voter to official: the sealed submission opening a voting session.
///
/// Everything, the session identifier included, is sealed to the official.
/// An observer of this channel learns nothing but the envelope size.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmissionToOfficial {
    pub sealed: EncryptedEnvelope,
}

/// Official to machine: authorization to accept one ballot.
///
/// The session identifier is plaintext so the machine can pair this with
/// the matching ballot submission before decrypting anything.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationToMachine {
    pub session: SessionId,
    pub sealed: EncryptedEnvelope,
}

/// Voter to machine: the ballot itself, sealed to the machine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotSubmissionToMachine {
    pub session: SessionId,
    pub sealed: EncryptedEnvelope,
}

impl SubmissionToOfficial {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        from_bytes_sniffed(bytes)
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("athens: unexpected error packing message")
    }
}

impl AuthorizationToMachine {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        from_bytes_sniffed(bytes)
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("athens: unexpected error packing message")
    }
}

impl BallotSubmissionToMachine {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        from_bytes_sniffed(bytes)
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("athens: unexpected error packing message")
    }
}

// Messages are written as CBOR but accepted as either JSON or CBOR.
pub(crate) fn from_bytes_sniffed<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    match bytes.first() {
        // Check to see if it's JSON
        Some(b'{') => Ok(serde_json::from_slice(bytes)?),
        Some(_) => Ok(serde_cbor::from_slice(bytes)?),
        None => Err(Error::DeserializationUnknownFormat),
    }
}

/// The plaintext the voter seals to the official.
///
/// Carries the voter's claimed identity, the signature proving it, and the
/// ballot commitment envelope. The commitment is sealed to the machine, so
/// the official attests to bytes it cannot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    pub session: SessionId,
    pub identity: Identity,
    pub identity_sig: Signature,
    pub commitment: EncryptedEnvelope,
}

impl SubmissionPayload {
    pub fn seal(&self, official_key: &EnvelopePublicKey) -> SubmissionToOfficial {
        let fields = [
            Field::new(FIELD_SESSION, self.session.as_bytes().to_vec()),
            Field::new(FIELD_IDENTITY, self.identity.as_bytes().to_vec()),
            Field::new(FIELD_IDENTITY_SIG, self.identity_sig.to_bytes().to_vec()),
            Field::new(FIELD_COMMITMENT, self.commitment.to_bytes()),
        ];
        SubmissionToOfficial {
            sealed: seal_payload(MessageKind::Submission, &fields, official_key),
        }
    }

    pub fn open(
        submission: &SubmissionToOfficial,
        envelope_secret: &SecretKey,
    ) -> Result<Self, Error> {
        let fields = open_payload(MessageKind::Submission, &submission.sealed, envelope_secret)?;
        expect_fields(&fields, 4)?;

        Ok(SubmissionPayload {
            session: SessionId::from_slice(take(&fields, 0, FIELD_SESSION)?)?,
            identity: Identity::from_bytes(take(&fields, 1, FIELD_IDENTITY)?)?,
            identity_sig: Signature::from_bytes(take(&fields, 2, FIELD_IDENTITY_SIG)?)?,
            commitment: EncryptedEnvelope::from_bytes(take(&fields, 3, FIELD_COMMITMENT)?)?,
        })
    }
}

/// The plaintext the official seals to the machine.
///
/// The commitment envelope is passed through untouched, paired with the
/// official's attestation signature over its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPayload {
    pub attestation: Signature,
    pub commitment: EncryptedEnvelope,
}

impl AuthorizationPayload {
    pub fn seal(
        &self,
        session: SessionId,
        machine_key: &EnvelopePublicKey,
    ) -> AuthorizationToMachine {
        let fields = [
            Field::new(FIELD_ATTESTATION, self.attestation.to_bytes().to_vec()),
            Field::new(FIELD_COMMITMENT, self.commitment.to_bytes()),
        ];
        AuthorizationToMachine {
            session,
            sealed: seal_payload(MessageKind::Authorization, &fields, machine_key),
        }
    }

    pub fn open(
        authorization: &AuthorizationToMachine,
        envelope_secret: &SecretKey,
    ) -> Result<Self, Error> {
        let fields = open_payload(
            MessageKind::Authorization,
            &authorization.sealed,
            envelope_secret,
        )?;
        expect_fields(&fields, 2)?;

        Ok(AuthorizationPayload {
            attestation: Signature::from_bytes(take(&fields, 0, FIELD_ATTESTATION)?)?,
            commitment: EncryptedEnvelope::from_bytes(take(&fields, 1, FIELD_COMMITMENT)?)?,
        })
    }
}

/// The voter's ballot commitment, sealed to the machine and routed through
/// the official.
///
/// Holds the ballot digest and the voter's signature over it. The digest
/// travels alongside its signature so the machine checks the voter binding
/// and the ballot match independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentPayload {
    pub digest: BallotDigest,
    pub digest_sig: Signature,
}

impl CommitmentPayload {
    pub fn seal(&self, machine_key: &EnvelopePublicKey) -> EncryptedEnvelope {
        let fields = [
            Field::new(FIELD_DIGEST, self.digest.as_bytes().to_vec()),
            Field::new(FIELD_DIGEST_SIG, self.digest_sig.to_bytes().to_vec()),
        ];
        seal_payload(MessageKind::Commitment, &fields, machine_key)
    }

    pub fn open(envelope: &EncryptedEnvelope, envelope_secret: &SecretKey) -> Result<Self, Error> {
        let fields = open_payload(MessageKind::Commitment, envelope, envelope_secret)?;
        expect_fields(&fields, 2)?;

        Ok(CommitmentPayload {
            digest: BallotDigest::from_bytes(take(&fields, 0, FIELD_DIGEST)?)?,
            digest_sig: Signature::from_bytes(take(&fields, 1, FIELD_DIGEST_SIG)?)?,
        })
    }
}

/// Seal a ballot to the machine.
pub fn seal_ballot(ballot: &[u8], machine_key: &EnvelopePublicKey) -> EncryptedEnvelope {
    let fields = [Field::new(FIELD_BALLOT, ballot.to_vec())];
    seal_payload(MessageKind::Ballot, &fields, machine_key)
}

/// Open a sealed ballot with the machine's envelope secret.
pub fn open_ballot(
    envelope: &EncryptedEnvelope,
    envelope_secret: &SecretKey,
) -> Result<Vec<u8>, Error> {
    let fields = open_payload(MessageKind::Ballot, envelope, envelope_secret)?;
    expect_fields(&fields, 1)?;

    Ok(take(&fields, 0, FIELD_BALLOT)?.to_vec())
}

fn seal_payload(
    kind: MessageKind,
    fields: &[Field],
    recipient: &EnvelopePublicKey,
) -> EncryptedEnvelope {
    let encoded = codec::encode(fields);
    let mut payload = Vec::with_capacity(1 + encoded.len());
    payload.push(kind as u8);
    payload.extend_from_slice(&encoded);
    sealed::encrypt(recipient, &payload)
}

fn open_payload(
    kind: MessageKind,
    envelope: &EncryptedEnvelope,
    envelope_secret: &SecretKey,
) -> Result<Vec<Field>, Error> {
    let payload = sealed::decrypt(envelope_secret, envelope)?;

    let found = match payload.first() {
        Some(byte) => {
            MessageKind::try_from_primitive(*byte).map_err(|_| Error::UnexpectedMessageKind)?
        }
        None => return Err(Error::TruncatedMessage),
    };
    if found != kind {
        warn!("athens: rejecting {} payload, {} was expected", found, kind);
        return Err(Error::UnexpectedMessageKind);
    }

    codec::decode(&payload[1..])
}

fn take<'a>(fields: &'a [Field], index: usize, name: &'static str) -> Result<&'a [u8], Error> {
    match fields.get(index) {
        Some(field) if field.name == name => Ok(&field.value),
        _ => Err(Error::MissingField(name)),
    }
}

fn expect_fields(fields: &[Field], count: usize) -> Result<(), Error> {
    if fields.len() > count {
        return Err(Error::UnexpectedField);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt;

    #[test]
    fn submission_payload_round_trip() {
        let (official_secret, official_key) = sealed::generate_keypair();
        let (_, machine_key) = sealed::generate_keypair();
        let (voter_secret, _) = crypt::generate_keypair();

        let digest = crypt::hash(b"Candidate A");
        let payload = SubmissionPayload {
            session: SessionId::new(),
            identity: Identity::from("V-0042"),
            identity_sig: crypt::sign(b"V-0042", &voter_secret),
            commitment: CommitmentPayload {
                digest,
                digest_sig: crypt::sign(digest.as_bytes(), &voter_secret),
            }
            .seal(&machine_key),
        };

        let submission = payload.seal(&official_key);
        let opened = SubmissionPayload::open(&submission, &official_secret).unwrap();

        assert_eq!(payload, opened);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let (_, official_key) = sealed::generate_keypair();
        let (machine_secret, machine_key) = sealed::generate_keypair();
        let (voter_secret, _) = crypt::generate_keypair();

        let digest = crypt::hash(b"Candidate A");
        let payload = SubmissionPayload {
            session: SessionId::new(),
            identity: Identity::from("V-0042"),
            identity_sig: crypt::sign(b"V-0042", &voter_secret),
            commitment: CommitmentPayload {
                digest,
                digest_sig: crypt::sign(digest.as_bytes(), &voter_secret),
            }
            .seal(&machine_key),
        };

        let submission = payload.seal(&official_key);
        assert!(matches!(
            SubmissionPayload::open(&submission, &machine_secret),
            Err(Error::DecryptionFailed)
        ));
    }

    #[test]
    fn payload_kind_is_checked() {
        let (machine_secret, machine_key) = sealed::generate_keypair();

        // A sealed ballot is not an acceptable commitment envelope
        let envelope = seal_ballot(b"Candidate A", &machine_key);
        assert!(matches!(
            CommitmentPayload::open(&envelope, &machine_secret),
            Err(Error::UnexpectedMessageKind)
        ));

        // The kind names used in rejection logs
        assert_eq!(format!("{}", MessageKind::Ballot), "ballot");
        assert_eq!(format!("{}", MessageKind::Commitment), "commitment");
    }

    #[test]
    fn extra_fields_are_rejected() {
        let (machine_secret, machine_key) = sealed::generate_keypair();

        let fields = [
            Field::new(FIELD_BALLOT, b"Candidate A".to_vec()),
            Field::new("trailing", b"surplus".to_vec()),
        ];
        let envelope = seal_payload(MessageKind::Ballot, &fields, &machine_key);

        assert!(matches!(
            open_ballot(&envelope, &machine_secret),
            Err(Error::UnexpectedField)
        ));
    }

    #[test]
    fn ballot_round_trip() {
        let (machine_secret, machine_key) = sealed::generate_keypair();

        let envelope = seal_ballot(b"Candidate A", &machine_key);
        let ballot = open_ballot(&envelope, &machine_secret).unwrap();

        assert_eq!(ballot, b"Candidate A");
    }

    #[test]
    fn message_bytes_round_trip() {
        let (_, machine_key) = sealed::generate_keypair();
        let session = SessionId::new();
        let envelope = seal_ballot(b"Candidate A", &machine_key);

        // CBOR is the native format
        let submission = SubmissionToOfficial {
            sealed: envelope.clone(),
        };
        let decoded = SubmissionToOfficial::from_bytes(&submission.as_bytes()).unwrap();
        assert_eq!(submission, decoded);

        let authorization = AuthorizationToMachine {
            session,
            sealed: envelope.clone(),
        };
        let decoded = AuthorizationToMachine::from_bytes(&authorization.as_bytes()).unwrap();
        assert_eq!(authorization, decoded);

        let ballot = BallotSubmissionToMachine {
            session,
            sealed: envelope,
        };
        let decoded = BallotSubmissionToMachine::from_bytes(&ballot.as_bytes()).unwrap();
        assert_eq!(ballot, decoded);

        // JSON is accepted too
        let json = serde_json::to_vec(&submission).unwrap();
        assert_eq!(submission, SubmissionToOfficial::from_bytes(&json).unwrap());

        let json = serde_json::to_vec(&authorization).unwrap();
        assert_eq!(authorization, AuthorizationToMachine::from_bytes(&json).unwrap());

        let json = serde_json::to_vec(&ballot).unwrap();
        assert_eq!(ballot, BallotSubmissionToMachine::from_bytes(&json).unwrap());

        assert!(matches!(
            BallotSubmissionToMachine::from_bytes(&[]),
            Err(Error::DeserializationUnknownFormat)
        ));
    }

    #[test]
    fn session_id_from_slice_checks_length() {
        let session = SessionId::new();
        assert_eq!(
            session,
            SessionId::from_slice(&session.as_bytes()[..]).unwrap()
        );

        assert!(SessionId::from_slice(&[0u8; 8]).is_err());
    }
}
