use digest::Digest;
use ed25519_dalek::ExpandedSecretKey;
use ed25519_dalek::Keypair;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use ed25519_dalek::Signature;
use sha2::Sha512;

use crate::Error;

/// Length in bytes of a ballot digest (SHA-512).
pub const DIGEST_LENGTH: usize = 64;

/// SHA-512 digest of a serialized ballot.
///
/// A voter commits to a ballot by signing its digest. Parties that never see
/// the ballot plaintext pass the digest around as an opaque commitment.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BallotDigest([u8; DIGEST_LENGTH]);

impl BallotDigest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != DIGEST_LENGTH {
            return Err(Error::DigestBadLen);
        }
        let mut digest = [0u8; DIGEST_LENGTH];
        digest.copy_from_slice(bytes);
        Ok(BallotDigest(digest))
    }
}

impl std::fmt::Display for BallotDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..]))
    }
}

impl std::fmt::Debug for BallotDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..]))
    }
}

/// Generate an ed25519 keypair for signing.
///
/// Every party holds exactly one secret key. Envelope encryption keys are
/// derived from it, see `sealed::derive_keypair`.
pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let Keypair { public, secret } = Keypair::generate(&mut csprng);

    (secret, public)
}

/// Sign a message, producing an ed25519 signature over the raw bytes.
pub fn sign(message: &[u8], secret: &SecretKey) -> Signature {
    let public = PublicKey::from(secret);
    let expanded: ExpandedSecretKey = secret.into();

    expanded.sign(message, &public)
}

/// Check a signature against a message and the signer's public key.
pub fn verify(message: &[u8], signature: &Signature, public: &PublicKey) -> bool {
    public.verify_strict(message, signature).is_ok()
}

/// Hash a serialized ballot down to its digest.
pub fn hash(message: &[u8]) -> BallotDigest {
    let mut digest = [0u8; DIGEST_LENGTH];
    digest.copy_from_slice(Sha512::digest(message).as_slice());

    BallotDigest(digest)
}
