//! Sealed envelopes: an integrated encryption scheme on Twisted Edwards Curve25519.
//!
//! An envelope is sealed to a recipient's public key with an ephemeral
//! key-exchange, so payloads of any size can be carried: the ephemeral shared
//! secret is run through HKDF-SHA256 and the payload encrypted under
//! AES-256-GCM. Only the holder of the recipient's secret key can open the
//! envelope, and any tampering with the ciphertext is detected by the GCM tag.
//!
//! Envelope keys use the same secret key representation as the ed25519
//! signature scheme, but a different public key representation: the secret
//! scalar is used directly, without the bit-mangling the signature scheme
//! applies. Parties therefore hold one secret key and derive their envelope
//! keypair from it, see [`derive_keypair`].

use aes_gcm::aead::{generic_array::GenericArray, Aead, NewAead};
use aes_gcm::Aes256Gcm;
use curve25519_dalek::constants;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::PUBLIC_KEY_LENGTH;
use ed25519_dalek::{PublicKey, SecretKey};
use hkdf::Hkdf;
use rand::{thread_rng, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;

use crate::Error;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// The smallest well-formed envelope: ephemeral public key, nonce, GCM tag.
const MIN_ENVELOPE_LENGTH: usize = PUBLIC_KEY_LENGTH + NONCE_LENGTH + TAG_LENGTH;

type SymmetricKey = [u8; 32];
type SharedSecret = [u8; 32];

/// An ed25519 public key meant for sealing envelopes.
///
/// This key must not be used for signing or in any protocol other than
/// envelope encryption.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnvelopePublicKey(PublicKey);

impl EnvelopePublicKey {
    /// Convert this public key to a byte array.
    #[inline]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    /// View this public key as a byte array.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Construct an `EnvelopePublicKey` from a slice of bytes.
    ///
    /// Returns None if the bytes are not a valid curve point.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let public = match PublicKey::from_bytes(bytes) {
            Ok(public) => public,
            Err(_) => return None,
        };

        Some(EnvelopePublicKey(public))
    }

    /// Derive the public key belonging to a secret key.
    pub fn from_secret(sk: &SecretKey) -> Self {
        let point = &Scalar::from_bits(sk.to_bytes()) * &constants::ED25519_BASEPOINT_TABLE;
        let public = PublicKey::from_bytes(&point.compress().to_bytes()).unwrap();
        EnvelopePublicKey(public)
    }

    /// Get the Edwards point for this public key.
    ///
    /// Construction validates the compressed point, so decompression here
    /// cannot fail.
    fn as_point(&self) -> EdwardsPoint {
        CompressedEdwardsY::from_slice(self.0.as_bytes())
            .decompress()
            .unwrap()
    }
}

impl AsRef<[u8]> for EnvelopePublicKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// A sealed envelope, opaque to everyone but the recipient.
///
/// Layout: `ephemeral_pk (32) || nonce (12) || ciphertext + tag`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    #[serde(with = "hex_serde")]
    ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// View the raw envelope bytes. Signatures over an envelope sign exactly
    /// these bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Copy the raw envelope bytes out, for embedding in a larger message.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.ciphertext.clone()
    }

    /// Construct an envelope from raw bytes, checking the minimum length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < MIN_ENVELOPE_LENGTH {
            return Err(Error::EnvelopeTooShort);
        }
        Ok(EncryptedEnvelope {
            ciphertext: bytes.to_vec(),
        })
    }
}

/// Generate a fresh keypair, ready for sealing envelopes.
pub fn generate_keypair() -> (SecretKey, EnvelopePublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let ed25519_dalek::Keypair { public: _, secret } =
        ed25519_dalek::Keypair::generate(&mut csprng);
    let public = EnvelopePublicKey::from_secret(&secret);
    (secret, public)
}

/// Derive the envelope keypair belonging to a signing secret key.
///
/// Deterministic: the same signing key always yields the same envelope
/// keypair, so a party can publish one signing public key and one envelope
/// public key while holding a single secret.
pub fn derive_keypair(signing_secret: &SecretKey) -> (SecretKey, EnvelopePublicKey) {
    let hkdf = Hkdf::<Sha256>::new(None, signing_secret.as_bytes());
    let mut seed = [0u8; 32];
    hkdf.expand(b"athens-envelope-keypair", &mut seed)
        .expect("athens: sealed: hkdf expand failure");

    let mut rng = ChaCha20Rng::from_seed(seed);
    let ed25519_dalek::Keypair { public: _, secret } = ed25519_dalek::Keypair::generate(&mut rng);
    let public = EnvelopePublicKey::from_secret(&secret);
    (secret, public)
}

/// Seal a message to the receiver's public key. Only the receiver's
/// secret key can open the resulting envelope.
pub fn encrypt(receiver_pub: &EnvelopePublicKey, msg: &[u8]) -> EncryptedEnvelope {
    let (ephemeral_sk, ephemeral_pk) = generate_keypair();

    let key = encapsulate(&ephemeral_sk, receiver_pub);
    let encrypted = symmetric_encrypt(&key, msg);

    let mut ciphertext = Vec::with_capacity(PUBLIC_KEY_LENGTH + encrypted.len());
    ciphertext.extend(ephemeral_pk.to_bytes().iter());
    ciphertext.extend(encrypted);

    EncryptedEnvelope { ciphertext }
}

/// Open a sealed envelope using the receiver's secret key.
///
/// Fails with `Error::DecryptionFailed` if the envelope was sealed to a
/// different key, has been tampered with, or is malformed. No further
/// detail is exposed.
pub fn decrypt(receiver_sec: &SecretKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, Error> {
    // Deserialized envelopes bypass from_bytes, so re-check the length.
    let msg = envelope.as_bytes();
    if msg.len() < MIN_ENVELOPE_LENGTH {
        return Err(Error::DecryptionFailed);
    }

    let ephemeral_pk =
        EnvelopePublicKey::from_bytes(&msg[..PUBLIC_KEY_LENGTH]).ok_or(Error::DecryptionFailed)?;
    let encrypted = &msg[PUBLIC_KEY_LENGTH..];
    let key = decapsulate(receiver_sec, &ephemeral_pk);

    symmetric_decrypt(&key, encrypted)
}

fn hkdf_sha256(master: &[u8]) -> SymmetricKey {
    let h = Hkdf::<Sha256>::new(None, master);
    let mut out = [0u8; 32];
    h.expand(&[], &mut out).unwrap();
    out
}

fn generate_shared(secret: &SecretKey, public: &EnvelopePublicKey) -> SharedSecret {
    let public = public.as_point();
    let secret = Scalar::from_bits(secret.to_bytes());
    let shared_point = public * secret;
    let shared_point = shared_point.compress();
    shared_point.as_bytes().to_owned()
}

fn encapsulate(ephemeral_sk: &SecretKey, peer_pk: &EnvelopePublicKey) -> SymmetricKey {
    let shared_point = generate_shared(ephemeral_sk, peer_pk);

    let ephemeral_pk = EnvelopePublicKey::from_secret(ephemeral_sk);

    let mut master = Vec::with_capacity(32 * 2);
    master.extend(ephemeral_pk.as_bytes().iter());
    master.extend(shared_point.iter());
    hkdf_sha256(master.as_slice())
}

fn decapsulate(sk: &SecretKey, ephemeral_pk: &EnvelopePublicKey) -> SymmetricKey {
    let shared_point = generate_shared(sk, ephemeral_pk);

    let mut master = Vec::with_capacity(32 * 2);
    master.extend(ephemeral_pk.as_bytes().iter());
    master.extend(shared_point.iter());

    hkdf_sha256(master.as_slice())
}

fn symmetric_encrypt(key: &SymmetricKey, msg: &[u8]) -> Vec<u8> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; NONCE_LENGTH];
    thread_rng().fill(&mut nonce);

    let ciphertext = aead
        .encrypt(GenericArray::from_slice(&nonce), msg)
        .expect("athens: sealed: encryption failure");

    let mut output = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    output.extend(nonce.iter());
    output.extend(ciphertext);

    output
}

fn symmetric_decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(GenericArray::from_slice(key));

    let nonce = GenericArray::from_slice(&ciphertext[..NONCE_LENGTH]);
    let encrypted = &ciphertext[NONCE_LENGTH..];

    aead.decrypt(nonce, encrypted)
        .map_err(|_| Error::DecryptionFailed)
}
