#[macro_use]
extern crate serde;

mod codec;
mod crypt;
mod error;
mod machine;
mod messages;
mod official;
mod serde_hex;
mod verify;
mod voter;

pub mod sealed;

pub use codec::*;
pub use crypt::*;
pub use error::*;
pub use machine::*;
pub use messages::*;
pub use official::*;
pub use sealed::{EncryptedEnvelope, EnvelopePublicKey};
pub use serde_hex::*;
pub use verify::*;
pub use voter::*;
