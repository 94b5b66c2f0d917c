//! Noise handshake driving and transport encryption for a single stream.
//!
//! Two patterns are supported, both over `25519_ChaChaPoly_BLAKE2s`: `XX` (mutually
//! authenticated, static keys exported on completion) and `NN` (anonymous). A [`Session`] is
//! created from a [`SessionConfig`], driven with [`Session::drive`] and
//! [`Session::supply_handshake_message`] until it reports [`Step::Completed`], and from then on
//! encrypts and decrypts application messages. Framing and I/O are left to the caller.
//!
//! ```
//! use noise_stream::{Pattern, Role, Session, SessionConfig, Step};
//!
//! let mut alice = Session::create(&SessionConfig::new(Role::Initiator, Pattern::NN)).unwrap();
//! let mut bob = Session::create(&SessionConfig::new(Role::Responder, Pattern::NN)).unwrap();
//!
//! let Step::AwaitMessage { outbound } = alice.drive().unwrap() else { unreachable!() };
//! bob.drive().unwrap();
//! let Step::Completed { outbound: reply, .. } = bob.supply_handshake_message(&outbound[0]).unwrap()
//! else { unreachable!() };
//! assert!(alice.supply_handshake_message(&reply[0]).unwrap().is_completed());
//!
//! let ct = alice.encrypt(b"ping").unwrap();
//! assert_eq!(&bob.decrypt(&ct).unwrap()[..], b"ping");
//! ```

/// One each during handshake. During transport, each direction has its own.
mod cipher_state;
pub mod config;
pub mod dh;
pub mod error;
/// Pattern interpreter: the transcript plus local and remote DH keys. Consumed by the split.
mod hs_state;
mod nonce;
pub mod pattern;
pub mod session;
/// Chaining key, handshake hash and the current handshake cipher. Gone after the split.
mod symm_state;
pub mod transport;

pub use cipher_state::MAC_LEN;
pub use config::{KeyVerifier, SessionConfig};
pub use dh::{KeyPair, DH_LEN};
pub use error::{Error, Result};
pub use hs_state::{Action, ExportedKeys, MAX_MESSAGE_LEN};
pub use pattern::{Pattern, Role};
pub use session::{Completion, Session, SessionPhase, Step};
pub use symm_state::HASH_LEN;
pub use transport::{TransportCipherPair, MAX_CHUNK_LEN};
