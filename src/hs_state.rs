use bytes::BytesMut;
use rand_core::CryptoRngCore;
use tracing::{debug, trace};
use x25519_dalek::PublicKey;
use zeroize::Zeroizing;

use crate::{
    dh::{KeyPair, DH_LEN},
    error::{Error, Result},
    pattern::{Pattern, Role, Token},
    symm_state::SymmState,
    transport::TransportCipherPair,
};

/// Largest handshake message Noise allows.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// What the local party has to do before the handshake can move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ProduceMessage,
    ConsumeMessage,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HsPhase {
    Handshaking(usize),
    Complete,
    Failed,
}

/// Static key material surfaced when a mutually authenticated handshake splits.
pub struct ExportedKeys {
    pub local_private_key: Zeroizing<[u8; DH_LEN]>,
    pub local_public_key: [u8; DH_LEN],
    pub remote_public_key: [u8; DH_LEN],
}

impl core::fmt::Debug for ExportedKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExportedKeys")
            .field("local_public_key", &self.local_public_key)
            .field("remote_public_key", &self.remote_public_key)
            .finish_non_exhaustive()
    }
}

/// Transcript state of one handshake. Consumed by [`HsState::split`].
pub(crate) struct HsState {
    role: Role,
    pattern: Pattern,
    phase: HsPhase,
    symm_state: SymmState,
    local_ephemeral: KeyPair,
    local_static: Option<KeyPair>,
    remote_ephemeral: Option<PublicKey>,
    remote_static: Option<PublicKey>,
}

impl HsState {
    /// Draws the static key (when the pattern needs one and none is given) and then the
    /// ephemeral from `rng`, in that order.
    pub(crate) fn start(
        role: Role,
        pattern: Pattern,
        prologue: &[u8],
        static_private_key: Option<&[u8]>,
        rng: &mut impl CryptoRngCore,
    ) -> Result<Self> {
        let local_static = match (pattern.uses_static_keys(), static_private_key) {
            (true, Some(bytes)) => Some(KeyPair::from_private_bytes(bytes)?),
            (true, None) => Some(KeyPair::generate(rng)),
            (false, Some(_)) => {
                return Err(Error::config(format!(
                    "pattern {pattern:?} carries no static key"
                )))
            }
            (false, None) => None,
        };
        let local_ephemeral = KeyPair::generate(rng);

        let mut symm_state = SymmState::init(pattern.protocol_name().as_bytes());
        symm_state.mix_hash(prologue);

        debug!(?role, ?pattern, prologue_len = prologue.len(), "handshake started");
        Ok(Self {
            role,
            pattern,
            phase: HsPhase::Handshaking(0),
            symm_state,
            local_ephemeral,
            local_static,
            remote_ephemeral: None,
            remote_static: None,
        })
    }

    pub(crate) fn action(&self) -> Result<Action> {
        match self.phase {
            HsPhase::Handshaking(index) if self.pattern.sender(index) == self.role => {
                Ok(Action::ProduceMessage)
            }
            HsPhase::Handshaking(_) => Ok(Action::ConsumeMessage),
            HsPhase::Complete => Ok(Action::Complete),
            HsPhase::Failed => Err(Error::SessionFailed),
        }
    }

    pub(crate) fn message_index(&self) -> Option<usize> {
        match self.phase {
            HsPhase::Handshaking(index) => Some(index),
            HsPhase::Complete => Some(self.pattern.message_count()),
            HsPhase::Failed => None,
        }
    }

    /// Appends the next handshake message to `out`.
    pub(crate) fn produce_next_message(&mut self, out: &mut BytesMut) -> Result<()> {
        if self.action()? != Action::ProduceMessage {
            return Err(Error::InvalidInput("not this party's turn to write"));
        }
        let HsPhase::Handshaking(index) = self.phase else {
            return Err(Error::InvalidInput("handshake not in progress"));
        };

        let start = out.len();
        match self.write_message(index, out) {
            Ok(()) => {
                debug!(
                    role = ?self.role,
                    message_index = index,
                    len = out.len() - start,
                    "produced handshake message"
                );
                self.advance(index);
                Ok(())
            }
            Err(e) => {
                out.truncate(start);
                Err(self.fail(e))
            }
        }
    }

    pub(crate) fn consume_message(&mut self, message: &[u8]) -> Result<()> {
        if self.action()? != Action::ConsumeMessage {
            return Err(Error::InvalidInput("not expecting a handshake message"));
        }
        let HsPhase::Handshaking(index) = self.phase else {
            return Err(Error::InvalidInput("handshake not in progress"));
        };
        if message.len() > MAX_MESSAGE_LEN {
            return Err(Error::InvalidInput("handshake message too long"));
        }
        if message.len() < self.pattern.min_message_len(index, self.symm_state.has_key()) {
            return Err(Error::InvalidInput("handshake message too short"));
        }

        match self.read_message(index, message) {
            Ok(()) => {
                debug!(
                    role = ?self.role,
                    message_index = index,
                    len = message.len(),
                    "consumed handshake message"
                );
                self.advance(index);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Derives the transport cipher pair. Consuming `self` drops the transcript, ephemeral keys,
    /// and chaining key.
    pub(crate) fn split(self) -> Result<(TransportCipherPair, Option<ExportedKeys>)> {
        if self.phase != HsPhase::Complete {
            return Err(match self.phase {
                HsPhase::Failed => Error::SessionFailed,
                _ => Error::InvalidInput("handshake not complete"),
            });
        }

        let exported = if self.pattern.uses_static_keys() {
            let local = self.local_static.as_ref().ok_or(Error::CryptoFailure)?;
            let remote = self.remote_static.ok_or(Error::CryptoFailure)?;
            Some(ExportedKeys {
                local_private_key: local.private_bytes(),
                local_public_key: local.public_key().to_bytes(),
                remote_public_key: remote.to_bytes(),
            })
        } else {
            None
        };

        let handshake_hash = self.symm_state.handshake_hash();
        let (c1, c2) = self.symm_state.split()?;
        let pair = match self.role {
            Role::Initiator => TransportCipherPair::new(c1, c2, handshake_hash),
            Role::Responder => TransportCipherPair::new(c2, c1, handshake_hash),
        };
        debug!(role = ?self.role, pattern = ?self.pattern, "handshake split");
        Ok((pair, exported))
    }

    fn advance(&mut self, index: usize) {
        let next = index + 1;
        self.phase = if next == self.pattern.message_count() {
            HsPhase::Complete
        } else {
            HsPhase::Handshaking(next)
        };
    }

    fn fail(&mut self, e: Error) -> Error {
        self.phase = HsPhase::Failed;
        e
    }

    fn write_message(&mut self, index: usize, out: &mut BytesMut) -> Result<()> {
        for token in self.pattern.messages()[index] {
            match token {
                Token::E => {
                    let e = self.local_ephemeral.public_key();
                    out.extend_from_slice(e.as_bytes());
                    self.symm_state.mix_hash(e.as_bytes());
                }
                Token::S => {
                    let s = self.local_static()?.public_key();
                    self.symm_state.encrypt_and_hash(s.as_bytes(), out)?;
                }
                dh => self.mix_dh(*dh)?,
            }
        }
        self.symm_state.encrypt_and_hash(&[], out)
    }

    fn read_message(&mut self, index: usize, message: &[u8]) -> Result<()> {
        let mut rest = message;
        for token in self.pattern.messages()[index] {
            match token {
                Token::E => {
                    let (re, tail) = take(rest, DH_LEN)?;
                    self.symm_state.mix_hash(re);
                    self.remote_ephemeral = Some(public_key(re)?);
                    rest = tail;
                }
                Token::S => {
                    let (rs, tail) = take(rest, DH_LEN + self.symm_state.overhead())?;
                    let mut plain = BytesMut::with_capacity(DH_LEN);
                    self.symm_state.decrypt_and_hash(rs, &mut plain)?;
                    self.remote_static = Some(public_key(&plain)?);
                    rest = tail;
                }
                dh => self.mix_dh(*dh)?,
            }
        }

        let mut payload = BytesMut::new();
        self.symm_state.decrypt_and_hash(rest, &mut payload)?;
        trace!(payload_len = payload.len(), "handshake payload authenticated");
        Ok(())
    }

    /// `es` is always the initiator's ephemeral with the responder's static, `se` the reverse,
    /// so which local key takes part depends on the role.
    fn mix_dh(&mut self, token: Token) -> Result<()> {
        let initiator = self.role == Role::Initiator;
        let shared = match token {
            Token::EE => self.local_ephemeral.dh(self.remote_ephemeral()?)?,
            Token::ES if initiator => self.local_ephemeral.dh(self.remote_static()?)?,
            Token::ES => self.local_static()?.dh(self.remote_ephemeral()?)?,
            Token::SE if initiator => self.local_static()?.dh(self.remote_ephemeral()?)?,
            Token::SE => self.local_ephemeral.dh(self.remote_static()?)?,
            Token::E | Token::S => return Err(Error::CryptoFailure),
        };
        self.symm_state.mix_key(shared.as_bytes())
    }

    fn local_static(&self) -> Result<&KeyPair> {
        self.local_static.as_ref().ok_or(Error::CryptoFailure)
    }

    fn remote_ephemeral(&self) -> Result<&PublicKey> {
        self.remote_ephemeral.as_ref().ok_or(Error::CryptoFailure)
    }

    fn remote_static(&self) -> Result<&PublicKey> {
        self.remote_static.as_ref().ok_or(Error::CryptoFailure)
    }

    #[cfg(test)]
    pub(crate) fn handshake_hash(&self) -> [u8; crate::symm_state::HASH_LEN] {
        self.symm_state.handshake_hash()
    }
}

/// Lengths are checked against the pattern minimum before reading starts.
fn take(buf: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if buf.len() < len {
        return Err(Error::CryptoFailure);
    }
    Ok(buf.split_at(len))
}

fn public_key(bytes: &[u8]) -> Result<PublicKey> {
    let raw: [u8; DH_LEN] = bytes.try_into().map_err(|_| Error::CryptoFailure)?;
    Ok(PublicKey::from(raw))
}
