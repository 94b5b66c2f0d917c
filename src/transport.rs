use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::{
    cipher_state::{CipherState, MAC_LEN},
    error::{Error, Result},
    hs_state::MAX_MESSAGE_LEN,
    symm_state::HASH_LEN,
};

/// Largest plain-text that fits one [`MAX_MESSAGE_LEN`] transport message.
pub const MAX_CHUNK_LEN: usize = MAX_MESSAGE_LEN - MAC_LEN;

/// The two one-directional cipher states a finished handshake leaves behind. This party's `send`
/// is the peer's `recv` and vice versa. Associated data is always empty.
///
/// A fatal error in either direction poisons the pair: every later call returns
/// [`Error::SessionFailed`].
pub struct TransportCipherPair {
    send: CipherState,
    recv: CipherState,
    handshake_hash: [u8; HASH_LEN],
    failed: bool,
}

impl TransportCipherPair {
    pub(crate) fn new(
        send: CipherState,
        recv: CipherState,
        handshake_hash: [u8; HASH_LEN],
    ) -> Self {
        Self {
            send,
            recv,
            handshake_hash,
            failed: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn mac_len(&self) -> usize {
        MAC_LEN
    }

    /// Final handshake hash. Both peers hold the same value, usable for channel binding.
    pub fn handshake_hash(&self) -> &[u8; HASH_LEN] {
        &self.handshake_hash
    }

    /// Messages sent so far in this direction.
    pub fn send_nonce(&self) -> u64 {
        self.send.nonce()
    }

    pub fn recv_nonce(&self) -> u64 {
        self.recv.nonce()
    }

    pub fn encrypt(&mut self, plain_text: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(plain_text.len() + MAC_LEN);
        self.encrypt_into(plain_text, &mut out)?;
        Ok(out.freeze())
    }

    /// Appends one transport message to `out`.
    pub fn encrypt_into(&mut self, plain_text: &[u8], out: &mut BytesMut) -> Result<()> {
        self.check()?;
        self.send
            .encrypt_with_ad(&[], plain_text, out)
            .map_err(|e| self.poison(e))
    }

    pub fn decrypt(&mut self, cipher_text: &[u8]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(cipher_text.len().saturating_sub(MAC_LEN));
        self.decrypt_into(cipher_text, &mut out)?;
        Ok(out.freeze())
    }

    /// Messages must arrive in order and exactly once.
    pub fn decrypt_into(&mut self, cipher_text: &[u8], out: &mut BytesMut) -> Result<()> {
        self.check()?;
        self.recv
            .decrypt_with_ad(&[], cipher_text, out)
            .map_err(|e| self.poison(e))
    }

    /// Encrypts `plain_text` as a run of messages of at most [`MAX_MESSAGE_LEN`] bytes each.
    /// Empty input still produces one (empty) message.
    pub fn seal_chunked(&mut self, plain_text: &[u8]) -> Result<Vec<Bytes>> {
        if plain_text.is_empty() {
            return Ok(vec![self.encrypt(&[])?]);
        }
        let chunks = plain_text
            .chunks(MAX_CHUNK_LEN)
            .map(|chunk| self.encrypt(chunk))
            .collect::<Result<Vec<_>>>()?;
        trace!(len = plain_text.len(), chunks = chunks.len(), "sealed");
        Ok(chunks)
    }

    /// Inverse of [`Self::seal_chunked`] over the concatenated messages. Input that cannot be
    /// split into whole messages is rejected before any of it is opened.
    pub fn open_chunked(&mut self, cipher_text: &[u8]) -> Result<Bytes> {
        self.check()?;
        let tail = cipher_text.len() % MAX_MESSAGE_LEN;
        if cipher_text.is_empty() || (tail != 0 && tail < MAC_LEN) {
            return Err(Error::InvalidInput("ciphertext shorter than mac length"));
        }
        let mut out = BytesMut::with_capacity(cipher_text.len());
        for chunk in cipher_text.chunks(MAX_MESSAGE_LEN) {
            self.decrypt_into(chunk, &mut out)?;
        }
        Ok(out.freeze())
    }

    pub fn rekey_send(&mut self) -> Result<()> {
        self.check()?;
        self.send.rekey().map_err(|e| self.poison(e))
    }

    pub fn rekey_recv(&mut self) -> Result<()> {
        self.check()?;
        self.recv.rekey().map_err(|e| self.poison(e))
    }

    fn check(&self) -> Result<()> {
        if self.failed {
            return Err(Error::SessionFailed);
        }
        Ok(())
    }

    fn poison(&mut self, e: Error) -> Error {
        if e.is_fatal() && !self.failed {
            warn!(error = %e, "transport cipher pair failed");
            self.failed = true;
        }
        e
    }

    #[cfg(test)]
    pub(crate) fn force_send_nonce(&mut self, nonce: crate::nonce::Nonce) {
        self.send.force_nonce(nonce);
    }
}

impl core::fmt::Debug for TransportCipherPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransportCipherPair")
            .field("send_nonce", &self.send_nonce())
            .field("recv_nonce", &self.recv_nonce())
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{cipher_state::CipherKey, nonce::Nonce};

    fn pairs() -> (TransportCipherPair, TransportCipherPair) {
        let a = || CipherState::init(CipherKey::new([1; 32]));
        let b = || CipherState::init(CipherKey::new([2; 32]));
        (
            TransportCipherPair::new(a(), b(), [0; HASH_LEN]),
            TransportCipherPair::new(b(), a(), [0; HASH_LEN]),
        )
    }

    #[test]
    fn both_directions() {
        let (mut alice, mut bob) = pairs();
        let ping = alice.encrypt(b"ping").unwrap();
        assert_eq!(&bob.decrypt(&ping).unwrap()[..], b"ping");
        let pong = bob.encrypt(b"pong").unwrap();
        assert_eq!(&alice.decrypt(&pong).unwrap()[..], b"pong");
        assert_eq!(alice.send_nonce(), 1);
        assert_eq!(alice.recv_nonce(), 1);
    }

    #[test]
    fn directions_are_independent() {
        let (mut alice, _) = pairs();
        let own = alice.encrypt(b"loopback").unwrap();
        assert_eq!(alice.decrypt(&own), Err(Error::AuthenticationFailure));
    }

    #[test]
    fn exhaustion_boundary() {
        let (mut alice, mut bob) = pairs();
        alice.force_send_nonce(Nonce::at(u64::MAX - 1));
        let last = alice.encrypt(b"last").unwrap();
        assert_eq!(alice.send_nonce(), u64::MAX);
        assert_eq!(alice.encrypt(b"one more"), Err(Error::NonceExhausted));
        assert_eq!(alice.send_nonce(), u64::MAX);
        assert!(alice.is_failed());
        assert_eq!(alice.decrypt(&[0; MAC_LEN]), Err(Error::SessionFailed));
        // bob was never pushed that far, so the message is out of sequence for him
        assert_eq!(bob.decrypt(&last), Err(Error::AuthenticationFailure));
    }

    #[test]
    fn auth_failure_poisons_both_directions() {
        let (mut alice, mut bob) = pairs();
        let good = alice.encrypt(b"x").unwrap();
        let mut bad = good.to_vec();
        bad[0] ^= 1;

        assert_eq!(bob.decrypt(&bad), Err(Error::AuthenticationFailure));
        assert!(bob.is_failed());
        assert_eq!(bob.decrypt(&good), Err(Error::SessionFailed));
        assert_eq!(bob.encrypt(b"reply"), Err(Error::SessionFailed));
        assert_eq!(bob.rekey_recv(), Err(Error::SessionFailed));
        assert_eq!(bob.recv_nonce(), 0);
    }

    #[test]
    fn short_input_does_not_poison() {
        let (mut alice, mut bob) = pairs();
        assert!(matches!(
            bob.decrypt(&[0; MAC_LEN - 1]),
            Err(Error::InvalidInput(_))
        ));
        assert!(!bob.is_failed());
        let ct = alice.encrypt(b"fine").unwrap();
        assert_eq!(&bob.decrypt(&ct).unwrap()[..], b"fine");
    }

    #[test]
    fn chunked_big_data() {
        let (mut alice, mut bob) = pairs();
        let message: Vec<u8> = b"test-data"
            .iter()
            .copied()
            .cycle()
            .take(3 * MAX_CHUNK_LEN + 7)
            .collect();
        let sealed = alice.seal_chunked(&message).unwrap();
        assert_eq!(sealed.len(), 4);
        assert!(sealed.iter().all(|c| c.len() <= MAX_MESSAGE_LEN));
        assert_eq!(sealed[0].len(), MAX_MESSAGE_LEN);

        let wire: Vec<u8> = sealed.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(&bob.open_chunked(&wire).unwrap()[..], &message[..]);
    }

    #[test]
    fn chunked_short_tail_is_rejected_up_front() {
        let (mut alice, mut bob) = pairs();
        let sealed = alice.seal_chunked(&vec![7; MAX_CHUNK_LEN]).unwrap();
        assert_eq!(sealed.len(), 1);
        let mut wire = sealed[0].to_vec();
        wire.extend_from_slice(&[0; 5]);
        assert_eq!(wire.len(), MAX_MESSAGE_LEN + 5);

        assert!(matches!(
            bob.open_chunked(&wire),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(bob.recv_nonce(), 0);
        assert!(!bob.is_failed());
        // the whole first message is still there to be opened
        assert_eq!(bob.open_chunked(&sealed[0]).unwrap().len(), MAX_CHUNK_LEN);
    }

    #[test]
    fn chunked_empty() {
        let (mut alice, mut bob) = pairs();
        let sealed = alice.seal_chunked(&[]).unwrap();
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].len(), MAC_LEN);
        assert!(bob.open_chunked(&sealed[0]).unwrap().is_empty());
    }

    #[test]
    fn rekey_both_sides() {
        let (mut alice, mut bob) = pairs();
        alice.rekey_send().unwrap();
        bob.rekey_recv().unwrap();
        let ct = alice.encrypt(b"fresh").unwrap();
        assert_eq!(&bob.decrypt(&ct).unwrap()[..], b"fresh");
    }
}
