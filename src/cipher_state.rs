//! ChaCha20-Poly1305 cipher state: one key and its nonce counter.
use bytes::BytesMut;
use chacha20poly1305::{
    aead::generic_array::GenericArray, AeadInPlace, ChaCha20Poly1305, KeyInit, Tag,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    error::{Error, Result},
    nonce::{chacha_bytes, Nonce},
};

pub const KEY_LEN: usize = 32;
pub const MAC_LEN: usize = 16;

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    pub(crate) fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(GenericArray::from_slice(&self.0))
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct CipherState {
    key: CipherKey,
    nonce: Nonce,
}

impl CipherState {
    pub(crate) fn init(key: CipherKey) -> Self {
        Self {
            key,
            nonce: Nonce::new(),
        }
    }

    pub(crate) fn nonce(&self) -> u64 {
        self.nonce.value()
    }

    /// Appends `plain_text || tag` to `out`. The nonce only advances on success.
    pub(crate) fn encrypt_with_ad(
        &mut self,
        assosciated_data: &[u8],
        plain_text: &[u8],
        out: &mut BytesMut,
    ) -> Result<()> {
        let (nonce_arr, next) = self.nonce.chacha_harvest()?;
        let start = out.len();
        out.reserve(plain_text.len() + MAC_LEN);
        out.extend_from_slice(plain_text);

        let tag = match self.key.aead().encrypt_in_place_detached(
            &nonce_arr.into(),
            assosciated_data,
            &mut out[start..],
        ) {
            Ok(tag) => tag,
            Err(_) => {
                out[start..].zeroize();
                out.truncate(start);
                return Err(Error::CryptoFailure);
            }
        };
        out.extend_from_slice(&tag);
        self.nonce = next;
        Ok(())
    }

    /// Appends the plain-text of `cipher_text` to `out`. On failure `out` is left as it was and
    /// the expected nonce does not move.
    pub(crate) fn decrypt_with_ad(
        &mut self,
        assosciated_data: &[u8],
        cipher_text: &[u8],
        out: &mut BytesMut,
    ) -> Result<()> {
        if cipher_text.len() < MAC_LEN {
            return Err(Error::InvalidInput("ciphertext shorter than mac length"));
        }
        let (nonce_arr, next) = self.nonce.chacha_harvest()?;
        let (text, tag) = cipher_text.split_at(cipher_text.len() - MAC_LEN);
        let start = out.len();
        out.extend_from_slice(text);

        let decrypt = self.key.aead().decrypt_in_place_detached(
            &nonce_arr.into(),
            assosciated_data,
            &mut out[start..],
            Tag::from_slice(tag),
        );
        if decrypt.is_err() {
            out[start..].zeroize();
            out.truncate(start);
            return Err(Error::AuthenticationFailure);
        }
        self.nonce = next;
        Ok(())
    }

    /// `REKEY(k)`: the first 32 bytes of encrypting 32 zeros under the reserved max nonce.
    /// The nonce counter is left alone.
    pub(crate) fn rekey(&mut self) -> Result<()> {
        let mut buf = [0u8; KEY_LEN];
        self.key
            .aead()
            .encrypt_in_place_detached(&chacha_bytes(u64::MAX).into(), &[], &mut buf)
            .map_err(|_| Error::CryptoFailure)?;
        self.key = CipherKey::new(buf);
        buf.zeroize();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_nonce(&mut self, nonce: Nonce) {
        self.nonce = nonce;
    }
}
