use blake2::{Blake2s256, Digest};
use bytes::BytesMut;
use hmac::{Mac, SimpleHmac};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    cipher_state::{CipherKey, CipherState, MAC_LEN},
    error::{Error, Result},
};

pub const HASH_LEN: usize = 32;

type HmacBlake2s = SimpleHmac<Blake2s256>;

#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct SymmState {
    cipher_state: Option<CipherState>,
    chaining_key: [u8; HASH_LEN],
    output_hash: [u8; HASH_LEN],
}

impl SymmState {
    pub(crate) fn init(proto_name: &[u8]) -> Self {
        let init_state = if proto_name.len() > HASH_LEN {
            Blake2s256::digest(proto_name).into()
        } else {
            let mut init_state = [0; HASH_LEN];
            init_state[0..proto_name.len()].copy_from_slice(proto_name);
            init_state
        };

        Self {
            cipher_state: None,
            chaining_key: init_state,
            output_hash: init_state,
        }
    }

    pub(crate) fn has_key(&self) -> bool {
        self.cipher_state.is_some()
    }

    pub(crate) fn handshake_hash(&self) -> [u8; HASH_LEN] {
        self.output_hash
    }

    pub(crate) fn mix_key(&mut self, input: &[u8]) -> Result<()> {
        let (new_ck, mut temp_k) = hkdf2(&self.chaining_key, input)?;
        self.chaining_key = new_ck;
        self.cipher_state = Some(CipherState::init(CipherKey::new(temp_k)));
        temp_k.zeroize();
        Ok(())
    }

    pub(crate) fn mix_hash(&mut self, data: &[u8]) {
        self.output_hash = Blake2s256::new()
            .chain_update(self.output_hash)
            .chain_update(data)
            .finalize()
            .into();
    }

    /// Before the first `mix_key` this is a plain copy, as Noise prescribes.
    pub(crate) fn encrypt_and_hash(&mut self, text: &[u8], out: &mut BytesMut) -> Result<()> {
        let start = out.len();
        match self.cipher_state.as_mut() {
            Some(state) => state.encrypt_with_ad(&self.output_hash, text, out)?,
            None => out.extend_from_slice(text),
        }
        self.mix_hash(&out[start..]);
        Ok(())
    }

    pub(crate) fn decrypt_and_hash(&mut self, text: &[u8], out: &mut BytesMut) -> Result<()> {
        match self.cipher_state.as_mut() {
            Some(state) => state.decrypt_with_ad(&self.output_hash, text, out)?,
            None => out.extend_from_slice(text),
        }
        self.mix_hash(text);
        Ok(())
    }

    /// Length `encrypt_and_hash` adds on top of the plain-text in the current state.
    pub(crate) fn overhead(&self) -> usize {
        if self.has_key() {
            MAC_LEN
        } else {
            0
        }
    }

    /// The two transport keys, initiator-to-responder first.
    pub(crate) fn split(self) -> Result<(CipherState, CipherState)> {
        let (mut k1, mut k2) = hkdf2(&self.chaining_key, &[])?;
        let c1 = CipherState::init(CipherKey::new(k1));
        let c2 = CipherState::init(CipherKey::new(k2));
        k1.zeroize();
        k2.zeroize();
        Ok((c1, c2))
    }
}

fn hmac(key: &[u8], parts: &[&[u8]]) -> Result<[u8; HASH_LEN]> {
    let mut mac = HmacBlake2s::new_from_slice(key).map_err(|_| Error::CryptoFailure)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Noise `HKDF(chaining_key, input, 2)`.
fn hkdf2(chained: &[u8; HASH_LEN], input: &[u8]) -> Result<([u8; HASH_LEN], [u8; HASH_LEN])> {
    let mut tmp = hmac(chained, &[input])?;
    let out1 = hmac(&tmp, &[&[1]])?;
    let out2 = hmac(&tmp, &[&out1, &[2]])?;
    tmp.zeroize();
    Ok((out1, out2))
}
