//! Handshake patterns, described as data and interpreted by [`crate::hs_state`].
//!
//! Fundamental patterns key:
//! # First character
//! N: **N**o static key for initiator
//! X: Static key for initiator **X**mitted to responder
//!
//! # Second character
//! N: **N**o static key for responder
//! X: Static key for responder **X**mitted to initiator
use serde::{Deserialize, Serialize};

use crate::{cipher_state::MAC_LEN, dh::DH_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pattern {
    /// Mutually authenticated:
    /// ```text
    /// -> e
    /// <- e, ee, s, es
    /// -> s, se
    /// ```
    #[default]
    XX,
    /// Anonymous, ephemeral agreement only:
    /// ```text
    /// -> e
    /// <- e, ee
    /// ```
    NN,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    E,
    S,
    EE,
    ES,
    SE,
}

impl Token {
    fn is_dh(self) -> bool {
        matches!(self, Token::EE | Token::ES | Token::SE)
    }
}

const XX: &[&[Token]] = &[
    &[Token::E],
    &[Token::E, Token::EE, Token::S, Token::ES],
    &[Token::S, Token::SE],
];

const NN: &[&[Token]] = &[&[Token::E], &[Token::E, Token::EE]];

impl Pattern {
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Pattern::XX => "Noise_XX_25519_ChaChaPoly_BLAKE2s",
            Pattern::NN => "Noise_NN_25519_ChaChaPoly_BLAKE2s",
        }
    }

    pub(crate) fn messages(&self) -> &'static [&'static [Token]] {
        match self {
            Pattern::XX => XX,
            Pattern::NN => NN,
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages().len()
    }

    /// Whether static keys are exchanged, and therefore required and exported.
    pub fn uses_static_keys(&self) -> bool {
        self.messages()
            .iter()
            .flat_map(|m| m.iter())
            .any(|t| *t == Token::S)
    }

    /// Messages alternate, initiator first.
    pub fn sender(&self, index: usize) -> Role {
        if index % 2 == 0 {
            Role::Initiator
        } else {
            Role::Responder
        }
    }

    /// Smallest well-formed message at `index`, given whether a cipher key is already in place
    /// when the message starts. The payload is counted as empty.
    pub(crate) fn min_message_len(&self, index: usize, mut keyed: bool) -> usize {
        let mut len = 0;
        for token in self.messages()[index] {
            match token {
                Token::E => len += DH_LEN,
                Token::S => len += DH_LEN + if keyed { MAC_LEN } else { 0 },
                t if t.is_dh() => keyed = true,
                _ => {}
            }
        }
        if keyed {
            len += MAC_LEN;
        }
        len
    }
}
