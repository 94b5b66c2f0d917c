#![allow(dead_code)]

use std::collections::VecDeque;

use bytes::Bytes;
use noise_stream::{Completion, Error, Pattern, Role, Session, SessionConfig, Step};
use rand::{rngs::StdRng, SeedableRng};

pub const TEST_PRIVATE_KEY: [u8; 32] =
    hex_literal::hex!("90000e3a66c18b14888be31ab38573551466193e4805540e65f3916356185866");
pub const TEST_PUBLIC_KEY: [u8; 32] =
    hex_literal::hex!("36d359107204cd30cd83291ed295959866c48a6e3e5af9fe720b00af9b624c78");

pub struct Run {
    pub initiator: Session,
    pub responder: Session,
    pub initiator_done: Option<Completion>,
    pub responder_done: Option<Completion>,
    /// Every handshake message, in the order it went on the wire.
    pub transcript: Vec<Bytes>,
}

/// Which side an error came from.
#[derive(Debug, PartialEq, Eq)]
pub enum Side {
    Initiator(Error),
    Responder(Error),
}

pub fn configs(pattern: Pattern) -> (SessionConfig, SessionConfig) {
    (
        SessionConfig::new(Role::Initiator, pattern),
        SessionConfig::new(Role::Responder, pattern),
    )
}

/// Runs the handshake with each side's randomness seeded separately.
pub fn run_seeded(
    initiator: &SessionConfig,
    responder: &SessionConfig,
    seeds: (u64, u64),
) -> Result<Run, Side> {
    let initiator = Session::create_with_rng(initiator, &mut StdRng::seed_from_u64(seeds.0))
        .map_err(Side::Initiator)?;
    let responder = Session::create_with_rng(responder, &mut StdRng::seed_from_u64(seeds.1))
        .map_err(Side::Responder)?;
    pump(initiator, responder)
}

pub fn run(initiator: &SessionConfig, responder: &SessionConfig) -> Result<Run, Side> {
    let initiator = Session::create(initiator).map_err(Side::Initiator)?;
    let responder = Session::create(responder).map_err(Side::Responder)?;
    pump(initiator, responder)
}

pub fn pump(mut initiator: Session, mut responder: Session) -> Result<Run, Side> {
    let mut to_responder = VecDeque::new();
    let mut to_initiator = VecDeque::new();
    let mut transcript = Vec::new();
    let mut initiator_done = None;
    let mut responder_done = None;

    let step = initiator.drive().map_err(Side::Initiator)?;
    record(step, &mut to_responder, &mut transcript, &mut initiator_done);
    let step = responder.drive().map_err(Side::Responder)?;
    record(step, &mut to_initiator, &mut transcript, &mut responder_done);

    while !(to_responder.is_empty() && to_initiator.is_empty()) {
        if let Some(message) = to_responder.pop_front() {
            let step = responder
                .supply_handshake_message(&message)
                .map_err(Side::Responder)?;
            record(step, &mut to_initiator, &mut transcript, &mut responder_done);
        }
        if let Some(message) = to_initiator.pop_front() {
            let step = initiator
                .supply_handshake_message(&message)
                .map_err(Side::Initiator)?;
            record(step, &mut to_responder, &mut transcript, &mut initiator_done);
        }
    }

    Ok(Run {
        initiator,
        responder,
        initiator_done,
        responder_done,
        transcript,
    })
}

fn record(
    step: Step,
    queue: &mut VecDeque<Bytes>,
    transcript: &mut Vec<Bytes>,
    done: &mut Option<Completion>,
) {
    match step {
        Step::AwaitMessage { outbound } => {
            transcript.extend(outbound.iter().cloned());
            queue.extend(outbound);
        }
        Step::Completed {
            outbound,
            completion,
        } => {
            transcript.extend(outbound.iter().cloned());
            queue.extend(outbound);
            *done = Some(completion);
        }
    }
}

/// A pair of sessions that finished an anonymous handshake.
pub fn transport_pair() -> (Session, Session) {
    let (i, r) = configs(Pattern::NN);
    let run = run(&i, &r).unwrap();
    (run.initiator, run.responder)
}
