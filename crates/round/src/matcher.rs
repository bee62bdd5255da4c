//! Ring pairing of participants for the payment-code exchange.

use coinjoin_types::{PaymentCode, Username};
use rand::seq::SliceRandom;
use rand::Rng;

/// Peers assigned to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAssignment {
    pub username: Username,
    /// Next participant in the ring, used to derive the send address.
    pub from_peer: PaymentCode,
    /// Previous participant in the ring, used to derive the receive address.
    pub to_peer: PaymentCode,
}

/// Arranges participants into a directed ring.
///
/// Each participant exchanges addresses with its two neighbours, so every
/// send claim is matched by exactly one receive claim of another peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerMatcher {
    deterministic: bool,
}

impl PeerMatcher {
    pub fn new(deterministic: bool) -> Self {
        Self { deterministic }
    }

    /// Assign peers. The ring is shuffled with `rng` unless deterministic
    /// ordering (by payment code) is enabled.
    pub fn pair<R: Rng + ?Sized>(
        &self,
        mut participants: Vec<(Username, PaymentCode)>,
        rng: &mut R,
    ) -> Vec<PeerAssignment> {
        if self.deterministic {
            participants.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        } else {
            participants.shuffle(rng);
        }

        let n = participants.len();
        participants
            .iter()
            .enumerate()
            .map(|(i, (username, _))| PeerAssignment {
                username: username.clone(),
                from_peer: participants[(i + 1) % n].1.clone(),
                to_peer: participants[(i + n - 1) % n].1.clone(),
            })
            .collect()
    }
}
