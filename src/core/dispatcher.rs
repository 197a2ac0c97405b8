/// Dispatcher — the one-fragment-in-flight hand-off between the generation
/// producer and the display consumer.
///
/// Fragments travel over a rendezvous channel (capacity zero), so a send
/// completes only once the consumer has taken the fragment. Each delivery
/// carries a one-shot [`Ack`]; `dispatch` then blocks until that ack fires.
/// `Ack::acknowledge` consumes the ack, so acknowledging twice does not
/// compile, and an ack dropped unacknowledged surfaces as
/// [`DispatchError::Unacknowledged`] instead of a hang.
use std::sync::mpsc::{self, Receiver, SyncSender};
use thiserror::Error;
use tracing::{trace, warn};

use crate::schema::fragment::Fragment;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("display consumer has shut down")]
    ConsumerGone,
    #[error("fragment {0} was dropped without acknowledgment")]
    Unacknowledged(u64),
    #[error("fragment {got} dispatched out of order (expected {expected})")]
    OutOfOrder { expected: u64, got: u64 },
}

/// Create a connected dispatcher and receiver. Sequence numbers start at 1.
pub fn channel() -> (Dispatcher, FragmentReceiver) {
    let (tx, rx) = mpsc::sync_channel(0);
    (
        Dispatcher { tx, next_seq: 1 },
        FragmentReceiver { rx },
    )
}

/// Producer half. `dispatch` takes `&mut self`, so one dispatcher cannot
/// have two fragments in flight.
#[derive(Debug)]
pub struct Dispatcher {
    tx: SyncSender<Delivery>,
    next_seq: u64,
}

impl Dispatcher {
    /// Hand `fragment` to the consumer and block until it is acknowledged.
    pub fn dispatch(&mut self, fragment: Fragment) -> Result<(), DispatchError> {
        if fragment.seq != self.next_seq {
            return Err(DispatchError::OutOfOrder {
                expected: self.next_seq,
                got: fragment.seq,
            });
        }

        let seq = fragment.seq;
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        let delivery = Delivery {
            fragment,
            ack: Ack {
                tx: Some(ack_tx),
                seq,
            },
        };

        self.tx
            .send(delivery)
            .map_err(|_| DispatchError::ConsumerGone)?;
        trace!(seq, "fragment handed to consumer");

        match ack_rx.recv() {
            Ok(acked) if acked == seq => {
                self.next_seq += 1;
                Ok(())
            }
            _ => Err(DispatchError::Unacknowledged(seq)),
        }
    }

    /// Sequence number the next dispatched fragment must carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

/// A fragment plus the obligation to acknowledge it.
#[derive(Debug)]
pub struct Delivery {
    fragment: Fragment,
    ack: Ack,
}

impl Delivery {
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn into_parts(self) -> (Fragment, Ack) {
        (self.fragment, self.ack)
    }
}

/// One-shot completion signal for a single fragment.
#[derive(Debug)]
pub struct Ack {
    tx: Option<SyncSender<u64>>,
    seq: u64,
}

impl Ack {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Release the producer. Consumes the ack.
    pub fn acknowledge(mut self) {
        if let Some(tx) = self.tx.take() {
            // The producer may have given up already; nothing to release then.
            let _ = tx.send(self.seq);
        }
    }
}

impl Drop for Ack {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(seq = self.seq, "fragment dropped without acknowledgment");
        }
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct FragmentReceiver {
    rx: Receiver<Delivery>,
}

impl FragmentReceiver {
    /// Block for the next delivery; `None` once the dispatcher is gone.
    pub fn recv(&self) -> Option<Delivery> {
        self.rx.recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Delivery> + '_ {
        self.rx.iter()
    }
}
