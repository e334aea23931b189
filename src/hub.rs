//! Fans samples out to subscribers.

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::{
    registry::{SubscriberRegistry, WireMessage},
    sample::Sample,
};

/// Create the channel samples are handed over on, from the serial reader thread
/// to the [`BroadcastHub`].
///
/// Sending never blocks, and works from outside the async runtime.
pub fn handoff() -> (mpsc::UnboundedSender<Sample>, mpsc::UnboundedReceiver<Sample>) {
    mpsc::unbounded_channel()
}

/// Broadcasts samples to every registered subscriber.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    registry: SubscriberRegistry,
}

impl BroadcastHub {
    /// Broadcast to the subscribers of the given registry.
    pub fn new(registry: SubscriberRegistry) -> Self {
        Self { registry }
    }

    /// Deliver a sample to all subscribers.
    ///
    /// Subscribers which can't be delivered to are unregistered.
    /// Returns how many subscribers got the sample.
    pub fn publish(&self, sample: &Sample) -> usize {
        let message: WireMessage = match sample.to_wire() {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(%e, %sample, "Could not serialize sample");
                return 0;
            }
        };

        let mut delivered = 0;

        for subscriber in self.registry.snapshot_for_broadcast() {
            match subscriber.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(%e, "Pruning subscriber");
                    self.registry.unregister(subscriber.id());
                }
            }
        }

        trace!(%sample, %delivered, "Broadcasted");

        delivered
    }

    /// Publish every sample arriving on the handoff, in order.
    ///
    /// Returns when every sender is gone.
    pub async fn run(self, mut samples: mpsc::UnboundedReceiver<Sample>) {
        while let Some(sample) = samples.recv().await {
            self.publish(&sample);
        }

        debug!("Handoff closed, hub stopping");
    }
}
