use crate::mods::ModKey;
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationEvent {
    ModActivationChanged { key: ModKey, active: bool },
}

// post-commit fan-out; never invoked mid-transaction
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Vec<Sender<ActivationEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<ActivationEvent> {
        let (tx, rx) = channel();
        self.senders.push(tx);
        rx
    }

    pub fn emit(&self, event: ActivationEvent) {
        debug!(?event, "activation event");
        for sender in &self.senders {
            let _ = sender.send(event.clone());
        }
    }
}
