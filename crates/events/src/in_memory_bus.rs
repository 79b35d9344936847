//! Channel-backed bus for a single process.

use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError, mpsc};

use crate::bus::{EventBus, Subscription};

/// Fans every published message out to one `mpsc` channel per subscription.
///
/// Publishing never blocks on consumers and never fails: subscriptions whose
/// receiver has been dropped are pruned on the next publish, and a poisoned
/// lock still holds a usable sender list.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.senders().len()
    }

    fn senders(&self) -> MutexGuard<'_, Vec<mpsc::Sender<M>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders();
        if let Some((last, rest)) = senders.split_last() {
            let mut alive: Vec<bool> = rest.iter().map(|tx| tx.send(message.clone()).is_ok()).collect();
            alive.push(last.send(message).is_ok());
            let mut keep = alive.into_iter();
            senders.retain(|_| keep.next().unwrap_or(false));
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.senders().push(tx);
        Subscription::new(rx)
    }
}
