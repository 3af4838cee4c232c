// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use flume::TrySendError;

/// Manages a generic, thread-safe event channel.
///
/// This EventBus is generic over the type `T` of event it transports. This ensures
/// that `khora-core` remains decoupled from specific event types defined in higher-level crates.
///
/// Publishing never blocks: a bounded bus whose consumer fell behind drops the
/// newest events instead of stalling the publisher.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone + Send + Sync + 'static> {
    sender: flume::Sender<T>,
    receiver: flume::Receiver<T>,
}

impl<T: Clone + Send + Sync + 'static> EventBus<T> {
    /// Creates a new EventBus with an unbounded channel for a specific event type.
    ///
    /// ## Returns
    /// A new instance of the EventBus struct.
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        log::debug!("Unbounded EventBus initialized.");
        Self { sender, receiver }
    }

    /// Creates a new EventBus that holds at most `capacity` undelivered events.
    ///
    /// ## Arguments
    /// * `capacity` - The number of events buffered before new ones are dropped.
    pub fn bounded(capacity: usize) -> Self {
        let (sender, receiver) = flume::bounded(capacity);
        log::debug!("EventBus initialized with capacity {capacity}.");
        Self { sender, receiver }
    }

    /// Publishes an event without blocking.
    ///
    /// ## Arguments
    /// * `event` - The event to be sent over the channel.
    ///
    /// ## Returns
    /// `true` if the event was queued, `false` if it was dropped because the
    /// bus is full.
    pub fn publish(&self, event: T) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("EventBus full, dropping event.");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Failed to send event: receiver disconnected.");
                false
            }
        }
    }

    /// Returns a clone of the sender end of the channel.
    /// Use this to allow other parts of the system to send events.
    pub fn sender(&self) -> flume::Sender<T> {
        self.sender.clone()
    }

    /// Returns a reference to the receiver end of the channel.
    /// Intended for the owner of the bus to process events.
    pub fn receiver(&self) -> &flume::Receiver<T> {
        &self.receiver
    }

    /// Drains every event currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
