// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A module with mpmc channels for distributing worker lifecycle
//! events.

use crate::threads::{WorkerId, WorkerKind};
use std::sync::mpsc::{channel, Receiver, Sender};

use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

// Publish the event to all subscribers
pub fn publish(event: Event) {
    get_events().lock().expect("Failed to acquire lock on events").publish(event);
}

// Subscribe to events over the receiver
pub fn subscribe() -> Receiver<Event> {
    get_events().lock().expect("Failed to acquire lock on events").subscribe()
}

/// Event messages shared across the daemon's components in a loosely
/// coupled manner. The RPC layer subscribes to mirror worker state to
/// interested clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    WorkerStarted {
        id: WorkerId,
        kind: WorkerKind,
    },
    WorkerStopped {
        id: WorkerId,
        kind: WorkerKind,
    },
}

lazy_static! {
    static ref EVENTS: Arc<Mutex<Events>> = Events::new();
}

fn get_events() -> Arc<Mutex<Events>> {
    Arc::clone(&EVENTS)
}

/// A multi-producer, multi-consumer broadcast queue based on
/// `std::sync::mpsc`.
///
/// Each Event message `published` is seen by all subscribers.
///
/// Warning: invoke `subscribe()` before `publish()` or else messages
/// will be lost.
///
pub struct Events {
    // For each subscriber this module retains the sender half and the
    // subscriber reads events from the receiver half.
    subscribers: Vec<Sender<Event>>,
}

impl Events {
    // Events is always owned by multiple publishers and subscribers
    // across threads so return an Arc type.
    fn new() -> Arc<Mutex<Events>> {
        Arc::new(Mutex::new(Self { subscribers: Vec::new() }))
    }

    // Creates a new asynchronous channel, returning the receiver
    // half. All `Event` messages sent through `publish` will become
    // available on the receiver in the same order as it was sent.
    fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = channel::<Event>();
        self.subscribers.push(tx);
        rx
    }

    // Attempts to send an Event on the events channel.
    fn publish(&mut self, msg: Event) {
        log::debug!("{msg:?}");
        // Any channel with a disconnected receiver will return an
        // error and be removed by retain.
        self.subscribers.retain(|subscriber| subscriber.send(msg.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // The queue is process-global and other tests publish through it
    // concurrently, so only events with the synthetic id are examined.
    #[test]
    fn test_subscribers_see_events_in_order() {
        let receiver = subscribe();
        publish(Event::WorkerStarted { id: 1, kind: WorkerKind::Capture });
        publish(Event::WorkerStopped { id: 1, kind: WorkerKind::Capture });
        let mut saw_start = false;
        while let Ok(event) = receiver.recv_timeout(Duration::from_secs(5)) {
            match event {
                Event::WorkerStarted { id: 1, .. } => saw_start = true,
                Event::WorkerStopped { id: 1, .. } => {
                    assert!(saw_start, "stop delivered before start");
                    return;
                }
                _ => {}
            }
        }
        panic!("published events were not delivered");
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let receiver = subscribe();
        drop(receiver);
        // Does not error; the disconnected channel is removed.
        publish(Event::WorkerStopped { id: 2, kind: WorkerKind::Replay });
    }
}
