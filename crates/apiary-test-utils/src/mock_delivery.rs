// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A recording [`Deliverer`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use apiary_core::{BotId, Deliverer, DeliveryOutcome, Reply};
use async_trait::async_trait;

/// Records every delivery and answers with a scripted outcome
/// (default: sent).
#[derive(Default)]
pub struct MockDeliverer {
    sent: Mutex<Vec<(i64, Reply)>>,
    outcomes: Mutex<HashMap<i64, DeliveryOutcome>>,
}

impl MockDeliverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a fixed outcome for one chat id.
    pub fn script(&self, chat_id: i64, outcome: DeliveryOutcome) {
        self.outcomes.lock().unwrap().insert(chat_id, outcome);
    }

    /// Everything delivered so far, in order.
    pub fn deliveries(&self) -> Vec<(i64, Reply)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for MockDeliverer {
    async fn deliver(&self, _bot_id: BotId, chat_id: i64, reply: &Reply) -> DeliveryOutcome {
        self.sent.lock().unwrap().push((chat_id, reply.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or(DeliveryOutcome::Sent)
    }
}
