// src/notification/mod.rs
use crate::domain::errors::NotificationResult;
use crate::domain::models::{ImbalanceSignal, SignalType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Signal delivery interface
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Deliver a signal immediately
    async fn send_alert(&self, signal: &ImbalanceSignal) -> NotificationResult<()>;

    /// Hold a signal until enough similar ones corroborate it
    async fn queue_for_validation(&self, signal: ImbalanceSignal) -> NotificationResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Queued signals needed before a batch is validated
    pub validation_batch_size: usize,
    /// Occurrences of one signal type needed for it to survive validation
    pub min_group_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            validation_batch_size: 10,
            min_group_size: 2,
        }
    }
}

/// Groups a batch by signal type and keeps the highest-confidence signal of
/// every group with at least `min_group_size` members, with the group size.
pub fn validate_batch(
    batch: Vec<ImbalanceSignal>,
    min_group_size: usize,
) -> Vec<(ImbalanceSignal, usize)> {
    let mut groups: BTreeMap<SignalType, Vec<ImbalanceSignal>> = BTreeMap::new();
    for signal in batch {
        groups.entry(signal.signal_type).or_default().push(signal);
    }

    groups
        .into_values()
        .filter(|group| group.len() >= min_group_size)
        .filter_map(|group| {
            let occurrences = group.len();
            group
                .into_iter()
                .max_by(|a, b| a.confidence_level.total_cmp(&b.confidence_level))
                .map(|best| (best, occurrences))
        })
        .collect()
}

/// `Name=value` pairs of a signal's metrics, in key order
pub fn format_metrics(signal: &ImbalanceSignal) -> String {
    signal
        .metrics
        .iter()
        .map(|(name, value)| format!("{}={:.4}", name, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Notifier that reports through the log facade
pub struct LogNotifier {
    config: NotificationConfig,
    queue: Mutex<Vec<ImbalanceSignal>>,
}

impl LogNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            queue: Mutex::new(Vec::with_capacity(config.validation_batch_size)),
            config,
        }
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Drain the queue once it holds a full batch and validate it
    async fn process_queue(&self) -> Vec<(ImbalanceSignal, usize)> {
        let batch = {
            let mut queue = self.queue.lock().await;
            if queue.len() < self.config.validation_batch_size {
                return Vec::new();
            }
            std::mem::take(&mut *queue)
        };

        let batch_len = batch.len();
        let validated = validate_batch(batch, self.config.min_group_size);
        log::debug!("Validated {} of {} queued signals", validated.len(), batch_len);
        validated
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}

#[async_trait]
impl NotificationService for LogNotifier {
    async fn send_alert(&self, signal: &ImbalanceSignal) -> NotificationResult<()> {
        log::warn!(
            "ALERT [{}] {} (confidence {:.2}) {} | {}",
            signal.strength,
            signal.signal_type,
            signal.confidence_level,
            signal.description,
            format_metrics(signal)
        );
        Ok(())
    }

    async fn queue_for_validation(&self, signal: ImbalanceSignal) -> NotificationResult<()> {
        self.queue.lock().await.push(signal);

        for (confirmed, occurrences) in self.process_queue().await {
            log::info!(
                "Validated [{}] {} x{} (best confidence {:.2}) {}",
                confirmed.strength,
                confirmed.signal_type,
                occurrences,
                confirmed.confidence_level,
                confirmed.description
            );
        }
        Ok(())
    }
}
