use crate::domain::model::{Delivery, Notification};
use crate::domain::ports::Notifier;

#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: String,
    pub result: Result<Delivery, String>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn outcome(&self, channel: &str) -> Option<&ChannelOutcome> {
        self.outcomes.iter().find(|o| o.channel == channel)
    }
}

/// 盡力廣播：每個頻道各自嘗試，單一頻道失敗不影響其他頻道
#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn add_channel(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub async fn dispatch(&self, notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport::default();

        for channel in &self.channels {
            let result = match channel.send(notification).await {
                Ok(delivery) => {
                    tracing::info!(
                        "📨 Notification for {} delivered via {}",
                        notification.subject_id,
                        channel.name()
                    );
                    Ok(delivery)
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Notification for {} failed on {}: {}",
                        notification.subject_id,
                        channel.name(),
                        e
                    );
                    Err(e.to_string())
                }
            };

            report.outcomes.push(ChannelOutcome {
                channel: channel.name().to_string(),
                result,
            });
        }

        report
    }
}
