pub mod token;
pub mod webhook;
pub mod wecom;

pub use token::{TokenCache, TokenState};
pub use webhook::WebhookNotifier;
pub use wecom::{MessageType, TargetType, WeComNotifier, WeComSettings};
