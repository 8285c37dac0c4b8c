pub mod detect;
pub mod dispatch;
pub mod extract;
pub mod poller;
pub mod report;

pub use detect::{Change, DetectionMode};
pub use dispatch::{DispatchReport, Dispatcher};
pub use extract::FieldNames;
pub use poller::{Poller, PollerSettings, RoundSummary, SourceRequest, SubjectOutcome};
