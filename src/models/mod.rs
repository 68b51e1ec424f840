// Domain models: container snapshots, baselines and notifications

mod baseline;
mod container;
mod notification;

pub use baseline::ContainerBaselineStats;
pub use container::{
    ContainerSnapshot, ContainerState, Host, LifecycleEvent, LifecycleKind, StatsPoint,
};
pub use notification::{
    EventType, Metadata, NotificationChannel, NotificationEvent, NotificationLog,
    NotificationRule, NotificationSilence, NotificationStatus,
};
