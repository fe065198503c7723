//! Default tunables shared by the controller and its command line.

use std::time::Duration;

/// Interval between two reconcile ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// How long before expiry credentials are rotated.
pub const DEFAULT_REFRESH_LIMIT: Duration = Duration::from_secs(15 * 60);

/// Capacity of the pod event queue between the watcher and the role registry.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 10;

/// Session duration requested when a declaration does not specify one.
pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);
