use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use super::{now_stamp, ProgressStore, RunProgress};
use crate::sensor::{push_all, SensorSink, Throttle};

/// Persists progress and relays it to the sensor sink.
///
/// Neither side can fail a run: write errors and relay errors are logged.
pub struct ProgressPublisher {
    store: Arc<dyn ProgressStore>,
    sink: Box<dyn SensorSink>,
    throttle: Throttle,
}

impl ProgressPublisher {
    pub fn new(store: Arc<dyn ProgressStore>, sink: Box<dyn SensorSink>, push_interval: Duration) -> Self {
        Self {
            store,
            sink,
            throttle: Throttle::new(push_interval),
        }
    }

    /// Stamp, persist and (if the throttle allows) relay a snapshot.
    pub fn publish(&mut self, progress: &mut RunProgress) {
        progress.last_run = now_stamp();

        if let Err(e) = self.store.save(progress) {
            warn!("Failed to write progress: {:#}", e);
        }

        if self.throttle.should_push(progress, Instant::now()) {
            push_all(self.sink.as_ref(), progress);
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{MemoryProgressStore, Status};
    use crate::sensor::tests::RecordingSink;
    use anyhow::{anyhow, Result};

    struct BrokenStore;

    impl ProgressStore for BrokenStore {
        fn save(&self, _progress: &RunProgress) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        fn snapshot(&self) -> RunProgress {
            RunProgress::default()
        }
    }

    #[test]
    fn test_publish_saves_snapshot() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut publisher = ProgressPublisher::new(
            store.clone(),
            Box::new(RecordingSink::default()),
            Duration::from_secs(60),
        );

        let mut progress = RunProgress::starting();
        progress.total = 3;
        publisher.publish(&mut progress);

        assert_eq!(store.snapshot().total, 3);
        assert_eq!(store.snapshot().status, Status::Starting);
    }

    #[test]
    fn test_write_failure_does_not_panic() {
        let mut publisher = ProgressPublisher::new(
            Arc::new(BrokenStore),
            Box::new(RecordingSink {
                fail: true,
                ..Default::default()
            }),
            Duration::from_secs(60),
        );

        let mut progress = RunProgress::starting();
        publisher.publish(&mut progress);
        progress.status = Status::Complete;
        publisher.publish(&mut progress);
    }
}
