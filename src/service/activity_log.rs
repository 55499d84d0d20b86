use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

pub const ACTIVITY_LOG_CAPACITY: usize = 200;

/// Newest-first record of user-visible events, bounded in size.
pub struct ActivityLog {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(ACTIVITY_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn add(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: "activity", "{}", message);

        let entry = format!(
            "[{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<String> {
        match self.entries.lock() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}
