/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Single-slot park/unpark signal.
//!
//! A task parks itself when its socket would block and is unparked by the
//! readiness poller. An unpark that arrives before the park is kept as a
//! permit, so the wakeup is never lost; several unparks in a row collapse
//! into that one permit.

use tokio::sync::Notify;

/// Suspends a task until another party signals it.
#[derive(Debug, Default)]
pub struct Parker {
    notify: Notify,
}

impl Parker {
    /// Creates a parker with no stored permit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until [`Parker::unpark`] has been called since the last park returned.
    pub async fn park(&self) {
        self.notify.notified().await;
    }

    /// Wakes the parked task, or stores a permit if none is parked.
    pub fn unpark(&self) {
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_unpark_before_park_is_not_lost() {
        let parker = Parker::new();
        parker.unpark();
        timeout(Duration::from_millis(100), parker.park())
            .await
            .expect("stored permit should release park");
    }

    #[tokio::test]
    async fn test_unparks_coalesce_into_one_permit() {
        let parker = Parker::new();
        parker.unpark();
        parker.unpark();
        parker.unpark();

        parker.park().await;
        let second = timeout(Duration::from_millis(50), parker.park()).await;
        assert!(second.is_err(), "only one permit should be stored");
    }

    #[tokio::test]
    async fn test_unpark_wakes_parked_task() {
        let parker = Arc::new(Parker::new());
        let waiter = {
            let parker = Arc::clone(&parker);
            tokio::spawn(async move { parker.park().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        parker.unpark();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("parked task should wake")
            .unwrap();
    }
}
