use crate::application::oauth::NowProvider;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Webhook,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Webhook => "webhook",
            Trigger::Manual => "manual",
        }
    }

    fn honors_cooldown(&self) -> bool {
        matches!(self, Trigger::Webhook)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassRejection {
    InFlight,
    Cooldown { remaining: Duration },
}

impl fmt::Display for PassRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassRejection::InFlight => write!(f, "a sync pass is already running"),
            PassRejection::Cooldown { remaining } => {
                write!(f, "sync cooldown active for another {}s", remaining.as_secs())
            }
        }
    }
}

#[derive(Debug, Default)]
struct PassState {
    in_flight: bool,
    last_completed: Option<DateTime<Utc>>,
}

/// Guarantees at most one pass at a time and rate-limits webhook passes.
#[derive(Clone)]
pub struct PassCoordinator {
    state: Arc<Mutex<PassState>>,
    idle: Arc<Notify>,
    cooldown: Duration,
    now_provider: NowProvider,
}

impl PassCoordinator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PassState::default())),
            idle: Arc::new(Notify::new()),
            cooldown,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn lock(&self) -> MutexGuard<'_, PassState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_start_pass(&self, trigger: Trigger) -> Result<PassPermit, PassRejection> {
        let mut state = self.lock();
        if state.in_flight {
            return Err(PassRejection::InFlight);
        }

        if trigger.honors_cooldown() {
            if let Some(last) = state.last_completed {
                let elapsed = ((self.now_provider)() - last)
                    .to_std()
                    .unwrap_or_default();
                if elapsed < self.cooldown {
                    return Err(PassRejection::Cooldown {
                        remaining: self.cooldown - elapsed,
                    });
                }
            }
        }

        state.in_flight = true;
        debug!(trigger = trigger.as_str(), "pass started");
        Ok(PassPermit {
            coordinator: self.clone(),
            trigger,
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        self.lock().last_completed
    }

    /// Resolves once no pass is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let ended = self.idle.notified();
            if !self.is_in_flight() {
                return;
            }
            ended.await;
        }
    }

    fn end_pass(&self) {
        let now = (self.now_provider)();
        {
            let mut state = self.lock();
            state.in_flight = false;
            state.last_completed = Some(now);
        }
        self.idle.notify_waiters();
    }
}

/// Held for the duration of a pass. Dropping it ends the pass.
pub struct PassPermit {
    coordinator: PassCoordinator,
    trigger: Trigger,
}

impl PassPermit {
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }
}

impl Drop for PassPermit {
    fn drop(&mut self) {
        self.coordinator.end_pass();
        debug!(trigger = self.trigger.as_str(), "pass ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(start: &str) -> (Arc<Mutex<DateTime<Utc>>>, NowProvider) {
        let now = Arc::new(Mutex::new(
            DateTime::parse_from_rfc3339(start)
                .expect("datetime")
                .with_timezone(&Utc),
        ));
        let shared = Arc::clone(&now);
        let provider: NowProvider = Arc::new(move || *shared.lock().expect("clock lock"));
        (now, provider)
    }

    fn advance(now: &Arc<Mutex<DateTime<Utc>>>, seconds: i64) {
        let mut guard = now.lock().expect("clock lock");
        *guard += chrono::Duration::seconds(seconds);
    }

    #[test]
    fn second_pass_is_rejected_while_first_is_running() {
        let coordinator = PassCoordinator::new(Duration::from_secs(30));
        let permit = coordinator
            .try_start_pass(Trigger::Manual)
            .expect("first pass");
        assert!(coordinator.is_in_flight());

        for trigger in [Trigger::Manual, Trigger::Scheduled, Trigger::Webhook] {
            assert_eq!(
                coordinator.try_start_pass(trigger).err(),
                Some(PassRejection::InFlight)
            );
        }

        drop(permit);
        assert!(!coordinator.is_in_flight());
        assert!(coordinator.last_completed().is_some());
    }

    #[test]
    fn cooldown_only_limits_webhook_passes() {
        let (now, provider) = clock("2025-01-01T10:00:00Z");
        let coordinator = PassCoordinator::new(Duration::from_secs(30)).with_now_provider(provider);

        drop(coordinator.try_start_pass(Trigger::Webhook).expect("first pass"));
        advance(&now, 10);

        assert_eq!(
            coordinator.try_start_pass(Trigger::Webhook).err(),
            Some(PassRejection::Cooldown {
                remaining: Duration::from_secs(20)
            })
        );
        drop(coordinator.try_start_pass(Trigger::Manual).expect("manual bypasses cooldown"));
        advance(&now, 5);
        drop(coordinator.try_start_pass(Trigger::Scheduled).expect("scheduled bypasses cooldown"));

        advance(&now, 30);
        let permit = coordinator
            .try_start_pass(Trigger::Webhook)
            .expect("cooldown elapsed");
        assert_eq!(permit.trigger(), Trigger::Webhook);
    }

    #[test]
    fn first_webhook_is_never_in_cooldown() {
        let coordinator = PassCoordinator::new(Duration::from_secs(3600));
        assert!(coordinator.try_start_pass(Trigger::Webhook).is_ok());
    }

    #[tokio::test]
    async fn concurrent_attempts_admit_exactly_one_pass() {
        let coordinator = PassCoordinator::new(Duration::ZERO);
        let permit = coordinator
            .try_start_pass(Trigger::Scheduled)
            .expect("first pass");

        let handles = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.try_start_pass(Trigger::Manual).is_ok() })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert!(!handle.await.expect("join"));
        }
        drop(permit);
    }

    #[tokio::test]
    async fn waiting_for_idle_resolves_when_the_permit_drops() {
        let coordinator = PassCoordinator::new(Duration::ZERO);
        coordinator.wait_until_idle().await;

        let permit = coordinator
            .try_start_pass(Trigger::Scheduled)
            .expect("pass");
        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.wait_until_idle().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("join");
    }
}
