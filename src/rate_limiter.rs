//! Rolling-window rate limiter for the FRED API.
//!
//! One global bucket shared across all tool namespaces (the namespace passed
//! to [`RateLimiter::acquire`] is an observability tag, not a partition).
//! Admission keeps the count of requests in the trailing window at or below
//! `max_requests`; a 429 reported through [`Ticket::observe`] installs an
//! exponentially growing penalty that delays every subsequent acquire until a
//! success clears it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry::Telemetry;

/// First penalty after a 429, doubled on each consecutive 429
const PENALTY_BASE_MS: u64 = 500;

/// Penalty ceiling
const PENALTY_CAP_MS: u64 = 30_000;

struct WindowState {
    /// Admission timestamps inside the trailing window, oldest first
    admissions: VecDeque<Instant>,
    /// Current penalty step; zero when no penalty is active
    penalty_ms: u64,
    /// Consecutive 429 count driving the doubling
    consecutive_429s: u32,
    /// Admissions are blocked until this instant while a penalty is active
    not_before: Option<Instant>,
    /// Wall-clock timestamp of the most recent 429
    last_429_at: Option<DateTime<Utc>>,
}

/// Rolling-window rate limiter with coordinated 429 penalties.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    /// FIFO turn lock. Held across the wait so waiters are admitted in arrival
    /// order; dropping a waiter's future releases its place in line before the
    /// next waiter is polled.
    turn: tokio::sync::Mutex<()>,
    /// Window and penalty fields. Never held across an await.
    state: Mutex<WindowState>,
    telemetry: Arc<Telemetry>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per rolling `window`.
    pub fn new(max_requests: usize, window: Duration, telemetry: Arc<Telemetry>) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            turn: tokio::sync::Mutex::new(()),
            state: Mutex::new(WindowState {
                admissions: VecDeque::new(),
                penalty_ms: 0,
                consecutive_429s: 0,
                not_before: None,
                last_429_at: None,
            }),
            telemetry,
        }
    }

    /// Acquire one admission, sleeping until the window has room and any
    /// active penalty has expired. The returned ticket represents exactly one
    /// permitted request; report its outcome with [`Ticket::observe`].
    pub async fn acquire(&self, namespace: &str) -> Ticket<'_> {
        let _turn = self.turn.lock().await;
        let mut blocked = false;

        loop {
            let wait = {
                let mut state = self.state.lock().expect("limiter state poisoned");
                let now = Instant::now();
                while let Some(front) = state.admissions.front() {
                    if now.duration_since(*front) >= self.window {
                        state.admissions.pop_front();
                    } else {
                        break;
                    }
                }

                let penalty_wait = state
                    .not_before
                    .filter(|t| *t > now)
                    .map(|t| t.duration_since(now));

                if state.admissions.len() < self.max_requests && penalty_wait.is_none() {
                    state.admissions.push_back(now);
                    None
                } else {
                    let window_wait = if state.admissions.len() >= self.max_requests {
                        state
                            .admissions
                            .front()
                            .map(|oldest| self.window - now.duration_since(*oldest))
                    } else {
                        None
                    };
                    // Wait for whichever expires later
                    Some(match (window_wait, penalty_wait) {
                        (Some(w), Some(p)) => w.max(p),
                        (Some(w), None) => w,
                        (None, Some(p)) => p,
                        (None, None) => Duration::from_millis(1),
                    })
                }
            };

            match wait {
                None => break,
                Some(duration) => {
                    if !blocked {
                        blocked = true;
                        self.telemetry.rate_limit_blocks_total.inc();
                        debug!(
                            namespace = %namespace,
                            wait_ms = duration.as_millis() as u64,
                            "rate limiter blocking"
                        );
                    }
                    tokio::time::sleep(duration).await;
                }
            }
        }

        Ticket {
            limiter: self,
            namespace: namespace.to_string(),
        }
    }

    fn record_outcome(&self, namespace: &str, http_status: u16) {
        let mut state = self.state.lock().expect("limiter state poisoned");
        if http_status == 429 {
            state.consecutive_429s += 1;
            let exponent = state.consecutive_429s.saturating_sub(1).min(16);
            state.penalty_ms = (PENALTY_BASE_MS << exponent).min(PENALTY_CAP_MS);
            state.not_before = Some(Instant::now() + Duration::from_millis(state.penalty_ms));
            state.last_429_at = Some(Utc::now());
            self.telemetry
                .limiter_active_penalty_ms
                .set(state.penalty_ms as f64);
            warn!(
                namespace = %namespace,
                penalty_ms = state.penalty_ms,
                consecutive = state.consecutive_429s,
                "FRED returned 429, penalty installed"
            );
        } else if state.penalty_ms > 0 {
            state.penalty_ms = 0;
            state.consecutive_429s = 0;
            state.not_before = None;
            self.telemetry.limiter_active_penalty_ms.set(0.0);
            debug!(namespace = %namespace, "limiter penalty cleared");
        }
    }

    /// Current window occupancy and penalty, for the health tool.
    pub fn snapshot(&self) -> Value {
        let mut state = self.state.lock().expect("limiter state poisoned");
        let now = Instant::now();
        while let Some(front) = state.admissions.front() {
            if now.duration_since(*front) >= self.window {
                state.admissions.pop_front();
            } else {
                break;
            }
        }
        let active_penalty_ms = match state.not_before {
            Some(t) if t > now => t.duration_since(now).as_millis() as u64,
            _ => 0,
        };
        json!({
            "window_seconds": self.window.as_secs(),
            "max_requests": self.max_requests,
            "in_use": state.admissions.len(),
            "active_penalty_ms": active_penalty_ms,
            "last_429_at": state.last_429_at.map(|t| t.to_rfc3339()),
        })
    }
}

/// One permitted request. Report the HTTP outcome so consecutive 429s can
/// grow the shared penalty and successes can clear it.
pub struct Ticket<'a> {
    limiter: &'a RateLimiter,
    namespace: String,
}

impl Ticket<'_> {
    /// Report the HTTP status of the request this ticket admitted.
    pub fn observe(&self, http_status: u16) {
        self.limiter.record_outcome(&self.namespace, http_status);
    }
}
