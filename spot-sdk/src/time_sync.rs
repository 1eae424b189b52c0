use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use scoped_sleep::ScopedSleep;
use tracing::{debug, warn};
use url::Url;

use crate::{error::Error, utils, wire};

const INITIAL_EXCHANGES: u32 = 4;
const INITIAL_EXCHANGE_INTERVAL: Duration = Duration::from_millis(100);
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const SAMPLE_WINDOW: usize = 8;
const TICK: Duration = Duration::from_millis(10);

/// Offset between the local clock and the robot clock, estimated from
/// NTP-style round trips.
#[derive(Debug, Clone, Copy)]
pub struct ClockSkewEstimate {
    /// `robot clock - local clock`, in nanoseconds.
    pub skew_nanos: i64,
    /// Round trip time of the sample the estimate came from.
    pub round_trip: Duration,
}

impl ClockSkewEstimate {
    pub fn robot_time(&self, local: SystemTime) -> SystemTime {
        if self.skew_nanos >= 0 {
            local + Duration::from_nanos(self.skew_nanos as u64)
        } else {
            local - Duration::from_nanos(self.skew_nanos.unsigned_abs())
        }
    }
}

fn nanos_since_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

fn estimate_from_round_trip(
    client_tx: i64,
    server_rx: i64,
    server_tx: i64,
    client_rx: i64,
) -> ClockSkewEstimate {
    let skew_nanos = ((server_rx - client_tx) + (server_tx - client_rx)) / 2;
    let round_trip = ((client_rx - client_tx) - (server_tx - server_rx)).max(0);
    ClockSkewEstimate {
        skew_nanos,
        round_trip: Duration::from_nanos(round_trip as u64),
    }
}

fn best_sample(samples: &VecDeque<ClockSkewEstimate>) -> Option<ClockSkewEstimate> {
    samples.iter().min_by_key(|s| s.round_trip).copied()
}

/// Handle to the current estimate, detached from the thread so waiting
/// does not hold any robot-level lock.
#[derive(Debug, Clone)]
pub struct TimeSyncWaiter {
    estimate: Arc<Mutex<Option<ClockSkewEstimate>>>,
}

impl TimeSyncWaiter {
    pub fn estimate(&self) -> Option<ClockSkewEstimate> {
        *self.estimate.lock().unwrap()
    }

    pub fn wait_for_sync(&self, timeout: Duration) -> Result<ClockSkewEstimate, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(estimate) = self.estimate() {
                return Ok(estimate);
            }
            if Instant::now() >= deadline {
                return Err(Error::Uninitialized {
                    message: format!("time sync did not converge within {timeout:?}"),
                });
            }
            std::thread::sleep(TICK);
        }
    }
}

/// Background clock estimator: a burst of exchanges at startup, then a
/// periodic refresh. The minimum-RTT sample of the recent window wins.
#[derive(Debug)]
pub struct TimeSyncThread {
    estimate: Arc<Mutex<Option<ClockSkewEstimate>>>,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TimeSyncThread {
    pub(crate) fn start(base_url: Url) -> Self {
        let estimate: Arc<Mutex<Option<ClockSkewEstimate>>> = Arc::new(Mutex::new(None));
        let is_running = Arc::new(AtomicBool::new(true));

        let shared_estimate = estimate.clone();
        let running = is_running.clone();
        let thread = std::thread::spawn(move || {
            let mut samples = VecDeque::with_capacity(SAMPLE_WINDOW);
            let mut exchanges = 0u32;
            let mut next_exchange = Instant::now();
            while running.load(Ordering::Relaxed) {
                let _guard = ScopedSleep::new(TICK);
                if Instant::now() < next_exchange {
                    continue;
                }
                match exchange(&base_url) {
                    Ok(sample) => {
                        if samples.len() == SAMPLE_WINDOW {
                            samples.pop_front();
                        }
                        samples.push_back(sample);
                        *shared_estimate.lock().unwrap() = best_sample(&samples);
                        exchanges += 1;
                        debug!(
                            "time sync sample: skew={}ns rtt={:?}",
                            sample.skew_nanos, sample.round_trip
                        );
                        next_exchange = Instant::now()
                            + if exchanges < INITIAL_EXCHANGES {
                                INITIAL_EXCHANGE_INTERVAL
                            } else {
                                REFRESH_INTERVAL
                            };
                    }
                    Err(e) => {
                        warn!("time sync exchange failed: {e}");
                        next_exchange = Instant::now() + RETRY_INTERVAL;
                    }
                }
            }
        });

        Self {
            estimate,
            is_running,
            thread: Some(thread),
        }
    }

    pub fn estimate(&self) -> Option<ClockSkewEstimate> {
        *self.estimate.lock().unwrap()
    }

    pub fn waiter(&self) -> TimeSyncWaiter {
        TimeSyncWaiter {
            estimate: self.estimate.clone(),
        }
    }
}

impl Drop for TimeSyncThread {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

fn exchange(base_url: &Url) -> Result<ClockSkewEstimate, Error> {
    let client_tx = nanos_since_epoch();
    let res: wire::TimeSyncResponse = utils::post(
        base_url.join("time_sync").unwrap(),
        None,
        &wire::TimeSyncRequest {
            client_tx_nanos: client_tx,
        },
    )?;
    let client_rx = nanos_since_epoch();
    Ok(estimate_from_round_trip(
        client_tx,
        res.server_rx_nanos,
        res.server_tx_nanos,
        client_rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_round_trip_measures_skew() {
        // Robot clock 500ns ahead, 100ns of wire each way.
        let estimate = estimate_from_round_trip(0, 600, 650, 250);
        assert_eq!(estimate.skew_nanos, 500);
        assert_eq!(estimate.round_trip, Duration::from_nanos(200));
    }

    #[test]
    fn test_negative_skew() {
        // Robot clock 1us behind.
        let estimate = estimate_from_round_trip(1000, 100, 150, 1250);
        assert_eq!(estimate.skew_nanos, -1000);
        let local = UNIX_EPOCH + Duration::from_micros(10);
        assert_eq!(
            estimate.robot_time(local),
            UNIX_EPOCH + Duration::from_nanos(9000)
        );
    }

    #[test]
    fn test_best_sample_prefers_min_rtt() {
        let mut samples = VecDeque::new();
        assert!(best_sample(&samples).is_none());
        samples.push_back(estimate_from_round_trip(0, 700, 700, 1000));
        samples.push_back(estimate_from_round_trip(0, 550, 550, 200));
        samples.push_back(estimate_from_round_trip(0, 900, 900, 1500));
        let best = best_sample(&samples).unwrap();
        assert_eq!(best.round_trip, Duration::from_nanos(200));
        assert_eq!(best.skew_nanos, 450);
    }
}
