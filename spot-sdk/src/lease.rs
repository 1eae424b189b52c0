use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use scoped_sleep::ScopedSleep;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::Error, robot::Robot, utils, wire};

/// Resource name of the whole robot body.
pub const BODY_RESOURCE: &str = "body";

const KEEP_ALIVE_TICK: Duration = Duration::from_millis(10);

/// Exclusive control authority over one robot resource. Only the holder
/// of the newest lease may command the resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub resource: String,
    pub sequence: u64,
}

#[derive(Debug, Clone)]
pub struct LeaseClient {
    robot: Robot,
}

impl LeaseClient {
    pub fn new(robot: &Robot) -> Self {
        Self {
            robot: robot.clone(),
        }
    }

    /// Acquires the lease on `resource`. Fails with a `Response` error
    /// while another client holds it.
    pub fn acquire(&self, resource: &str) -> Result<Lease, Error> {
        let res: wire::LeaseAcquireResponse = self.robot.post(
            "lease/acquire",
            &wire::LeaseAcquireRequest {
                resource: resource.to_owned(),
            },
        )?;
        if !res.is_ok {
            return Err(Error::Response { message: res.reason });
        }
        res.lease.ok_or_else(|| Error::Rpc {
            message: "acquire response without lease".to_owned(),
        })
    }

    /// Refreshes the lease so it does not expire.
    pub fn retain(&self, lease: &Lease) -> Result<(), Error> {
        utils::check(self.robot.post("lease/retain", lease)?)
    }

    /// Gives control authority back.
    pub fn return_lease(&self, lease: &Lease) -> Result<(), Error> {
        utils::check(self.robot.post("lease/return", lease)?)
    }
}

/// Background refresh preventing lease expiry. Dropping it stops the
/// thread and returns the lease best effort.
#[derive(Debug)]
pub struct LeaseKeepAlive {
    client: LeaseClient,
    lease: Lease,
    is_running: Arc<AtomicBool>,
    is_alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LeaseKeepAlive {
    pub fn new(client: &LeaseClient, lease: Lease, period: Duration) -> Self {
        let is_running = Arc::new(AtomicBool::new(true));
        let is_alive = Arc::new(AtomicBool::new(true));

        let thread_client = client.clone();
        let thread_lease = lease.clone();
        let running = is_running.clone();
        let alive = is_alive.clone();
        let thread = std::thread::spawn(move || {
            let mut last_refresh = Instant::now();
            while running.load(Ordering::Relaxed) {
                let _guard = ScopedSleep::new(KEEP_ALIVE_TICK);
                if last_refresh.elapsed() < period {
                    continue;
                }
                last_refresh = Instant::now();
                match thread_client.retain(&thread_lease) {
                    Ok(()) => alive.store(true, Ordering::Relaxed),
                    Err(e) => {
                        alive.store(false, Ordering::Relaxed);
                        warn!("failed to retain lease {:?}: {e}", thread_lease.resource);
                    }
                }
            }
        });

        Self {
            client: client.clone(),
            lease,
            is_running,
            is_alive,
            thread: Some(thread),
        }
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Whether the most recent refresh succeeded.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }
}

impl Drop for LeaseKeepAlive {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        if let Err(e) = self.client.return_lease(&self.lease) {
            debug!("failed to return lease on drop: {e}");
        }
    }
}
