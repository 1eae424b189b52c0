use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use scoped_sleep::ScopedSleep;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::Error, robot::Robot, utils, wire};

const KEEP_ALIVE_TICK: Duration = Duration::from_millis(10);

/// Stop level carried by every check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLevel {
    /// Cut motor power immediately.
    Cut,
    /// Let the robot keep operating.
    Allow,
}

/// Answer to an e-stop challenge. The robot only accepts a check-in whose
/// response is the bitwise complement of the pending challenge.
pub fn answer_challenge(challenge: u64) -> u64 {
    !challenge
}

#[derive(Debug, Clone)]
pub struct EstopClient {
    robot: Robot,
}

#[derive(Debug, Clone)]
pub struct EstopRegistration {
    pub unique_id: String,
    pub challenge: u64,
}

impl EstopClient {
    pub fn new(robot: &Robot) -> Self {
        Self {
            robot: robot.clone(),
        }
    }

    /// Registers an endpoint. With `sole` the robot replaces its whole
    /// e-stop configuration with this single endpoint.
    pub fn register(
        &self,
        name: &str,
        timeout: Duration,
        sole: bool,
    ) -> Result<EstopRegistration, Error> {
        let res: wire::EstopRegisterResponse = self.robot.post(
            "estop/register",
            &wire::EstopRegisterRequest {
                name: name.to_owned(),
                timeout_sec: timeout.as_secs_f64(),
                sole,
            },
        )?;
        if !res.is_ok {
            return Err(Error::Response { message: res.reason });
        }
        match (res.unique_id, res.challenge) {
            (Some(unique_id), Some(challenge)) => Ok(EstopRegistration {
                unique_id,
                challenge,
            }),
            _ => Err(Error::Rpc {
                message: "register response without endpoint id".to_owned(),
            }),
        }
    }

    /// Answers `challenge` and returns the challenge for the next
    /// check-in.
    pub fn check_in(
        &self,
        unique_id: &str,
        challenge: u64,
        level: StopLevel,
    ) -> Result<u64, Error> {
        let res: wire::EstopCheckInResponse = self.robot.post(
            "estop/check_in",
            &wire::EstopCheckInRequest {
                unique_id: unique_id.to_owned(),
                challenge,
                response: answer_challenge(challenge),
                level,
            },
        )?;
        if !res.is_ok {
            return Err(Error::Response { message: res.reason });
        }
        res.challenge.ok_or_else(|| Error::Rpc {
            message: "check-in response without next challenge".to_owned(),
        })
    }

    pub fn deregister(&self, unique_id: &str) -> Result<(), Error> {
        utils::check(self.robot.post(
            "estop/deregister",
            &wire::EstopDeregisterRequest {
                unique_id: unique_id.to_owned(),
            },
        )?)
    }
}

/// One registered e-stop authority. The robot halts unless the endpoint
/// checks in within its timeout.
#[derive(Debug)]
pub struct EstopEndpoint {
    client: EstopClient,
    name: String,
    timeout: Duration,
    registration: Mutex<Option<EstopRegistration>>,
}

impl EstopEndpoint {
    pub fn new(client: &EstopClient, name: &str, timeout: Duration) -> Self {
        Self {
            client: client.clone(),
            name: name.to_owned(),
            timeout,
            registration: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Registers this endpoint as the robot's sole e-stop authority and
    /// performs the first check-in.
    pub fn force_simple_setup(&self) -> Result<(), Error> {
        let registration = self.client.register(&self.name, self.timeout, true)?;
        debug!(
            "registered sole e-stop endpoint {:?} as {}",
            self.name, registration.unique_id
        );
        *self.registration.lock().unwrap() = Some(registration);
        self.check_in(StopLevel::Allow)
    }

    pub fn check_in(&self, level: StopLevel) -> Result<(), Error> {
        let mut guard = self.registration.lock().unwrap();
        let registration = guard.as_mut().ok_or_else(|| Error::Uninitialized {
            message: "e-stop endpoint is not registered".to_owned(),
        })?;
        let next =
            self.client
                .check_in(&registration.unique_id, registration.challenge, level)?;
        registration.challenge = next;
        Ok(())
    }

    /// Removes the endpoint from the robot's configuration.
    pub fn deregister(&self) -> Result<(), Error> {
        if let Some(registration) = self.registration.lock().unwrap().take() {
            self.client.deregister(&registration.unique_id)?;
        }
        Ok(())
    }
}

/// Background check-in at a third of the endpoint timeout, keeping the
/// robot from cutting power. Dropping it stops the thread and deregisters
/// the endpoint best effort.
#[derive(Debug)]
pub struct EstopKeepAlive {
    endpoint: Arc<EstopEndpoint>,
    desired_level: Arc<Mutex<StopLevel>>,
    is_running: Arc<AtomicBool>,
    is_alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EstopKeepAlive {
    pub fn new(endpoint: EstopEndpoint) -> Self {
        let endpoint = Arc::new(endpoint);
        let desired_level = Arc::new(Mutex::new(StopLevel::Allow));
        let is_running = Arc::new(AtomicBool::new(true));
        let is_alive = Arc::new(AtomicBool::new(true));

        let period = endpoint.timeout() / 3;
        let thread_endpoint = endpoint.clone();
        let level = desired_level.clone();
        let running = is_running.clone();
        let alive = is_alive.clone();
        let thread = std::thread::spawn(move || {
            let mut last_check_in = Instant::now();
            while running.load(Ordering::Relaxed) {
                let _guard = ScopedSleep::new(KEEP_ALIVE_TICK);
                if last_check_in.elapsed() < period {
                    continue;
                }
                last_check_in = Instant::now();
                let level = *level.lock().unwrap();
                match thread_endpoint.check_in(level) {
                    Ok(()) => alive.store(true, Ordering::Relaxed),
                    Err(e) => {
                        alive.store(false, Ordering::Relaxed);
                        warn!("e-stop check-in failed: {e}");
                    }
                }
            }
        });

        Self {
            endpoint,
            desired_level,
            is_running,
            is_alive,
            thread: Some(thread),
        }
    }

    /// Lets the robot keep operating.
    pub fn allow(&self) -> Result<(), Error> {
        self.set_level(StopLevel::Allow)
    }

    /// Cuts motor power now and on every following check-in.
    pub fn cut(&self) -> Result<(), Error> {
        self.set_level(StopLevel::Cut)
    }

    fn set_level(&self, level: StopLevel) -> Result<(), Error> {
        *self.desired_level.lock().unwrap() = level;
        self.endpoint.check_in(level)
    }

    /// Whether the most recent check-in succeeded.
    pub fn is_alive(&self) -> bool {
        self.is_alive.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &EstopEndpoint {
        &self.endpoint
    }
}

impl Drop for EstopKeepAlive {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        if let Err(e) = self.endpoint.deregister() {
            debug!("failed to deregister e-stop endpoint on drop: {e}");
        }
    }
}
