use std::{
    fmt,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    error::Error,
    time_sync::{ClockSkewEstimate, TimeSyncThread},
    utils, wire,
};

/// Identity record of a robot, as reported by the robot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotId {
    pub name: String,
    pub serial_number: String,
    pub species: String,
    pub software_version: String,
}

/// Entry point mirroring the vendor SDK: an `Sdk` stamps every robot it
/// creates with a client name.
#[derive(Debug, Clone)]
pub struct Sdk {
    client_name: String,
}

impl Sdk {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Creates a handle to the robot at `hostname` (a host, `host:port`
    /// pair, or full URL). No network traffic happens here.
    pub fn create_robot(&self, hostname: &str) -> Result<Robot, Error> {
        let raw = if hostname.contains("://") {
            hostname.to_owned()
        } else {
            format!("http://{hostname}")
        };
        let base_url = Url::parse(&raw)
            .map_err(|e| Error::Other(anyhow::anyhow!("hostname {hostname}: {e}")))?;
        Ok(Robot {
            inner: Arc::new(RobotInner {
                base_url,
                client_name: self.client_name.clone(),
                token: Mutex::new(None),
                time_sync: Mutex::new(None),
            }),
        })
    }
}

/// Shared handle to one robot. Cheap to clone; service clients keep a
/// clone and route their RPCs through it.
#[derive(Clone)]
pub struct Robot {
    inner: Arc<RobotInner>,
}

struct RobotInner {
    base_url: Url,
    client_name: String,
    token: Mutex<Option<String>>,
    time_sync: Mutex<Option<TimeSyncThread>>,
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("base_url", &self.inner.base_url)
            .field("client_name", &self.inner.client_name)
            .finish_non_exhaustive()
    }
}

impl Robot {
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn client_name(&self) -> &str {
        &self.inner.client_name
    }

    /// Exchanges the credentials for a session token used by all
    /// authenticated services.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(), Error> {
        let res: wire::AuthResponse = self.post(
            "auth",
            &wire::AuthRequest {
                username: username.to_owned(),
                password: password.to_owned(),
                client_name: self.inner.client_name.clone(),
            },
        )?;
        if !res.is_ok {
            return Err(Error::Response { message: res.reason });
        }
        let token = res.token.ok_or_else(|| Error::Rpc {
            message: "auth response without token".to_owned(),
        })?;
        *self.inner.token.lock().unwrap() = Some(token);
        debug!("authenticated against {}", self.inner.base_url);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.token.lock().unwrap().is_some()
    }

    /// Starts the background clock estimator. Idempotent.
    pub fn start_time_sync(&self) {
        let mut guard = self.inner.time_sync.lock().unwrap();
        if guard.is_none() {
            *guard = Some(TimeSyncThread::start(self.inner.base_url.clone()));
        }
    }

    /// Current clock skew estimate, if time sync has converged.
    pub fn clock_skew(&self) -> Option<ClockSkewEstimate> {
        self.inner
            .time_sync
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|t| t.estimate())
    }

    /// Blocks until a clock skew estimate exists.
    pub fn wait_for_time_sync(&self, timeout: Duration) -> Result<ClockSkewEstimate, Error> {
        let waiter = {
            let guard = self.inner.time_sync.lock().unwrap();
            guard.as_ref().map(|t| t.waiter())
        };
        match waiter {
            Some(waiter) => waiter.wait_for_sync(timeout),
            None => Err(Error::Uninitialized {
                message: "time sync is not started".to_owned(),
            }),
        }
    }

    /// Maps a local timestamp onto the robot clock.
    pub fn robot_time(&self, local: SystemTime) -> Result<SystemTime, Error> {
        let estimate = self.clock_skew().ok_or_else(|| Error::Uninitialized {
            message: "time sync has not converged".to_owned(),
        })?;
        Ok(estimate.robot_time(local))
    }

    pub fn robot_id(&self) -> Result<RobotId, Error> {
        self.get("robot_id")
    }

    fn token(&self) -> Option<String> {
        self.inner.token.lock().unwrap().clone()
    }

    fn url_for(&self, path: &str) -> Url {
        self.inner.base_url.join(path).unwrap()
    }

    pub(crate) fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        utils::get(self.url_for(path), self.token().as_deref())
    }

    pub(crate) fn post<T: Serialize, U: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        msg: &T,
    ) -> Result<U, Error> {
        utils::post(self.url_for(path), self.token().as_deref(), msg)
    }
}
