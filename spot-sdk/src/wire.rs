//! JSON messages of the robot's RPC services.
//!
//! Every mutating request is answered with an `is_ok`/`reason` envelope;
//! responses that carry a payload embed it next to the envelope fields.

use serde::{Deserialize, Serialize};

use crate::{estop::StopLevel, lease::Lease};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResult {
    pub is_ok: bool,
    pub reason: String,
}

impl RpcResult {
    pub fn ok() -> Self {
        Self {
            is_ok: true,
            reason: String::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            is_ok: false,
            reason: reason.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
    /// Name the SDK was created with, stamped on the session.
    pub client_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthResponse {
    pub is_ok: bool,
    pub reason: String,
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimeSyncRequest {
    /// Client clock at transmission, nanoseconds since the unix epoch.
    pub client_tx_nanos: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimeSyncResponse {
    pub server_rx_nanos: i64,
    pub server_tx_nanos: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaseAcquireRequest {
    pub resource: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LeaseAcquireResponse {
    pub is_ok: bool,
    pub reason: String,
    pub lease: Option<Lease>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstopRegisterRequest {
    pub name: String,
    pub timeout_sec: f64,
    /// Replace the whole e-stop configuration with this single endpoint.
    pub sole: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstopRegisterResponse {
    pub is_ok: bool,
    pub reason: String,
    pub unique_id: Option<String>,
    pub challenge: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstopCheckInRequest {
    pub unique_id: String,
    pub challenge: u64,
    pub response: u64,
    pub level: StopLevel,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstopCheckInResponse {
    pub is_ok: bool,
    pub reason: String,
    /// Challenge to answer on the next check-in.
    pub challenge: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstopDeregisterRequest {
    pub unique_id: String,
}
