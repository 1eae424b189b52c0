//! Simulated robot speaking the wire protocol of [`spot_sdk`].
//!
//! Backs the integration tests and the demo binary: credentials, a
//! single-holder lease table, and an e-stop endpoint slot with challenge
//! verification, all behind shared state the test can inspect.

#![warn(missing_debug_implementations, rust_2018_idioms)]

use std::{
    io,
    net::TcpStream,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer};
use spot_sdk::{
    answer_challenge,
    wire::{
        AuthRequest, AuthResponse, EstopCheckInRequest, EstopCheckInResponse,
        EstopDeregisterRequest, EstopRegisterRequest, EstopRegisterResponse, LeaseAcquireRequest,
        LeaseAcquireResponse, RpcResult, TimeSyncRequest, TimeSyncResponse,
    },
    Lease, RobotId, StopLevel,
};

#[derive(Debug, Clone)]
pub struct SimEstopEndpoint {
    pub name: String,
    pub unique_id: String,
    pub challenge: u64,
    pub timeout_sec: f64,
}

#[derive(Debug)]
pub struct SimState {
    pub username: String,
    pub password: String,
    pub robot_id: RobotId,
    /// Added to the local clock when answering time sync.
    pub clock_skew_nanos: i64,
    pub token: Option<String>,
    pub auth_count: u64,
    pub lease: Option<Lease>,
    pub lease_counter: u64,
    pub retain_count: u64,
    pub estop: Option<SimEstopEndpoint>,
    pub estop_counter: u64,
    pub check_in_count: u64,
    pub last_stop_level: Option<StopLevel>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            username: "user".to_owned(),
            password: "password".to_owned(),
            robot_id: RobotId {
                name: "sim-spot".to_owned(),
                serial_number: "000060189461".to_owned(),
                species: "spot".to_owned(),
                software_version: "2.3.5".to_owned(),
            },
            clock_skew_nanos: 0,
            token: None,
            auth_count: 0,
            lease: None,
            lease_counter: 0,
            retain_count: 0,
            estop: None,
            estop_counter: 0,
            check_in_count: 0,
            last_stop_level: None,
        }
    }
}

impl SimState {
    fn is_authorized(&self, req: &HttpRequest) -> bool {
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match (&self.token, header) {
            (Some(token), Some(header)) => token == header,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimRobot {
    pub port: u16,
    pub state: Arc<Mutex<SimState>>,
}

impl SimRobot {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    #[actix_web::main]
    pub async fn start(self) -> io::Result<()> {
        let state = web::Data::from(self.state);
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .service(auth)
                .service(robot_id)
                .service(time_sync)
                .service(lease_acquire)
                .service(lease_retain)
                .service(lease_return)
                .service(estop_register)
                .service(estop_check_in)
                .service(estop_deregister)
        })
        .workers(1)
        .bind(("127.0.0.1", self.port))?
        .run()
        .await
    }

    /// Serves on a background thread and returns once the port accepts
    /// connections.
    pub fn start_background(&self) {
        let server = self.clone();
        std::thread::spawn(move || {
            server.start().expect("failed to start sim server");
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while TcpStream::connect(("127.0.0.1", self.port)).is_err() {
            if Instant::now() >= deadline {
                panic!("sim server did not come up on port {}", self.port);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

fn now_nanos(skew: i64) -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
        + skew
}

#[post("auth")]
async fn auth(
    json: web::Json<AuthRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if json.username != state.username || json.password != state.password {
        return HttpResponse::Ok().json(&AuthResponse {
            is_ok: false,
            reason: format!("invalid login for user {:?}", json.username),
            token: None,
        });
    }
    state.auth_count += 1;
    let token = format!("session-{}", state.auth_count);
    state.token = Some(token.clone());
    HttpResponse::Ok().json(&AuthResponse {
        is_ok: true,
        reason: String::new(),
        token: Some(token),
    })
}

#[get("robot_id")]
async fn robot_id(data: web::Data<Mutex<SimState>>) -> HttpResponse {
    let state = data.lock().unwrap();
    HttpResponse::Ok().json(&state.robot_id)
}

#[post("time_sync")]
async fn time_sync(
    _json: web::Json<TimeSyncRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let skew = data.lock().unwrap().clock_skew_nanos;
    let now = now_nanos(skew);
    HttpResponse::Ok().json(&TimeSyncResponse {
        server_rx_nanos: now,
        server_tx_nanos: now,
    })
}

#[post("lease/acquire")]
async fn lease_acquire(
    req: HttpRequest,
    json: web::Json<LeaseAcquireRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&LeaseAcquireResponse {
            is_ok: false,
            reason: "unauthenticated".to_owned(),
            lease: None,
        });
    }
    if let Some(holder) = &state.lease {
        return HttpResponse::Ok().json(&LeaseAcquireResponse {
            is_ok: false,
            reason: format!("Resource {:?} is already claimed", holder.resource),
            lease: None,
        });
    }
    state.lease_counter += 1;
    let lease = Lease {
        resource: json.resource.clone(),
        sequence: state.lease_counter,
    };
    state.lease = Some(lease.clone());
    HttpResponse::Ok().json(&LeaseAcquireResponse {
        is_ok: true,
        reason: String::new(),
        lease: Some(lease),
    })
}

#[post("lease/retain")]
async fn lease_retain(
    req: HttpRequest,
    json: web::Json<Lease>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&RpcResult::error("unauthenticated"));
    }
    if state.lease.as_ref() != Some(&*json) {
        return HttpResponse::Ok().json(&RpcResult::error("lease is stale"));
    }
    state.retain_count += 1;
    HttpResponse::Ok().json(&RpcResult::ok())
}

#[post("lease/return")]
async fn lease_return(
    req: HttpRequest,
    json: web::Json<Lease>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&RpcResult::error("unauthenticated"));
    }
    if state.lease.as_ref() != Some(&*json) {
        return HttpResponse::Ok().json(&RpcResult::error("lease is stale"));
    }
    state.lease = None;
    HttpResponse::Ok().json(&RpcResult::ok())
}

#[post("estop/register")]
async fn estop_register(
    req: HttpRequest,
    json: web::Json<EstopRegisterRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&EstopRegisterResponse {
            is_ok: false,
            reason: "unauthenticated".to_owned(),
            unique_id: None,
            challenge: None,
        });
    }
    if state.estop.is_some() && !json.sole {
        return HttpResponse::Ok().json(&EstopRegisterResponse {
            is_ok: false,
            reason: "an endpoint is already registered".to_owned(),
            unique_id: None,
            challenge: None,
        });
    }
    state.estop_counter += 1;
    let endpoint = SimEstopEndpoint {
        name: json.name.clone(),
        unique_id: format!("endpoint-{}", state.estop_counter),
        challenge: 1000 + state.estop_counter,
        timeout_sec: json.timeout_sec,
    };
    let response = EstopRegisterResponse {
        is_ok: true,
        reason: String::new(),
        unique_id: Some(endpoint.unique_id.clone()),
        challenge: Some(endpoint.challenge),
    };
    state.estop = Some(endpoint);
    HttpResponse::Ok().json(&response)
}

#[post("estop/check_in")]
async fn estop_check_in(
    req: HttpRequest,
    json: web::Json<EstopCheckInRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&EstopCheckInResponse {
            is_ok: false,
            reason: "unauthenticated".to_owned(),
            challenge: None,
        });
    }
    let state = &mut *state;
    let Some(endpoint) = state.estop.as_mut() else {
        return HttpResponse::Ok().json(&EstopCheckInResponse {
            is_ok: false,
            reason: "no endpoint is registered".to_owned(),
            challenge: None,
        });
    };
    if endpoint.unique_id != json.unique_id {
        return HttpResponse::Ok().json(&EstopCheckInResponse {
            is_ok: false,
            reason: format!("unknown endpoint {:?}", json.unique_id),
            challenge: None,
        });
    }
    if json.response != answer_challenge(endpoint.challenge) {
        return HttpResponse::Ok().json(&EstopCheckInResponse {
            is_ok: false,
            reason: "challenge mismatch".to_owned(),
            challenge: None,
        });
    }
    endpoint.challenge = endpoint.challenge.wrapping_add(1);
    let next = endpoint.challenge;
    state.check_in_count += 1;
    state.last_stop_level = Some(json.level);
    HttpResponse::Ok().json(&EstopCheckInResponse {
        is_ok: true,
        reason: String::new(),
        challenge: Some(next),
    })
}

#[post("estop/deregister")]
async fn estop_deregister(
    req: HttpRequest,
    json: web::Json<EstopDeregisterRequest>,
    data: web::Data<Mutex<SimState>>,
) -> HttpResponse {
    let mut state = data.lock().unwrap();
    if !state.is_authorized(&req) {
        return HttpResponse::Ok().json(&RpcResult::error("unauthenticated"));
    }
    let registered = state
        .estop
        .as_ref()
        .is_some_and(|e| e.unique_id == json.unique_id);
    if !registered {
        return HttpResponse::Ok().json(&RpcResult::error(format!(
            "unknown endpoint {:?}",
            json.unique_id
        )));
    }
    state.estop = None;
    HttpResponse::Ok().json(&RpcResult::ok())
}
