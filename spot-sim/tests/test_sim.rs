use std::time::Duration;

use spot_sdk::{
    Error, EstopClient, EstopEndpoint, EstopKeepAlive, LeaseClient, LeaseKeepAlive, Robot, Sdk,
    StopLevel,
};
use spot_sim::SimRobot;

fn start_sim() -> (SimRobot, Robot) {
    let port = portpicker::pick_unused_port().expect("No ports free");
    let sim = SimRobot::new(port);
    sim.start_background();
    let robot = Sdk::new("spot_sdk_test").create_robot(&sim.url()).unwrap();
    (sim, robot)
}

fn start_authenticated() -> (SimRobot, Robot) {
    let (sim, robot) = start_sim();
    robot.authenticate("user", "password").unwrap();
    (sim, robot)
}

#[test]
fn test_authenticate() {
    let (sim, robot) = start_sim();
    assert!(!robot.is_authenticated());
    match robot.authenticate("user", "wrong") {
        Err(Error::Response { message }) => assert!(message.contains("invalid login")),
        res => panic!("unexpected {res:?}"),
    }
    assert!(!robot.is_authenticated());
    robot.authenticate("user", "password").unwrap();
    assert!(robot.is_authenticated());
    assert!(sim.state.lock().unwrap().token.is_some());
}

#[test]
fn test_robot_id() {
    let (_sim, robot) = start_sim();
    let id = robot.robot_id().unwrap();
    assert_eq!(id.name, "sim-spot");
    assert_eq!(id.species, "spot");
}

#[test]
fn test_time_sync_converges_to_configured_skew() {
    let (sim, robot) = start_sim();
    sim.state.lock().unwrap().clock_skew_nanos = 250_000_000;
    robot.start_time_sync();
    let estimate = robot.wait_for_time_sync(Duration::from_secs(5)).unwrap();
    // Loopback round trips are far below the tolerance.
    assert!(
        (estimate.skew_nanos - 250_000_000).abs() < 100_000_000,
        "estimated skew {}ns",
        estimate.skew_nanos
    );
    assert!(robot.clock_skew().is_some());
}

#[test]
fn test_lease_is_exclusive() {
    let (_sim, robot) = start_authenticated();
    let client = LeaseClient::new(&robot);
    let lease = client.acquire("body").unwrap();
    assert_eq!(lease.resource, "body");
    match client.acquire("body") {
        Err(Error::Response { message }) => assert!(message.contains("already claimed")),
        res => panic!("unexpected {res:?}"),
    }
    client.return_lease(&lease).unwrap();
    let lease2 = client.acquire("body").unwrap();
    assert!(lease2.sequence > lease.sequence);
    // A returned lease is stale.
    assert!(client.retain(&lease).is_err());
    assert!(client.retain(&lease2).is_ok());
}

#[test]
fn test_lease_requires_auth() {
    let (_sim, robot) = start_sim();
    match LeaseClient::new(&robot).acquire("body") {
        Err(Error::Response { message }) => assert!(message.contains("unauthenticated")),
        res => panic!("unexpected {res:?}"),
    }
}

#[test]
fn test_lease_keep_alive_retains_and_returns() {
    let (sim, robot) = start_authenticated();
    let client = LeaseClient::new(&robot);
    let lease = client.acquire("body").unwrap();
    let keep_alive = LeaseKeepAlive::new(&client, lease, Duration::from_millis(50));
    std::thread::sleep(Duration::from_millis(250));
    assert!(keep_alive.is_alive());
    assert!(sim.state.lock().unwrap().retain_count >= 2);
    drop(keep_alive);
    assert!(sim.state.lock().unwrap().lease.is_none());
}

#[test]
fn test_estop_challenge_sequence() {
    let (sim, robot) = start_authenticated();
    let client = EstopClient::new(&robot);
    let endpoint = EstopEndpoint::new(&client, "test", Duration::from_secs(9));
    endpoint.force_simple_setup().unwrap();
    // Sole registration replaced the table with this endpoint.
    assert_eq!(
        sim.state.lock().unwrap().estop.as_ref().unwrap().name,
        "test"
    );
    endpoint.check_in(StopLevel::Allow).unwrap();
    endpoint.check_in(StopLevel::Allow).unwrap();
    assert_eq!(sim.state.lock().unwrap().check_in_count, 3);

    // A check-in answering a stale challenge is rejected.
    let registration = client.register("rogue", Duration::from_secs(9), true).unwrap();
    match client.check_in(&registration.unique_id, registration.challenge + 7, StopLevel::Allow) {
        Err(Error::Response { message }) => assert!(message.contains("challenge mismatch")),
        res => panic!("unexpected {res:?}"),
    }
}

#[test]
fn test_estop_keep_alive_beats_and_deregisters() {
    let (sim, robot) = start_authenticated();
    let client = EstopClient::new(&robot);
    let endpoint = EstopEndpoint::new(&client, "test", Duration::from_millis(300));
    endpoint.force_simple_setup().unwrap();
    let keep_alive = EstopKeepAlive::new(endpoint);
    std::thread::sleep(Duration::from_millis(350));
    assert!(keep_alive.is_alive());
    {
        let state = sim.state.lock().unwrap();
        assert!(state.check_in_count >= 2);
        assert_eq!(state.last_stop_level, Some(StopLevel::Allow));
    }
    keep_alive.cut().unwrap();
    assert_eq!(
        sim.state.lock().unwrap().last_stop_level,
        Some(StopLevel::Cut)
    );
    drop(keep_alive);
    assert!(sim.state.lock().unwrap().estop.is_none());
}
