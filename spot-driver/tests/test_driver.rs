use std::{collections::HashMap, time::Duration};

use spot_driver::{Error, SpotDriver, SpotDriverConfig};
use spot_sim::SimRobot;

fn start_sim() -> SimRobot {
    let port = portpicker::pick_unused_port().expect("No ports free");
    let sim = SimRobot::new(port);
    sim.start_background();
    sim
}

fn sim_config(sim: &SimRobot) -> SpotDriverConfig {
    SpotDriverConfig {
        hostname: format!("127.0.0.1:{}", sim.port),
        username: "user".to_owned(),
        password: "password".to_owned(),
        rates: HashMap::from([("lease".to_owned(), 20.0)]),
        estop_timeout_sec: 0.3,
        ..SpotDriverConfig::default()
    }
}

#[test]
fn test_try_new_rejects_bad_credentials() {
    let sim = start_sim();
    let mut config = sim_config(&sim);
    config.password = "wrong".to_owned();
    match SpotDriver::try_new(config) {
        Err(Error::SpotSdk(spot_sdk::Error::Response { message })) => {
            assert!(message.contains("invalid login"))
        }
        res => panic!("unexpected {res:?}"),
    }
}

#[test]
fn test_try_new_fails_without_robot() {
    // Nothing listens on port 1.
    let config = SpotDriverConfig {
        hostname: "127.0.0.1:1".to_owned(),
        ..SpotDriverConfig::default()
    };
    match SpotDriver::try_new(config) {
        Err(Error::SpotSdk(spot_sdk::Error::Rpc { .. })) => {}
        res => panic!("unexpected {res:?}"),
    }
}

#[test]
fn test_claim_and_release() {
    let sim = start_sim();
    let mut driver = SpotDriver::try_new(sim_config(&sim)).unwrap();
    assert!(!driver.is_claimed());
    assert!(driver.robot_id().is_none());

    driver.claim().unwrap();
    assert!(driver.is_claimed());
    assert_eq!(driver.robot_id().unwrap().name, "sim-spot");
    assert_eq!(driver.lease().unwrap().resource, "body");
    {
        let state = sim.state.lock().unwrap();
        assert!(state.lease.is_some());
        assert_eq!(state.estop.as_ref().unwrap().name, "spot_driver");
    }

    // Keepalives beat while the claim is held.
    std::thread::sleep(Duration::from_millis(300));
    assert!(driver.lease_keep_alive().unwrap().is_alive());
    assert!(driver.estop_keep_alive().unwrap().is_alive());
    assert!(sim.state.lock().unwrap().retain_count >= 2);
    assert!(sim.state.lock().unwrap().check_in_count >= 2);

    driver.release();
    assert!(!driver.is_claimed());
    assert!(driver.robot_id().is_none());
    let state = sim.state.lock().unwrap();
    assert!(state.lease.is_none());
    assert!(state.estop.is_none());
}

#[test]
fn test_claim_reports_held_lease() {
    let sim = start_sim();
    sim.state.lock().unwrap().lease = Some(spot_sdk::Lease {
        resource: "body".to_owned(),
        sequence: 1,
    });
    let mut driver = SpotDriver::try_new(sim_config(&sim)).unwrap();
    let err = driver.claim().unwrap_err();
    assert!(err.to_string().contains("already claimed"));
    assert!(!driver.is_claimed());
    assert!(driver.robot_id().is_none());
}

#[test]
fn test_claim_twice_replaces_session() {
    let sim = start_sim();
    let mut driver = SpotDriver::try_new(sim_config(&sim)).unwrap();
    driver.claim().unwrap();
    let first_sequence = driver.lease().unwrap().sequence;
    driver.claim().unwrap();
    assert!(driver.lease().unwrap().sequence > first_sequence);
    assert!(sim.state.lock().unwrap().lease.is_some());
}

#[test]
fn test_motion_state_starts_sitting() {
    let sim = start_sim();
    let driver = SpotDriver::try_new(sim_config(&sim)).unwrap();
    let state = driver.motion_state();
    assert!(state.is_sitting());
    assert!(!state.is_standing());
}
