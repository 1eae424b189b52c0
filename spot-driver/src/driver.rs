use spot_sdk::{
    EstopClient, EstopEndpoint, EstopKeepAlive, Lease, LeaseClient, LeaseKeepAlive, Robot,
    RobotId, Sdk,
};
use tracing::{debug, info};

use crate::{config::SpotDriverConfig, error::Error};

/// Motion flags mirrored from the robot. Updated by the state polling
/// consumers; a fresh driver reports the powered-off posture.
#[derive(Debug, Clone, Copy)]
pub struct MotionState {
    is_standing: bool,
    is_sitting: bool,
    is_moving: bool,
    at_goal: bool,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            is_standing: false,
            is_sitting: true,
            is_moving: false,
            at_goal: false,
        }
    }
}

impl MotionState {
    pub fn is_standing(&self) -> bool {
        self.is_standing
    }

    pub fn is_sitting(&self) -> bool {
        self.is_sitting
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    pub fn at_goal(&self) -> bool {
        self.at_goal
    }
}

/// Wrapper holding one authenticated robot session and, once claimed,
/// the lease and e-stop keepalives that make it the controlling client.
#[derive(Debug)]
pub struct SpotDriver {
    config: SpotDriverConfig,
    robot: Robot,
    lease_client: LeaseClient,
    estop_client: EstopClient,
    robot_id: Option<RobotId>,
    // Declaration order matters: dropping the driver must stop the e-stop
    // check-ins before the lease is returned.
    estop_keep_alive: Option<EstopKeepAlive>,
    lease_keep_alive: Option<LeaseKeepAlive>,
    motion_state: MotionState,
}

impl SpotDriver {
    /// Builds the SDK, authenticates, and starts time sync. The returned
    /// driver has not claimed the robot yet.
    pub fn try_new(config: SpotDriverConfig) -> Result<Self, Error> {
        let sdk = Sdk::new(&config.client_name);
        let robot = sdk.create_robot(&config.hostname)?;
        robot.authenticate(&config.username, &config.password)?;
        robot.start_time_sync();
        let lease_client = LeaseClient::new(&robot);
        let estop_client = EstopClient::new(&robot);
        Ok(Self {
            config,
            robot,
            lease_client,
            estop_client,
            robot_id: None,
            estop_keep_alive: None,
            lease_keep_alive: None,
            motion_state: MotionState::default(),
        })
    }

    /// Claims the robot: fetches its identity, acquires the lease, and
    /// registers as the sole e-stop authority. Claiming again replaces
    /// the previous keepalives.
    pub fn claim(&mut self) -> Result<(), Error> {
        let id = self.robot.robot_id()?;
        debug!("claiming robot {:?}", id.name);
        self.get_lease()?;
        self.reset_estop()?;
        info!("claimed robot {} ({})", id.name, id.serial_number);
        self.robot_id = Some(id);
        Ok(())
    }

    /// Acquires the body lease and keeps it alive automatically.
    pub fn get_lease(&mut self) -> Result<(), Error> {
        self.lease_keep_alive = None;
        let lease = self.lease_client.acquire(&self.config.lease_resource)?;
        self.lease_keep_alive = Some(LeaseKeepAlive::new(
            &self.lease_client,
            lease,
            self.config.lease_keep_alive_period(),
        ));
        Ok(())
    }

    /// Registers a fresh sole e-stop endpoint and keeps it alive.
    pub fn reset_estop(&mut self) -> Result<(), Error> {
        self.estop_keep_alive = None;
        let endpoint = EstopEndpoint::new(
            &self.estop_client,
            &self.config.estop_name,
            self.config.estop_timeout(),
        );
        endpoint.force_simple_setup()?;
        self.estop_keep_alive = Some(EstopKeepAlive::new(endpoint));
        Ok(())
    }

    /// Gives the claim back: stops the e-stop check-ins, then returns the
    /// lease.
    pub fn release(&mut self) {
        self.estop_keep_alive = None;
        self.lease_keep_alive = None;
        self.robot_id = None;
    }

    pub fn is_claimed(&self) -> bool {
        self.lease_keep_alive.is_some()
    }

    pub fn robot(&self) -> &Robot {
        &self.robot
    }

    pub fn robot_id(&self) -> Option<&RobotId> {
        self.robot_id.as_ref()
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease_keep_alive.as_ref().map(|k| k.lease())
    }

    pub fn lease_keep_alive(&self) -> Option<&LeaseKeepAlive> {
        self.lease_keep_alive.as_ref()
    }

    pub fn estop_keep_alive(&self) -> Option<&EstopKeepAlive> {
        self.estop_keep_alive.as_ref()
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion_state
    }

    pub fn config(&self) -> &SpotDriverConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_state_defaults_to_sitting() {
        let state = MotionState::default();
        assert!(state.is_sitting());
        assert!(!state.is_standing());
        assert!(!state.is_moving());
        assert!(!state.at_goal());
    }
}
