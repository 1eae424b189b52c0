use std::path::PathBuf;

use tracing::warn;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

const SPOT_APPS_CONFIG_ENV_NAME: &str = "SPOT_APPS_DRIVER_CONFIG_PATH";

/// Get driver config from input or env SPOT_APPS_DRIVER_CONFIG_PATH
pub fn get_driver_config(config: Option<PathBuf>) -> Option<PathBuf> {
    if config.is_some() {
        config
    } else {
        std::env::var(SPOT_APPS_CONFIG_ENV_NAME)
            .map(|s| {
                warn!("### ENV VAR {} is used ###", s);
                PathBuf::from(s)
            })
            .ok()
    }
}

/// Do something needed to start the program
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_driver_config() {
        let path = get_driver_config(Some(PathBuf::from("a.toml")));
        assert!(path.is_some());
        assert_eq!(path.unwrap(), PathBuf::from("a.toml"));
        //
        std::env::set_var(SPOT_APPS_CONFIG_ENV_NAME, "b.toml");
        let path = get_driver_config(Some(PathBuf::from("a.toml")));
        assert!(path.is_some());
        assert_eq!(path.unwrap(), PathBuf::from("a.toml"));
        std::env::remove_var(SPOT_APPS_CONFIG_ENV_NAME);

        let path = get_driver_config(None);
        assert!(path.is_none());

        std::env::set_var(SPOT_APPS_CONFIG_ENV_NAME, "b.toml");
        let path = get_driver_config(None);
        assert!(path.is_some());
        assert_eq!(path.unwrap(), PathBuf::from("b.toml"));
        std::env::remove_var(SPOT_APPS_CONFIG_ENV_NAME);
    }
}
