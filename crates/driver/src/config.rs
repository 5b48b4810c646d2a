use std::time::Duration;

use clap::Args;

use holo::EngineConfig;
use holo::net::protocol;

use crate::scene::Scene;

#[derive(Args)]
pub struct RunArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = protocol::DEFAULT_DEVICE_PORT)]
    pub port: u16,

    #[arg(short, long, value_enum, default_value_t = Scene::Orbit)]
    pub scene: Scene,

    #[arg(short, long, default_value_t = 10.0, help = "Seconds to run for")]
    pub duration: f64,

    #[arg(short, long, default_value_t = 60)]
    pub tick_rate: u32,

    #[arg(long, default_value_t = 0, help = "Local UDP port, 0 for ephemeral")]
    pub local_port: u16,

    #[arg(long, default_value_t = 1000, help = "Heartbeat interval in ms")]
    pub heartbeat_ms: u64,

    #[arg(long, help = "Push a health snapshot every N ms")]
    pub health_ms: Option<u64>,

    #[arg(long, help = "Datagram size ceiling in bytes")]
    pub max_datagram: Option<usize>,
}

impl RunArgs {
    pub fn into_config(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            tick_rate: self.tick_rate,
            local_port: self.local_port,
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms),
            health_interval: self.health_ms.map(Duration::from_millis),
            max_datagram_size: self.max_datagram.unwrap_or(defaults.max_datagram_size),
            ..defaults
        }
    }
}
