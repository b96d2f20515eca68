pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_default_config};
pub use schema::{
    ContainerManagerConfig, ControlApiConfig, FleetConfig, GatewayConfig, ProvisionerConfig,
    StoreConfig, SupervisorConfig, WorkerAgentConfig,
};
