pub mod models {
    pub mod tado;
}

pub mod client;
pub mod config;
pub mod coordinator;
pub mod fake;
pub mod provider;
pub mod registry;
pub mod shutdown;
pub mod snapshot;
pub mod zone_state;
