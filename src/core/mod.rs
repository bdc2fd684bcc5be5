// Core module - bridges, relay pumps and the registry
pub mod bridge;
pub mod registry;
pub mod relay;
