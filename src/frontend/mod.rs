//! Frontend: connection supervision and display routing

pub mod display;
pub mod supervisor;

pub use display::{ConnectionStatus, ConsoleDisplay, Display, DisplayUpdate};
pub use supervisor::{
    display_text, ConnectionSupervisor, ReconnectPolicy, SupervisorConfig, SupervisorState,
};
