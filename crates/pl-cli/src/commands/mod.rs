//! CLI command implementations

mod agent;
mod config;
mod create;
mod list;
mod remove;
mod reset;
mod status;
mod websockets;

pub use agent::{
    agent_restart_command, agent_run_command, agent_start_command, agent_status_command,
    agent_stop_command,
};
pub use config::{config_path_command, config_show_command};
pub use create::create_command;
pub use list::list_command;
pub use remove::remove_command;
pub use reset::reset_command;
pub use status::status_command;
pub use websockets::websockets_command;
