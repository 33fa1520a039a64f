//! Supervisor session, command dispatch, and the control-endpoint surface.

pub mod channel;
pub mod commands;
pub mod dispatch;
pub mod session;
pub mod status;

pub use channel::{Channel, ChannelWriter};
pub use commands::register_builtins;
pub use dispatch::{forward_command, CommandHandler, CommandStreams, DispatchTable};
pub use session::{CommandRequest, SupervisorContext, SupervisorSession};
pub use status::render_status;
