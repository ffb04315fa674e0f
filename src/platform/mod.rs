// Platform-specific code module

pub mod command;
pub mod elevation;
pub mod macos;

pub use command::{run_command, CommandOutput, CommandRunner, SystemCommandRunner};
pub use elevation::{is_elevated, is_user_cancelled, privileged_command};
pub use macos::SystemPermissionProbe;
