//! Job callbacks that can be declared from the config file.

mod shell_command;

pub use shell_command::shell_command_job;
