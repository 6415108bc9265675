// Consistent exit codes for the gdslink CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = control server not reachable
//   13 = network error (timeouts, dropped connections)

use std::process;

use crate::client::{server_unavailable_exit_code, ServerError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    ServerDown = 10,
    Network = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        if server_unavailable_exit_code(err).is_some() {
            return Self::ServerDown;
        }

        for cause in err.chain() {
            if let Some(server_err) = cause.downcast_ref::<ServerError>() {
                return Self::from_server_message(&server_err.message);
            }
            if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
                return Self::Network;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused => Self::ServerDown,
                    std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe => Self::Network,
                    _ => Self::Error,
                };
            }
        }

        let msg = format!("{err:#}");
        if msg.contains("timed out") {
            return Self::Network;
        }

        Self::Error
    }

    /// Map a server-side error message to an exit code.
    pub fn from_server_message(message: &str) -> Self {
        if message.starts_with("Unknown method:")
            || message == "path is required"
            || message == "params must be an object"
            || message.starts_with("cellview_index ")
        {
            return Self::Usage;
        }
        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
