pub mod args;
pub mod commands;

use simple_stomp::Error;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Network/connection error (e.g., host unreachable, connection refused)
    pub const NETWORK_ERROR: u8 = 1;
    /// Authentication error (e.g., invalid credentials)
    pub const AUTH_ERROR: u8 = 2;
    /// Protocol error (e.g., unexpected server response)
    pub const PROTOCOL_ERROR: u8 = 3;
    /// Missing or invalid connection parameters
    pub const CONFIG_ERROR: u8 = 4;
    /// Received messages could not be written out (e.g., closed stdout)
    pub const OUTPUT_ERROR: u8 = 5;
}

/// Turn a client error into a user-facing message and exit code.
pub fn describe_error(err: &Error, address: &str) -> (String, u8) {
    match err {
        Error::Config(e) => (
            format!("Invalid {}: {}", e.field(), e),
            exit_codes::CONFIG_ERROR,
        ),
        Error::Transport(io_err) => {
            let message = match io_err.kind() {
                std::io::ErrorKind::ConnectionRefused => format!("Connection refused: {}", address),
                _ => format!("Connection failed: {}", io_err),
            };
            (message, exit_codes::NETWORK_ERROR)
        }
        Error::DialTimeout { .. } => (
            format!("Connection timed out: {}", address),
            exit_codes::NETWORK_ERROR,
        ),
        Error::Auth(server_err) => (
            format!("Authentication failed: {}", server_err),
            exit_codes::AUTH_ERROR,
        ),
        Error::Handler(inner) => (
            format!("Cannot print message: {}", inner),
            exit_codes::OUTPUT_ERROR,
        ),
        other => (format!("Error: {}", other), exit_codes::PROTOCOL_ERROR),
    }
}
