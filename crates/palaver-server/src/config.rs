//! Command-line configuration. Every flag can also come from a
//! `PALAVER_*` environment variable.

use std::path::PathBuf;

use clap::Parser;
use palaver::prelude::SessionConfig;

#[derive(Debug, Parser)]
#[command(name = "palaver-server", version, about = "Multi-user TCP chat server")]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "PALAVER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// JSON file holding the identity directory. Created on first change.
    /// Without it identities live in memory only.
    #[arg(long, env = "PALAVER_USERS")]
    pub users: Option<PathBuf>,

    /// Login of the `admin` identity seeded at startup.
    #[arg(long, env = "PALAVER_ADMIN_LOGIN", default_value = "admin")]
    pub admin_login: String,

    /// Password for the seeded `admin` identity. Nothing is seeded without it.
    #[arg(long, env = "PALAVER_ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Seconds of inactivity before a regular user is disconnected.
    #[arg(long, env = "PALAVER_IDLE_TIMEOUT_SECS", default_value_t = 1200)]
    pub idle_timeout_secs: u64,

    /// How often, in milliseconds, idle sessions are checked.
    #[arg(long, env = "PALAVER_WATCHDOG_POLL_MS", default_value_t = 10_000)]
    pub watchdog_poll_ms: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "PALAVER_LOG_JSON")]
    pub log_json: bool,
}

impl ServerArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout_secs: self.idle_timeout_secs,
            watchdog_poll_ms: self.watchdog_poll_ms,
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = ServerArgs::try_parse_from(["palaver-server"]).unwrap();

        assert_eq!(args.bind, "0.0.0.0:8080");
        assert!(args.users.is_none());
        assert!(args.admin_password.is_none());
        assert!(!args.log_json);

        let config = args.session_config();
        assert_eq!(config.idle_timeout_secs, 1200);
        assert_eq!(config.watchdog_poll_ms, 10_000);
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = ServerArgs::try_parse_from([
            "palaver-server",
            "--bind",
            "127.0.0.1:9000",
            "--users",
            "users.json",
            "--admin-password",
            "secret",
            "--idle-timeout-secs",
            "60",
            "--log-json",
        ])
        .unwrap();

        assert_eq!(args.bind, "127.0.0.1:9000");
        assert_eq!(args.users, Some(PathBuf::from("users.json")));
        assert_eq!(args.admin_password.as_deref(), Some("secret"));
        assert_eq!(args.session_config().idle_timeout_secs, 60);
        assert!(args.log_json);
    }

    #[test]
    fn test_rejects_non_numeric_timeout() {
        let result = ServerArgs::try_parse_from([
            "palaver-server",
            "--idle-timeout-secs",
            "soon",
        ]);
        assert!(result.is_err());
    }
}
