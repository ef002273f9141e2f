use std::str::FromStr;
use std::sync::Arc;

use nodewatch_application::ports::ControlSurface;
use nodewatch_domain::ProtocolTag;

use crate::format;

/// One parsed operator command, per spec.md §6's CLI / control surface
/// grammar: `status`, `workers`, `pause`, `resume`, `reload`, `test <spec>
/// <protocol>`, `info <address>`, `set debug on|off`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Workers,
    Pause,
    Resume,
    Reload(Option<String>),
    Test {
        spec: String,
        protocol: Option<ProtocolTag>,
    },
    Info(String),
    SetDebug(bool),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: test <spec> [protocol]")]
    TestUsage,
    #[error("usage: info <address>")]
    InfoUsage,
    #[error("usage: set debug on|off")]
    SetDebugUsage,
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or(ParseError::Empty)?;

    match verb.to_ascii_lowercase().as_str() {
        "status" => Ok(Command::Status),
        "workers" => Ok(Command::Workers),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "reload" => Ok(Command::Reload(parts.next().map(str::to_string))),
        "test" => {
            let spec = parts.next().ok_or(ParseError::TestUsage)?.to_string();
            let protocol = parts.next().and_then(|s| ProtocolTag::from_str(s).ok());
            Ok(Command::Test { spec, protocol })
        }
        "info" => {
            let address = parts.next().ok_or(ParseError::InfoUsage)?.to_string();
            Ok(Command::Info(address))
        }
        "set" => {
            let target = parts.next().ok_or(ParseError::SetDebugUsage)?;
            if !target.eq_ignore_ascii_case("debug") {
                return Err(ParseError::SetDebugUsage);
            }
            let value = parts.next().ok_or(ParseError::SetDebugUsage)?;
            match value {
                "on" => Ok(Command::SetDebug(true)),
                "off" => Ok(Command::SetDebug(false)),
                _ => Err(ParseError::SetDebugUsage),
            }
        }
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// Runs `command` against the façade and renders the response line(s).
pub async fn dispatch(surface: &Arc<dyn ControlSurface>, command: Command) -> String {
    match command {
        Command::Status => format::status(&surface.get_status().await),
        Command::Workers => format::workers(&surface.get_worker_status().await),
        Command::Pause => match surface.pause().await {
            Ok(()) => format::ok(),
            Err(err) => format::err(&err),
        },
        Command::Resume => match surface.resume().await {
            Ok(()) => format::ok(),
            Err(err) => format::err(&err),
        },
        Command::Reload(path) => match surface.reload_config(path.as_deref()).await {
            Ok(()) => format::ok(),
            Err(err) => format::err(&err),
        },
        Command::Test { spec, protocol } => {
            match surface.test_single_node(&spec, protocol).await {
                Ok(result) => format::aggregated_result(&result),
                Err(err) => format::err(&err),
            }
        }
        Command::Info(address) => match surface.get_node_info(&address).await {
            Ok(info) => format::node_info(&info),
            Err(err) => format::err(&err),
        },
        Command::SetDebug(enabled) => {
            surface.set_debug_mode(enabled).await;
            format::ok()
        }
    }
}

pub fn parse_error_response(error: &ParseError) -> String {
    format!("ERR {error}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse("status").unwrap(), Command::Status);
        assert_eq!(parse("  workers  ").unwrap(), Command::Workers);
        assert_eq!(parse("pause").unwrap(), Command::Pause);
        assert_eq!(parse("resume").unwrap(), Command::Resume);
    }

    #[test]
    fn parses_reload_with_optional_path() {
        assert_eq!(parse("reload").unwrap(), Command::Reload(None));
        assert_eq!(
            parse("reload /etc/nodewatch.toml").unwrap(),
            Command::Reload(Some("/etc/nodewatch.toml".to_string()))
        );
    }

    #[test]
    fn parses_test_with_and_without_protocol() {
        assert_eq!(
            parse("test 2:5001/100").unwrap(),
            Command::Test {
                spec: "2:5001/100".to_string(),
                protocol: None,
            }
        );
        assert_eq!(
            parse("test 2:5001/100 IBN").unwrap(),
            Command::Test {
                spec: "2:5001/100".to_string(),
                protocol: Some(ProtocolTag::Ibn),
            }
        );
    }

    #[test]
    fn parses_set_debug() {
        assert_eq!(parse("set debug on").unwrap(), Command::SetDebug(true));
        assert_eq!(parse("set debug off").unwrap(), Command::SetDebug(false));
        assert!(parse("set debug maybe").is_err());
        assert!(parse("set volume up").is_err());
    }

    #[test]
    fn rejects_unknown_and_empty() {
        assert!(matches!(parse(""), Err(ParseError::Empty)));
        assert!(matches!(parse("frobnicate"), Err(ParseError::Unknown(_))));
    }
}
