//! Line-oriented operator console over stdin/stdout.
//!
//! Each input line is one command; each result is written back as one line of
//! JSON. Parsing is kept separate from execution so it can be tested alone.

use std::io::{BufRead, Write};

use serde_json::{json, Value};

use crate::commands::{netload, policy, processes, AppState};
use crate::config;
use crate::error::AppError;

const HELP: &str = "\
policy start [allow=a.exe,b.exe] [block=c.exe] [interval=SECS]
policy stop | policy status
netload start HOST [interval=SECS]
netload stop | netload data
ping HOST
ps [q=TEXT] [sort=pid|name|cmd] [order=asc|desc]
kill PID
start EXE [ARGS..]
help | quit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    PolicyStart {
        /// Newline-separated names.
        allowed: String,
        blocked: String,
        interval_secs: f64,
    },
    PolicyStop,
    PolicyStatus,
    NetloadStart {
        host: String,
        interval_secs: f64,
    },
    NetloadStop,
    NetloadData,
    Ping {
        host: String,
    },
    Ps {
        query: String,
        sort: String,
        order: String,
    },
    Kill {
        pid: u32,
    },
    Start {
        exe: String,
        args: Vec<String>,
    },
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, AppError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, rest)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (head.to_lowercase().as_str(), rest) {
        ("policy", ["start", opts @ ..]) => {
            let mut allowed = String::new();
            let mut blocked = String::new();
            let mut interval_secs = config::DEFAULT_POLICY_INTERVAL_SECS;
            for (key, value) in options(opts)? {
                match key {
                    "allow" => allowed = comma_list(value),
                    "block" => blocked = comma_list(value),
                    "interval" => interval_secs = parse_secs(value)?,
                    other => return Err(unknown_option(other)),
                }
            }
            ConsoleCommand::PolicyStart {
                allowed,
                blocked,
                interval_secs,
            }
        }
        ("policy", ["stop"]) => ConsoleCommand::PolicyStop,
        ("policy", ["status"]) | ("policy", []) => ConsoleCommand::PolicyStatus,
        ("netload", ["start", host, opts @ ..]) => {
            let mut interval_secs = config::DEFAULT_NETLOAD_INTERVAL_SECS;
            for (key, value) in options(opts)? {
                match key {
                    "interval" => interval_secs = parse_secs(value)?,
                    other => return Err(unknown_option(other)),
                }
            }
            ConsoleCommand::NetloadStart {
                host: (*host).to_string(),
                interval_secs,
            }
        }
        ("netload", ["stop"]) => ConsoleCommand::NetloadStop,
        ("netload", ["data"]) | ("netload", []) => ConsoleCommand::NetloadData,
        ("ping", [host]) => ConsoleCommand::Ping {
            host: (*host).to_string(),
        },
        ("ps", opts) => {
            let mut query = String::new();
            let mut sort = "pid".to_string();
            let mut order = "asc".to_string();
            for (key, value) in options(opts)? {
                match key {
                    "q" => query = value.to_string(),
                    "sort" => sort = value.to_string(),
                    "order" => order = value.to_string(),
                    other => return Err(unknown_option(other)),
                }
            }
            ConsoleCommand::Ps { query, sort, order }
        }
        ("kill", [pid]) => ConsoleCommand::Kill {
            pid: pid
                .parse()
                .map_err(|_| AppError::InvalidInput(format!("'{pid}' is not a process id")))?,
        },
        ("start", [exe, args @ ..]) => ConsoleCommand::Start {
            exe: (*exe).to_string(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
        },
        ("help", _) => ConsoleCommand::Help,
        ("quit", _) | ("exit", _) => ConsoleCommand::Quit,
        _ => {
            return Err(AppError::InvalidInput(format!(
                "unrecognized command '{}', try 'help'",
                line.trim()
            )))
        }
    };
    Ok(Some(command))
}

fn options<'a>(words: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>, AppError> {
    words
        .iter()
        .map(|word| {
            word.split_once('=')
                .ok_or_else(|| AppError::InvalidInput(format!("expected key=value, got '{word}'")))
        })
        .collect()
}

fn comma_list(value: &str) -> String {
    value.split(',').collect::<Vec<_>>().join("\n")
}

fn parse_secs(value: &str) -> Result<f64, AppError> {
    value
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("'{value}' is not a number of seconds")))
}

fn unknown_option(key: &str) -> AppError {
    AppError::InvalidInput(format!("unknown option '{key}'"))
}

/// Run one command against `state`, producing its JSON result.
pub fn execute(state: &AppState, command: ConsoleCommand) -> Result<Value, AppError> {
    let to_json = |value: serde_json::Result<Value>| {
        value.map_err(|e| AppError::Io(format!("failed to encode result: {e}")))
    };
    match command {
        ConsoleCommand::PolicyStart {
            allowed,
            blocked,
            interval_secs,
        } => {
            let status = policy::start_policy(state, &allowed, &blocked, interval_secs)?;
            to_json(serde_json::to_value(status))
        }
        ConsoleCommand::PolicyStop => Ok(json!({ "stopped": policy::stop_policy(state) })),
        ConsoleCommand::PolicyStatus => to_json(serde_json::to_value(policy::policy_status(state))),
        ConsoleCommand::NetloadStart {
            host,
            interval_secs,
        } => {
            netload::start_netload(state, &host, interval_secs)?;
            Ok(json!({ "started": host }))
        }
        ConsoleCommand::NetloadStop => Ok(json!({ "stopped": netload::stop_netload(state) })),
        ConsoleCommand::NetloadData => to_json(serde_json::to_value(netload::netload_data(state))),
        ConsoleCommand::Ping { host } => {
            let latency_ms = netload::ping_once(state, &host)?;
            Ok(json!({ "host": host, "latency_ms": latency_ms }))
        }
        ConsoleCommand::Ps { query, sort, order } => to_json(serde_json::to_value(
            processes::list_processes(state, &query, &sort, &order)?,
        )),
        ConsoleCommand::Kill { pid } => {
            processes::kill_process(state, pid)?;
            Ok(json!({ "killed": pid }))
        }
        ConsoleCommand::Start { exe, args } => {
            let pid = processes::start_process(state, &exe, &args)?;
            Ok(json!({ "started": exe, "pid": pid }))
        }
        ConsoleCommand::Help => Ok(Value::String(HELP.to_string())),
        ConsoleCommand::Quit => Ok(Value::Null),
    }
}

/// Read commands from `input` until EOF or `quit`, writing one JSON line per
/// command to `output`. Command failures are reported inline; only I/O on
/// the console streams ends the loop with an error.
pub fn run_console(state: &AppState, input: impl BufRead, mut output: impl Write) -> Result<(), AppError> {
    for line in input.lines() {
        let line = line?;
        let reply = match parse_command(&line) {
            Ok(None) => continue,
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => execute(state, command),
            Err(e) => Err(e),
        };
        let rendered = match reply {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("console command failed: {e}");
                json!({ "error": e })
            }
        };
        writeln!(output, "{rendered}")?;
        output.flush()?;
    }
    Ok(())
}
