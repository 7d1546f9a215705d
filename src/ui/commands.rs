use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}'. Type 'help' for a list.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Publish topic cannot be empty.")]
    EmptyPublishTopic,

    #[error("Invalid QoS '{0}'. Use 0, 1 or 2.")]
    InvalidQos(String),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Invalid port '{0}'")]
    InvalidPort(String),
}

/// One console instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        host: Option<String>,
        port: Option<u32>,
    },
    Disconnect,
    Subscribe {
        filter: String,
        qos: u8,
    },
    Unsubscribe {
        filter: String,
    },
    Publish {
        topic: String,
        payload: String,
        qos: u8,
        retain: bool,
    },
    /// `None` clears the filter
    Filter(Option<String>),
    Clear,
    List(Option<usize>),
    Show(usize),
    Export(PathBuf),
    Log(bool),
    Follow(bool),
    Subscriptions,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  connect [host[:port]]              connect (defaults from settings)
  disconnect                         close the session
  sub <filter> [qos]                 subscribe, qos 0..2 (default 0)
  unsub <filter>                     unsubscribe
  pub [-q <qos>] [-r] <topic> [msg]  publish a message
  filter [text]                      show only matching messages, no text clears
  clear                              drop all stored messages
  list [n]                           print the last n visible messages (default 20)
  show <row>                         print one visible message in full
  export <path>                      write visible messages as CSV
  log on|off                         toggle the message log file
  follow on|off                      print messages as they arrive
  subs                               list subscriptions
  status                             connection and store summary
  help                               this text
  quit                               exit";

impl Command {
    /// Parses one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = split_word(line);

        let command = match word.to_lowercase().as_str() {
            "connect" | "c" => parse_connect(rest)?,
            "disconnect" | "dc" => Command::Disconnect,
            "sub" | "subscribe" => {
                let (filter, rest) = split_word(rest);
                if filter.is_empty() {
                    return Err(CommandError::Usage("sub <filter> [qos]"));
                }
                let qos = match split_word(rest).0 {
                    "" => 0,
                    level => parse_qos(level)?,
                };
                Command::Subscribe {
                    filter: filter.to_string(),
                    qos,
                }
            }
            "unsub" | "unsubscribe" => {
                let (filter, _) = split_word(rest);
                if filter.is_empty() {
                    return Err(CommandError::Usage("unsub <filter>"));
                }
                Command::Unsubscribe {
                    filter: filter.to_string(),
                }
            }
            "pub" | "publish" => parse_publish(rest)?,
            "filter" | "f" => {
                if rest.is_empty() {
                    Command::Filter(None)
                } else {
                    Command::Filter(Some(rest.to_string()))
                }
            }
            "clear" => Command::Clear,
            "list" | "ls" => match split_word(rest).0 {
                "" => Command::List(None),
                n => Command::List(Some(parse_number(n)?)),
            },
            "show" => match split_word(rest).0 {
                "" => return Err(CommandError::Usage("show <row>")),
                n => Command::Show(parse_number(n)?),
            },
            "export" => {
                if rest.is_empty() {
                    return Err(CommandError::Usage("export <path>"));
                }
                Command::Export(PathBuf::from(rest))
            }
            "log" => Command::Log(parse_switch(rest, "log on|off")?),
            "follow" => Command::Follow(parse_switch(rest, "follow on|off")?),
            "subs" => Command::Subscriptions,
            "status" | "st" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_connect(rest: &str) -> Result<Command, CommandError> {
    let (target, _) = split_word(rest);
    if target.is_empty() {
        return Ok(Command::Connect {
            host: None,
            port: None,
        });
    }
    match target.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u32>()
                .map_err(|_| CommandError::InvalidPort(port.to_string()))?;
            Ok(Command::Connect {
                host: Some(host.to_string()).filter(|h| !h.is_empty()),
                port: Some(port),
            })
        }
        None => Ok(Command::Connect {
            host: Some(target.to_string()),
            port: None,
        }),
    }
}

fn parse_publish(mut rest: &str) -> Result<Command, CommandError> {
    let mut qos = 0;
    let mut retain = false;

    loop {
        let (word, tail) = split_word(rest);
        match word {
            "-r" => {
                retain = true;
                rest = tail;
            }
            "-q" => {
                let (level, tail) = split_word(tail);
                if level.is_empty() {
                    return Err(CommandError::Usage("pub [-q <qos>] [-r] <topic> [payload]"));
                }
                qos = parse_qos(level)?;
                rest = tail;
            }
            _ => break,
        }
    }

    let (topic, payload) = split_word(rest);
    if topic.is_empty() {
        return Err(CommandError::EmptyPublishTopic);
    }
    Ok(Command::Publish {
        topic: topic.to_string(),
        payload: payload.to_string(),
        qos,
        retain,
    })
}

fn parse_qos(text: &str) -> Result<u8, CommandError> {
    match text.parse::<u8>() {
        Ok(level) if level <= 2 => Ok(level),
        _ => Err(CommandError::InvalidQos(text.to_string())),
    }
}

fn parse_number(text: &str) -> Result<usize, CommandError> {
    text.parse()
        .map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

fn parse_switch(text: &str, usage: &'static str) -> Result<bool, CommandError> {
    match text.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(CommandError::Usage(usage)),
    }
}

/// First whitespace-delimited word and the trimmed remainder.
fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim()),
        None => (text, ""),
    }
}
