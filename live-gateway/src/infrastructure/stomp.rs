//! STOMP 1.2 frame codec
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! Header values are escaped (`\\`, `\n`, `\r`, `\c`) in every frame except
//! CONNECT and CONNECTED. A bare EOL between frames is a heart-beat.

use order_core::Channel;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ControlFrame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StompError {
    #[error("frame truncated")]
    Truncated,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),
    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StompCommand {
    type Error = StompError;
    fn try_from(value: &str) -> Result<Self, StompError> {
        match value {
            "CONNECT" | "STOMP" => Ok(StompCommand::Connect),
            "CONNECTED" => Ok(StompCommand::Connected),
            "SUBSCRIBE" => Ok(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Ok(StompCommand::Unsubscribe),
            "DISCONNECT" => Ok(StompCommand::Disconnect),
            "MESSAGE" => Ok(StompCommand::Message),
            "RECEIPT" => Ok(StompCommand::Receipt),
            "ERROR" => Ok(StompCommand::Error),
            other => Err(StompError::UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        StompFrame {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of `name`; repeated headers keep the first occurrence
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, token: Option<&str>, heartbeat: Duration) -> Self {
        let hb = heartbeat.as_millis();
        let frame = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", format!("{},{}", hb, hb));

        match token {
            Some(token) => frame.header("Authorization", format!("Bearer {}", token)),
            None => frame,
        }
    }

    /// The subscription id is the channel name: one server subscription per
    /// channel per connection.
    pub fn subscribe(channel: &Channel) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .header("id", channel.name())
            .header("destination", channel.destination())
            .header("ack", "auto")
    }

    pub fn unsubscribe(channel: &Channel) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).header("id", channel.name())
    }

    pub fn disconnect() -> Self {
        StompFrame::new(StompCommand::Disconnect)
    }

    /// Server `heart-beat` header as `(sx, sy)` milliseconds
    pub fn heart_beat(&self) -> Option<(u64, u64)> {
        let (sx, sy) = self.get("heart-beat")?.split_once(',')?;
        Some((sx.trim().parse().ok()?, sy.trim().parse().ok()?))
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (key, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(key));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

impl From<&ControlFrame> for StompFrame {
    fn from(frame: &ControlFrame) -> Self {
        match frame {
            ControlFrame::Subscribe(channel) => StompFrame::subscribe(channel),
            ControlFrame::Unsubscribe(channel) => StompFrame::unsubscribe(channel),
        }
    }
}

/// Decode every frame in one transport message. Heart-beats yield no frames.
pub fn decode(input: &str) -> Result<Vec<StompFrame>, StompError> {
    let bytes = input.as_bytes();
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        let (frame, next) = decode_one(input, pos)?;
        frames.push(frame);
        pos = next;
    }

    Ok(frames)
}

fn decode_one(input: &str, start: usize) -> Result<(StompFrame, usize), StompError> {
    let bytes = input.as_bytes();
    let mut pos = start;

    let command = StompCommand::try_from(read_line(input, &mut pos)?)?;
    let escape = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let line = read_line(input, &mut pos)?;
        if line.is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if escape {
            headers.push((unescape_header(key)?, unescape_header(value)?));
        } else {
            headers.push((key.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| StompError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = pos.checked_add(len).ok_or(StompError::Truncated)?;
            if bytes.get(end) != Some(&0) {
                return Err(StompError::Truncated);
            }
            end
        }
        None => {
            pos + bytes[pos..]
                .iter()
                .position(|b| *b == 0)
                .ok_or(StompError::Truncated)?
        }
    };

    let body = input.get(pos..body_end).ok_or(StompError::Truncated)?;
    Ok((
        StompFrame {
            command,
            headers,
            body: body.to_string(),
        },
        body_end + 1,
    ))
}

fn read_line<'a>(input: &'a str, pos: &mut usize) -> Result<&'a str, StompError> {
    let rest = input.get(*pos..).ok_or(StompError::Truncated)?;
    let idx = rest.find('\n').ok_or(StompError::Truncated)?;
    *pos += idx + 1;
    Ok(rest[..idx].strip_suffix('\r').unwrap_or(&rest[..idx]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

/// Negotiated heart-beat intervals `(send_every, expect_every)`
///
/// `client` is what we asked for `(cx, cy)`, `server` what CONNECTED
/// answered `(sx, sy)`. Zero on either side disables that direction.
pub fn negotiate_heartbeat(
    client: (u64, u64),
    server: (u64, u64),
) -> (Option<Duration>, Option<Duration>) {
    let (cx, cy) = client;
    let (sx, sy) = server;
    let send = (cx != 0 && sy != 0).then(|| Duration::from_millis(cx.max(sy)));
    let expect = (cy != 0 && sx != 0).then(|| Duration::from_millis(cy.max(sx)));
    (send, expect)
}
