//! STOMP 1.2 text framing: just enough of the protocol for a pub/sub session
//! carried over WebSocket text messages.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const ACCEPT_VERSIONS: &str = "1.2,1.1,1.0";
pub const VERSION: &str = "1.2";
/// A heart-beat is a bare end-of-line between frames.
pub const HEARTBEAT_EOL: &str = "\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("undefined escape sequence in {0:?}")]
    BadEscape(String),
    #[error("invalid content-length {0:?}")]
    BadContentLength(String),
    #[error("frame is not terminated")]
    Unterminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    // Connection handshakes carry raw header values.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let command = match value {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the earliest one.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        let escape_headers = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape_headers {
                escape_into(name, &mut out);
                out.push(':');
                escape_into(value, &mut out);
            } else {
                out.push_str(name);
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

/// Parses every frame in one transport message. Heart-beat EOLs before,
/// between and after frames are skipped.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, FrameError> {
    let mut frames = Vec::new();
    let mut rest = input;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, tail) = parse_frame(rest)?;
        frames.push(frame);
        rest = tail;
    }
}

fn parse_frame(input: &str) -> Result<(Frame, &str), FrameError> {
    let (command_line, mut rest) = split_line(input).ok_or(FrameError::Unterminated)?;
    let command: Command = command_line.parse()?;

    let mut headers = Vec::new();
    loop {
        let (line, tail) = split_line(rest).ok_or(FrameError::Unterminated)?;
        rest = tail;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| FrameError::BadContentLength(value.clone()))
        })
        .transpose()?;

    let (body, tail) = match content_length {
        Some(length) => {
            let body = rest.get(..length).ok_or(FrameError::Unterminated)?;
            let tail = rest[length..]
                .strip_prefix('\0')
                .ok_or(FrameError::Unterminated)?;
            (body, tail)
        }
        None => {
            let end = rest.find('\0').ok_or(FrameError::Unterminated)?;
            (&rest[..end], &rest[end + 1..])
        }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        tail,
    ))
}

fn split_line(input: &str) -> Option<(&str, &str)> {
    let end = input.find('\n')?;
    let line = &input[..end];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[end + 1..]))
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('c') => ':',
            Some('\\') => '\\',
            _ => return Err(FrameError::BadEscape(raw.to_string())),
        };
        out.push(decoded);
    }
    Ok(out)
}

/// The `heart-beat` header: how often this side can send, and how often it
/// wants to receive, in milliseconds. Zero means "never".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: u32,
    pub incoming: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Negotiated {
    pub send_every: Option<u32>,
    pub expect_every: Option<u32>,
}

impl HeartBeat {
    pub const DISABLED: HeartBeat = HeartBeat {
        outgoing: 0,
        incoming: 0,
    };

    pub fn parse(value: &str) -> Option<Self> {
        let (outgoing, incoming) = value.split_once(',')?;
        Some(Self {
            outgoing: outgoing.trim().parse().ok()?,
            incoming: incoming.trim().parse().ok()?,
        })
    }

    /// Negotiates from the client's point of view, given what the server
    /// announced in CONNECTED.
    pub fn negotiate(self, server: HeartBeat) -> Negotiated {
        let pick = |ours: u32, theirs: u32| {
            if ours == 0 || theirs == 0 {
                None
            } else {
                Some(ours.max(theirs))
            }
        };
        Negotiated {
            send_every: pick(self.outgoing, server.incoming),
            expect_every: pick(self.incoming, server.outgoing),
        }
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing, self.incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frames_escape_headers_and_carry_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/draw")
            .header("note", "a:b\nc")
            .body(r#"{"type":"clear"}"#);
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/draw\nnote:a\\cb\\nc\ncontent-length:16\n\n{\"type\":\"clear\"}\0"
        );
    }

    #[test]
    fn connect_frames_keep_raw_headers() {
        let frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSIONS)
            .header("host", "example.org:8080");
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2,1.1,1.0\nhost:example.org:8080\n\n\0"
        );
    }

    #[test]
    fn parses_frames_between_heartbeats() {
        let first = Frame::new(Command::Message)
            .header("destination", "/topic/pizarra")
            .header("subscription", "sub-0")
            .body("{}");
        let second = Frame::new(Command::Receipt).header("receipt-id", "7");
        let wire = format!("\n\r\n{}\n{}\n\n", first.encode(), second.encode());
        let frames = parse_frames(&wire).expect("parse");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, Command::Message);
        assert_eq!(frames[0].get("subscription"), Some("sub-0"));
        assert_eq!(frames[0].body, "{}");
        assert_eq!(frames[1].get("receipt-id"), Some("7"));
    }

    #[test]
    fn heartbeat_only_messages_hold_no_frames() {
        assert!(parse_frames("\n").expect("parse").is_empty());
        assert!(parse_frames("").expect("parse").is_empty());
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let wire = "MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = parse_frames(wire).expect("parse");
        assert_eq!(frames[0].body, "a\0b");
    }

    #[test]
    fn crlf_lines_and_unescaping() {
        let wire = "MESSAGE\r\nmessage-id:a\\cb\\\\c\r\n\r\nbody\0";
        let frames = parse_frames(wire).expect("parse");
        assert_eq!(frames[0].get("message-id"), Some("a:b\\c"));
        assert_eq!(frames[0].body, "body");
    }

    #[test]
    fn repeated_headers_keep_first_value() {
        let wire = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = parse_frames(wire).expect("parse");
        assert_eq!(frames[0].get("foo"), Some("first"));
    }

    #[test]
    fn rejects_malformed_frames() {
        assert_eq!(
            parse_frames("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand("HELLO".into()))
        );
        assert_eq!(parse_frames("MESSAGE\n\nbody"), Err(FrameError::Unterminated));
        assert_eq!(
            parse_frames("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader("nocolon".into()))
        );
        assert_eq!(
            parse_frames("MESSAGE\nbad:\\t\n\n\0"),
            Err(FrameError::BadEscape("\\t".into()))
        );
        assert_eq!(
            parse_frames("MESSAGE\ncontent-length:x\n\n\0"),
            Err(FrameError::BadContentLength("x".into()))
        );
        assert_eq!(
            parse_frames("MESSAGE\ncontent-length:10\n\nshort\0"),
            Err(FrameError::Unterminated)
        );
    }

    #[test]
    fn heartbeat_header_round_trips() {
        let beat = HeartBeat::parse("10000, 5000").expect("parse");
        assert_eq!(
            beat,
            HeartBeat {
                outgoing: 10000,
                incoming: 5000
            }
        );
        assert_eq!(beat.to_string(), "10000,5000");
        assert_eq!(HeartBeat::parse("10000"), None);
    }

    #[test]
    fn heartbeat_negotiation_takes_the_slower_side() {
        let client = HeartBeat {
            outgoing: 10000,
            incoming: 10000,
        };
        let server = HeartBeat {
            outgoing: 25000,
            incoming: 4000,
        };
        assert_eq!(
            client.negotiate(server),
            Negotiated {
                send_every: Some(10000),
                expect_every: Some(25000),
            }
        );
        assert_eq!(client.negotiate(HeartBeat::DISABLED), Negotiated::default());
    }
}
