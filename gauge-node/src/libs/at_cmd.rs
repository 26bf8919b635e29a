//! AT commands of the LoRa modem and the dispatcher of their multi-line replies.
//!
//! The modem answers a command with a block of lines such as:
//!
//! ```text
//! +CMSG: Start
//! +CMSG: Wait ACK
//! +CMSG: ACK Received
//! +CMSG: Done
//! ```
//!
//! [`Dispatcher`] recognizes the block by the start and end markers of the registered handlers.
//! Only one handler collects at a time so that blocks of different commands never share a buffer.

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use super::error::{CommandError, DispatchMismatch};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AtCommand {
    /// Status check.
    At,
    /// Unconfirmed message.
    Msg,
    /// Confirmed message, acknowledged later.
    Cmsg,
    /// Join network, acknowledged later.
    Join,
}

/// Reply block types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Status,
    Msg,
    Cmsg,
    Join,
}

/// Markers of a reply block. A line starts (ends) the block when it begins with `start` (`end`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyFormat {
    pub start: String,
    pub end: String,
    pub kind: ReplyKind,
}

/// A completed reply block.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: ReplyKind,
    pub lines: Vec<String>,
    pub captured_at: NaiveDateTime,
}

/// A reply format and the function that processes its completed blocks.
#[derive(Clone)]
pub struct ReplyHandler {
    pub format: ReplyFormat,
    pub process: fn(&Message),
}

/// Result of feeding one line.
#[derive(Clone, Debug, PartialEq)]
pub enum Feed {
    /// The line was buffered by the active handler.
    Collecting,
    /// The line closed the block.
    Completed(Message),
    /// No handler was active and no start marker matched.
    Dropped(DispatchMismatch),
}

/// Reply collector with at most one active handler.
pub struct Dispatcher {
    handlers: Vec<ReplyHandler>,
    active: Option<usize>,
    buffer: Vec<String>,
}

impl AtCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtCommand::At => "AT",
            AtCommand::Msg => "AT+MSG",
            AtCommand::Cmsg => "AT+CMSG",
            AtCommand::Join => "AT+JOIN",
        }
    }
}

/// Encode a command line: `AT+<CMD>` or `AT+<CMD>="<argument>"`, terminated by `\n`.
pub fn write_command(cmd: AtCommand, arg: Option<&str>) -> Result<Vec<u8>, CommandError> {
    let mut line = cmd.as_str().to_string();
    if let Some(arg) = arg {
        if !arg.is_ascii() {
            return Err(CommandError::NonAscii(arg.to_string()));
        } else if arg.contains(['"', '\r', '\n']) {
            return Err(CommandError::Unquotable(arg.to_string()));
        }
        line.push_str("=\"");
        line.push_str(arg);
        line.push('"');
    }
    line.push('\n');
    Ok(line.into_bytes())
}

impl ReplyFormat {
    pub fn new(start: &str, end: &str, kind: ReplyKind) -> Self {
        ReplyFormat {
            start: start.to_string(),
            end: end.to_string(),
            kind,
        }
    }
}

impl Message {
    /// Whether any line contains the pattern.
    pub fn contains(&self, pattern: &str) -> bool {
        self.lines.iter().any(|line| line.contains(pattern))
    }
}

impl Dispatcher {
    pub fn new(handlers: Vec<ReplyHandler>) -> Self {
        Dispatcher {
            handlers,
            active: None,
            buffer: vec![],
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// The kind of the collecting handler.
    pub fn active_kind(&self) -> Option<ReplyKind> {
        self.active.map(|i| self.handlers[i].format.kind)
    }

    /// Feed one line (without line terminator).
    ///
    /// A completed block is passed to the handler's `process` before it is returned.
    pub fn feed(&mut self, line: &str, now: NaiveDateTime) -> Feed {
        let index = match self.active {
            Some(index) => index,
            None => {
                let found = self
                    .handlers
                    .iter()
                    .position(|h| line.starts_with(h.format.start.as_str()));
                match found {
                    None => return Feed::Dropped(DispatchMismatch(line.to_string())),
                    Some(index) => {
                        self.active = Some(index);
                        index
                    }
                }
            }
        };
        self.buffer.push(line.to_string());

        let handler = &self.handlers[index];
        if !line.starts_with(handler.format.end.as_str()) {
            return Feed::Collecting;
        }
        let message = Message {
            kind: handler.format.kind,
            lines: std::mem::take(&mut self.buffer),
            captured_at: now,
        };
        self.active = None;
        (handler.process)(&message);
        Feed::Completed(message)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new(default_handlers())
    }
}

/// Handlers of the modem replies used by the node.
pub fn default_handlers() -> Vec<ReplyHandler> {
    vec![
        ReplyHandler {
            format: ReplyFormat::new("+JOIN: Start", "+JOIN: Done", ReplyKind::Join),
            process: process_join,
        },
        ReplyHandler {
            format: ReplyFormat::new("+CMSG: Start", "+CMSG: Done", ReplyKind::Cmsg),
            process: process_cmsg,
        },
        ReplyHandler {
            format: ReplyFormat::new("+MSG: Start", "+MSG: Done", ReplyKind::Msg),
            process: process_msg,
        },
        ReplyHandler {
            format: ReplyFormat::new("+AT: OK", "+AT: OK", ReplyKind::Status),
            process: process_status,
        },
    ]
}

fn process_join(message: &Message) {
    const FN_NAME: &'static str = "process_join";

    if message.contains("Network joined") || message.contains("Joined already") {
        info!("[{}] network joined", FN_NAME);
    } else {
        warn!("[{}] join failed: {:?}", FN_NAME, message.lines);
    }
}

fn process_cmsg(message: &Message) {
    const FN_NAME: &'static str = "process_cmsg";

    if message.contains("ACK Received") {
        info!("[{}] ACK received", FN_NAME);
    } else {
        warn!("[{}] no ACK: {:?}", FN_NAME, message.lines);
    }
}

fn process_msg(message: &Message) {
    const FN_NAME: &'static str = "process_msg";

    info!("[{}] sent: {:?}", FN_NAME, message.lines);
}

fn process_status(message: &Message) {
    const FN_NAME: &'static str = "process_status";

    debug!("[{}] {:?}", FN_NAME, message.lines);
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 22)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
    }

    fn noop(_: &Message) {}

    fn feed_all(dispatcher: &mut Dispatcher, lines: &[&str]) -> Vec<Message> {
        let mut messages = vec![];
        for line in lines {
            if let Feed::Completed(message) = dispatcher.feed(line, now()) {
                messages.push(message);
            }
        }
        messages
    }

    #[test]
    fn encode_commands() {
        assert_eq!(write_command(AtCommand::At, None).unwrap(), b"AT\n");
        assert_eq!(write_command(AtCommand::Join, None).unwrap(), b"AT+JOIN\n");
        assert_eq!(
            write_command(AtCommand::Cmsg, Some("1230#####")).unwrap(),
            b"AT+CMSG=\"1230#####\"\n"
        );
        assert_eq!(
            write_command(AtCommand::Msg, Some("")).unwrap(),
            b"AT+MSG=\"\"\n"
        );
    }

    #[test]
    fn encode_rejects_bad_arguments() {
        assert_eq!(
            write_command(AtCommand::Msg, Some("12°")),
            Err(CommandError::NonAscii("12°".to_string()))
        );
        assert!(matches!(
            write_command(AtCommand::Msg, Some("a\"b")),
            Err(CommandError::Unquotable(_))
        ));
        assert!(matches!(
            write_command(AtCommand::Msg, Some("a\nAT+JOIN")),
            Err(CommandError::Unquotable(_))
        ));
    }

    #[test]
    fn collect_one_block() {
        let mut dispatcher = Dispatcher::default();
        assert!(dispatcher.is_idle());

        assert_eq!(dispatcher.feed("+CMSG: Start", now()), Feed::Collecting);
        assert_eq!(dispatcher.active_kind(), Some(ReplyKind::Cmsg));
        assert_eq!(dispatcher.feed("+CMSG: Wait ACK", now()), Feed::Collecting);
        assert_eq!(dispatcher.feed("+CMSG: ACK Received", now()), Feed::Collecting);
        let message = match dispatcher.feed("+CMSG: Done", now()) {
            Feed::Completed(message) => message,
            other => panic!("unexpected {:?}", other),
        };
        assert!(dispatcher.is_idle());
        assert_eq!(message.kind, ReplyKind::Cmsg);
        assert_eq!(message.captured_at, now());
        assert_eq!(
            message.lines,
            vec![
                "+CMSG: Start",
                "+CMSG: Wait ACK",
                "+CMSG: ACK Received",
                "+CMSG: Done"
            ]
        );
        assert!(message.contains("ACK Received"));
    }

    #[test]
    fn idle_lines_without_start_are_dropped() {
        let mut dispatcher = Dispatcher::default();
        assert_eq!(
            dispatcher.feed("+CMSG: Done", now()),
            Feed::Dropped(DispatchMismatch("+CMSG: Done".to_string()))
        );
        assert!(matches!(dispatcher.feed("garbage", now()), Feed::Dropped(_)));
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn single_line_block() {
        let mut dispatcher = Dispatcher::default();
        match dispatcher.feed("+AT: OK", now()) {
            Feed::Completed(message) => {
                assert_eq!(message.kind, ReplyKind::Status);
                assert_eq!(message.lines, vec!["+AT: OK"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn active_handler_keeps_foreign_start_lines() {
        let mut dispatcher = Dispatcher::default();
        let messages = feed_all(
            &mut dispatcher,
            &[
                "+JOIN: Start",
                "+CMSG: Start",
                "+JOIN: Network joined",
                "+JOIN: Done",
                "+CMSG: Done",
            ],
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, ReplyKind::Join);
        assert_eq!(messages[0].lines.len(), 4);
        assert!(dispatcher.is_idle());
    }

    #[test]
    fn registration_order_wins() {
        let mut dispatcher = Dispatcher::new(vec![
            ReplyHandler {
                format: ReplyFormat::new("+A", "+A: END", ReplyKind::Msg),
                process: noop,
            },
            ReplyHandler {
                format: ReplyFormat::new("+A: X", "+A: X END", ReplyKind::Cmsg),
                process: noop,
            },
        ]);
        dispatcher.feed("+A: X begin", now());
        assert_eq!(dispatcher.active_kind(), Some(ReplyKind::Msg));
    }

    #[test]
    fn process_is_called_on_completion() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn count(message: &Message) {
            assert_eq!(message.lines.last().map(String::as_str), Some("<< end"));
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let mut dispatcher = Dispatcher::new(vec![ReplyHandler {
            format: ReplyFormat::new(">> begin", "<< end", ReplyKind::Msg),
            process: count,
        }]);
        feed_all(&mut dispatcher, &[">> begin", "body", "<< end", "<< end"]);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blocks_of_two_protocols_never_mix() {
        // Each block runs start..end before the next begins, in any order of the two protocols.
        let join = ["+JOIN: Start", "+JOIN: NORMAL", "+JOIN: Network joined", "+JOIN: Done"];
        let cmsg = ["+CMSG: Start", "+CMSG: Wait ACK", "+CMSG: Done"];
        let orders: [&[&[&str]]; 4] = [
            &[&join, &cmsg],
            &[&cmsg, &join],
            &[&cmsg, &cmsg, &join, &cmsg],
            &[&join, &join, &cmsg],
        ];

        for order in orders {
            let mut dispatcher = Dispatcher::default();
            let mut lines = vec!["noise"];
            for block in order {
                lines.extend_from_slice(block);
                lines.push("+LOG: idle noise");
            }
            let messages = feed_all(&mut dispatcher, lines.as_slice());
            assert_eq!(messages.len(), order.len());
            for (message, block) in messages.iter().zip(order.iter()) {
                assert_eq!(message.lines, block.to_vec());
                let prefix = match message.kind {
                    ReplyKind::Join => "+JOIN:",
                    ReplyKind::Cmsg => "+CMSG:",
                    _ => panic!("unexpected kind"),
                };
                assert!(message.lines.iter().all(|l| l.starts_with(prefix)));
            }
        }
    }
}
