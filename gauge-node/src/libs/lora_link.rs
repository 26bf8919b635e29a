//! LoRa AT-command modem serial port operations.

use std::{
    io::{Error as IoError, ErrorKind},
    time::Duration,
};

use chrono::Local;
use log::{debug, error};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    time::{self, Instant},
};
use tokio_serial::SerialStream;

use super::{
    at_cmd::{self, AtCommand, Dispatcher, Feed, Message},
    serial_port::{self, PortOptions},
};

/// Provides functions to talk to the LoRa modem.
///
/// The link owns the reply dispatcher and the buffer of a partially received line, so a line split
/// across two reads (or across a timeout) is never lost.
pub struct LoraLink<T> {
    port: BufReader<T>,
    line: Vec<u8>,
    dispatcher: Dispatcher,
}

impl LoraLink<SerialStream> {
    /// Create a port stream for the modem device.
    pub fn open(opts: &PortOptions) -> Result<Self, IoError> {
        let port = serial_port::open(opts)?;
        Ok(LoraLink::new(port, Dispatcher::default()))
    }
}

impl<T> LoraLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(port: T, dispatcher: Dispatcher) -> Self {
        LoraLink {
            port: BufReader::new(port),
            line: vec![],
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Write one command line.
    pub async fn send(&mut self, cmd: AtCommand, arg: Option<&str>) -> Result<(), IoError> {
        const FN_NAME: &'static str = "LoraLink::send";

        let line = match at_cmd::write_command(cmd, arg) {
            Err(e) => {
                error!("[{}] encode {} error: {}", FN_NAME, cmd.as_str(), e);
                return Err(IoError::new(ErrorKind::InvalidInput, e));
            }
            Ok(line) => line,
        };
        debug!(
            "[{}] write {}",
            FN_NAME,
            String::from_utf8_lossy(line.as_slice()).trim_end()
        );
        self.port.write_all(line.as_slice()).await?;
        self.port.flush().await
    }

    /// Read one line without the terminator.
    ///
    /// Returns `None` on timeout (the partial line is kept for the next call) or when the port
    /// reaches EOF with nothing buffered.
    pub async fn next_line(&mut self, timeout: Duration) -> Result<Option<String>, IoError> {
        self.next_line_before(Instant::now() + timeout).await
    }

    /// Feed reply lines to the dispatcher until `window` elapses or the port reaches EOF.
    ///
    /// Returns the completed reply blocks in arrival order.
    pub async fn collect(&mut self, window: Duration) -> Result<Vec<Message>, IoError> {
        const FN_NAME: &'static str = "LoraLink::collect";

        let deadline = Instant::now() + window;
        let mut messages = vec![];
        loop {
            let line = match self.next_line_before(deadline).await? {
                None => break,
                Some(line) => line,
            };
            if line.is_empty() {
                continue;
            }
            match self.dispatcher.feed(line.as_str(), Local::now().naive_local()) {
                Feed::Collecting => (),
                Feed::Completed(message) => messages.push(message),
                Feed::Dropped(e) => debug!("[{}] {}", FN_NAME, e),
            }
        }
        if !self.dispatcher.is_idle() {
            debug!(
                "[{}] {:?} reply still collecting",
                FN_NAME,
                self.dispatcher.active_kind()
            );
        }
        Ok(messages)
    }

    async fn next_line_before(&mut self, deadline: Instant) -> Result<Option<String>, IoError> {
        // `read_until` keeps already consumed bytes in `self.line` when the timeout cancels it.
        let size = match time::timeout_at(deadline, self.port.read_until(b'\n', &mut self.line))
            .await
        {
            Err(_) => return Ok(None),
            Ok(size) => size?,
        };
        if size == 0 && self.line.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(self.line.as_slice())
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.line.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::io::Builder;

    use super::{super::at_cmd::ReplyKind, *};

    const WINDOW: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn send_writes_command_line() {
        let port = Builder::new().write(b"AT+CMSG=\"0102#####\"\n").build();
        let mut link = LoraLink::new(port, Dispatcher::default());
        link.send(AtCommand::Cmsg, Some("0102#####")).await.unwrap();
    }

    #[tokio::test]
    async fn send_rejects_invalid_argument() {
        let port = Builder::new().build();
        let mut link = LoraLink::new(port, Dispatcher::default());
        let err = link.send(AtCommand::Msg, Some("µ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn lines_split_across_reads() {
        let port = Builder::new()
            .read(b"+CMSG: St")
            .read(b"art\r\n+CMSG: Done\r\ntail")
            .build();
        let mut link = LoraLink::new(port, Dispatcher::default());
        assert_eq!(
            link.next_line(WINDOW).await.unwrap().as_deref(),
            Some("+CMSG: Start")
        );
        assert_eq!(
            link.next_line(WINDOW).await.unwrap().as_deref(),
            Some("+CMSG: Done")
        );
        assert_eq!(link.next_line(WINDOW).await.unwrap().as_deref(), Some("tail"));
        assert_eq!(link.next_line(WINDOW).await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_line_survives_timeout() {
        let (port, mut peer) = tokio::io::duplex(256);
        let mut link = LoraLink::new(port, Dispatcher::default());

        peer.write_all(b"+JOIN: Sta").await.unwrap();
        assert_eq!(
            link.next_line(Duration::from_millis(30)).await.unwrap(),
            None
        );
        peer.write_all(b"rt\n").await.unwrap();
        assert_eq!(
            link.next_line(WINDOW).await.unwrap().as_deref(),
            Some("+JOIN: Start")
        );
    }

    #[tokio::test]
    async fn collect_replies() {
        let port = Builder::new()
            .read(b"\r\n+CMSG: Start\r\n+CMSG: Wait ACK\r\n")
            .read(b"+CMSG: ACK Received\r\n+CMSG: RXWIN2, RSSI -106, SNR 4.0\r\n")
            .read(b"+CMSG: Done\r\n+AT: OK\r\n")
            .build();
        let mut link = LoraLink::new(port, Dispatcher::default());

        let messages = link.collect(WINDOW).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, ReplyKind::Cmsg);
        assert_eq!(messages[0].lines.len(), 5);
        assert!(messages[0].contains("ACK Received"));
        assert_eq!(messages[1].kind, ReplyKind::Status);
        assert!(link.dispatcher().is_idle());
    }

    #[tokio::test]
    async fn collect_unfinished_block_stays_active() {
        let (port, mut peer) = tokio::io::duplex(256);
        let mut link = LoraLink::new(port, Dispatcher::default());

        peer.write_all(b"+JOIN: Start\n+JOIN: NORMAL\n").await.unwrap();
        let messages = link.collect(Duration::from_millis(50)).await.unwrap();
        assert!(messages.is_empty());
        assert_eq!(link.dispatcher().active_kind(), Some(ReplyKind::Join));

        peer.write_all(b"+JOIN: Network joined\n+JOIN: Done\n").await.unwrap();
        let messages = link.collect(Duration::from_millis(50)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].lines.len(), 4);
    }
}
