//! Provide the request/reply channel to the mount.
//!
//! A single background task owns the byte stream and handles one command
//! at a time, so concurrent callers queue on the command channel and
//! sends/reads from different callers never interleave.

use std::{io, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex},
    task,
    time::{self, Instant},
};

use crate::{
    error::{ObservatoryError, ObservatoryResult, TimeoutKind},
    mount_cmd::{Command, Framing, TERMINATOR},
};

/// Lower bound of the idle window used for unterminated replies.
pub const UNTERMINATED_IDLE_MIN: Duration = Duration::from_millis(200);

/// Bytes read for a single-char reply, tolerating stray extras.
const SINGLE_CHAR_READ_BYTES: usize = 4;

const READ_CHUNK_BYTES: usize = 4096;

const CMD_CHANNEL_SIZE: usize = 32;

type ReplySender = oneshot::Sender<ObservatoryResult<String>>;
type ChannelRequest = (Command, Duration, ReplySender);

/// Where the mount lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MountConnection {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl MountConnection {
    pub fn new(host: &str, port: u16, timeout: Duration) -> MountConnection {
        MountConnection {
            host: host.to_owned(),
            port,
            timeout,
        }
    }
}

#[derive(Debug)]
struct ChannelHandle {
    cmd_channel: mpsc::Sender<ChannelRequest>,
    cmd_task: task::JoinHandle<()>,
}

#[derive(Debug)]
pub struct CommandChannel {
    connection: MountConnection,
    handle: Mutex<Option<ChannelHandle>>,
}

impl CommandChannel {
    pub fn new(connection: MountConnection) -> CommandChannel {
        CommandChannel {
            connection,
            handle: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &MountConnection {
        &self.connection
    }

    /// Open the TCP stream, replacing (and closing) any previous one.
    pub async fn connect(&self) -> ObservatoryResult<()> {
        self.close().await;

        let address = format!("{}:{}", self.connection.host, self.connection.port);
        log::info!("Connecting to mount at {address}.");

        let stream = match time::timeout(self.connection.timeout, TcpStream::connect(&address)).await
        {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(ObservatoryError::Transport(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out connecting to {address}"),
                )))
            }
        };
        stream.set_nodelay(true)?;

        self.attach_stream(stream).await;
        Ok(())
    }

    /// Hand an already open stream to the channel.
    pub async fn attach_stream<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.close().await;

        let (cmd_channel, cmd_receiver) = mpsc::channel(CMD_CHANNEL_SIZE);
        let cmd_task = task::spawn(serve_commands(stream, cmd_receiver));

        *self.handle.lock().await = Some(ChannelHandle {
            cmd_channel,
            cmd_task,
        });
    }

    /// Close the stream. In-flight and queued commands finish first.
    pub async fn close(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(ChannelHandle {
            cmd_channel,
            cmd_task,
        }) = handle
        {
            drop(cmd_channel);
            if let Err(error) = cmd_task.await {
                log::error!("Command task ended abnormally: {error:?}");
            }
            log::info!("Mount connection closed.");
        }
    }

    pub async fn is_connected(&self) -> bool {
        match self.handle.lock().await.as_ref() {
            Some(handle) => !handle.cmd_task.is_finished(),
            None => false,
        }
    }

    /// Handle to the open connection that can outlive the borrow of `self`.
    ///
    /// While a sender is alive, `close` waits for its commands.
    pub async fn sender(&self) -> ObservatoryResult<CommandSender> {
        self.handle
            .lock()
            .await
            .as_ref()
            .map(|handle| CommandSender {
                cmd_channel: handle.cmd_channel.clone(),
                timeout: self.connection.timeout,
            })
            .ok_or(ObservatoryError::NotConnected)
    }

    /// Send one command and wait for its reply.
    ///
    /// `timeout` overrides the connection timeout for this command only.
    pub async fn send(
        &self,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ObservatoryResult<String> {
        self.sender().await?.send(command, timeout).await
    }
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    cmd_channel: mpsc::Sender<ChannelRequest>,
    timeout: Duration,
}

impl CommandSender {
    pub async fn send(
        &self,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ObservatoryResult<String> {
        let (reply_sender, reply_receiver) = oneshot::channel();
        let timeout = timeout.unwrap_or(self.timeout);

        self.cmd_channel
            .send((command.clone(), timeout, reply_sender))
            .await
            .map_err(|_| ObservatoryError::NotConnected)?;

        reply_receiver
            .await
            .map_err(|_| ObservatoryError::NotConnected)?
    }
}

async fn serve_commands<S>(mut stream: S, mut cmd_receiver: mpsc::Receiver<ChannelRequest>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some((command, timeout, reply_sender)) = cmd_receiver.recv().await {
        let reply = exchange(&mut stream, &command, timeout).await;
        match &reply {
            Ok(text) => log::debug!("{} -> {text:?}", command.mnemonic),
            Err(error) => log::warn!("{} failed: {error}", command.mnemonic),
        }
        if reply_sender.send(reply).is_err() {
            log::debug!("Caller for {} went away before the reply.", command.mnemonic);
        }
    }
    log::debug!("Command channel drained, closing stream.");
}

/// Write one command and read its reply according to its framing.
pub async fn exchange<S>(
    stream: &mut S,
    command: &Command,
    timeout: Duration,
) -> ObservatoryResult<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    discard_pending(stream).await?;
    stream.write_all(&command.encode()).await?;
    stream.flush().await?;

    if !command.expects_reply() {
        return Ok(String::new());
    }

    let data = match command.framing {
        Framing::Terminated => read_terminated(stream, &command.mnemonic, timeout).await?,
        Framing::SingleChar => read_single_char(stream, &command.mnemonic, timeout).await?,
        Framing::Unterminated => read_unterminated(stream, command.max_bytes, timeout).await?,
    };
    Ok(decode_reply(&data))
}

/// Drop bytes already waiting on the stream, such as a reply that
/// arrived after its command timed out.
async fn discard_pending<S>(stream: &mut S) -> ObservatoryResult<()>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        match time::timeout(Duration::ZERO, stream.read(&mut chunk)).await {
            // Nothing ready, or the peer closed; the exchange reports it.
            Err(_) | Ok(Ok(0)) => return Ok(()),
            Ok(Ok(n_bytes)) => {
                log::debug!(
                    "Discarding stale bytes: {:?}",
                    String::from_utf8_lossy(&chunk[..n_bytes])
                );
            }
            Ok(Err(error)) => return Err(error.into()),
        }
    }
}

async fn read_terminated<S>(
    stream: &mut S,
    mnemonic: &str,
    timeout: Duration,
) -> ObservatoryResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    while !data.contains(&TERMINATOR) {
        match time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Err(_) => {
                let kind = if data.is_empty() {
                    TimeoutKind::NoReply
                } else {
                    TimeoutKind::MissingTerminator
                };
                return Err(ObservatoryError::timeout(mnemonic, kind));
            }
            // Peer closed; whatever arrived is the reply.
            Ok(Ok(0)) => break,
            Ok(Ok(n_bytes)) => data.extend_from_slice(&chunk[..n_bytes]),
            Ok(Err(error)) => return Err(error.into()),
        }
    }
    Ok(data)
}

async fn read_single_char<S>(
    stream: &mut S,
    mnemonic: &str,
    timeout: Duration,
) -> ObservatoryResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; SINGLE_CHAR_READ_BYTES];

    match time::timeout(timeout, stream.read(&mut chunk)).await {
        Err(_) => Err(ObservatoryError::timeout(mnemonic, TimeoutKind::NoReply)),
        Ok(Ok(0)) => Err(ObservatoryError::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("connection closed before reply to '{mnemonic}'"),
        ))),
        Ok(Ok(_)) => Ok(chunk[..1].to_vec()),
        Ok(Err(error)) => Err(error.into()),
    }
}

async fn read_unterminated<S>(
    stream: &mut S,
    max_bytes: usize,
    timeout: Duration,
) -> ObservatoryResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let idle = UNTERMINATED_IDLE_MIN.max(timeout / 10);
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_BYTES];

    while data.len() < max_bytes {
        let budget = READ_CHUNK_BYTES.min(max_bytes - data.len());
        match time::timeout(idle, stream.read(&mut chunk[..budget])).await {
            Err(_) | Ok(Ok(0)) => break,
            Ok(Ok(n_bytes)) => data.extend_from_slice(&chunk[..n_bytes]),
            Ok(Err(error)) => return Err(error.into()),
        }
    }
    Ok(data)
}

/// Turn raw reply bytes into text.
///
/// Byte 0xDF (the LX200 degree mark) renders as '°', other invalid bytes
/// as `\xNN`. Only the text before the first terminator is kept.
pub fn decode_reply(data: &[u8]) -> String {
    let mut text = String::with_capacity(data.len());
    for chunk in data.utf8_chunks() {
        text.push_str(&chunk.valid().replace('ß', "°"));
        for byte in chunk.invalid() {
            if *byte == 0xDF {
                text.push('°');
            } else {
                text.push_str(&format!("\\x{byte:02x}"));
            }
        }
    }

    let first_reply = match text.find(TERMINATOR as char) {
        Some(index) => &text[..index],
        None => text.as_str(),
    };
    first_reply.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_cmd::{MountCmd, ReplyExpectation};
    use std::sync::Arc;
    use tokio::io::{duplex, DuplexStream};

    const TEST_TIMEOUT: Duration = Duration::from_millis(100);

    /// Answer each received command with the next scripted reply and
    /// report what was received. Keeps the stream open afterwards.
    fn scripted_peer(
        mut peer: DuplexStream,
        replies: Vec<&'static [u8]>,
    ) -> mpsc::UnboundedReceiver<String> {
        let (sent_sender, sent_receiver) = mpsc::unbounded_channel();
        task::spawn(async move {
            let mut replies = replies.into_iter();
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 256];
            loop {
                let Ok(n_bytes) = peer.read(&mut chunk).await else {
                    break;
                };
                if n_bytes == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..n_bytes]);
                while let Some(position) = buffer.iter().position(|byte| *byte == TERMINATOR) {
                    let command: Vec<u8> = buffer.drain(..=position).collect();
                    let _ = sent_sender.send(String::from_utf8_lossy(&command).to_string());
                    if let Some(reply) = replies.next() {
                        if !reply.is_empty() {
                            let _ = peer.write_all(reply).await;
                        }
                    }
                }
            }
        });
        sent_receiver
    }

    async fn channel_with_peer(
        replies: Vec<&'static [u8]>,
    ) -> (CommandChannel, mpsc::UnboundedReceiver<String>) {
        let (client, server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;
        (channel, scripted_peer(server, replies))
    }

    #[tokio::test]
    async fn test_send_not_connected() {
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));

        let reply = channel.send(&MountCmd::GetRa.command(), None).await;

        assert!(matches!(reply, Err(ObservatoryError::NotConnected)));
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn test_terminated_reply() {
        let (channel, mut sent) = channel_with_peer(vec![b"12:34:56#"]).await;

        let reply = channel.send(&MountCmd::GetRa.command(), None).await.unwrap();

        assert_eq!(reply, "12:34:56");
        assert_eq!(sent.recv().await.unwrap(), ":GR#");
    }

    #[tokio::test]
    async fn test_coalesced_replies_keep_first() {
        let (channel, _sent) = channel_with_peer(vec![b"12:34:56#22:33:44#"]).await;

        let reply = channel.send(&MountCmd::GetRa.command(), None).await.unwrap();

        assert_eq!(reply, "12:34:56");
    }

    #[tokio::test]
    async fn test_single_char_reply() {
        let (channel, mut sent) = channel_with_peer(vec![b"1"]).await;
        let command = Command::new(":Sr12:00:00", Framing::SingleChar, ReplyExpectation::ExpectReply);

        let reply = channel.send(&command, None).await.unwrap();

        assert_eq!(reply, "1");
        assert_eq!(sent.recv().await.unwrap(), ":Sr12:00:00#");
    }

    #[tokio::test]
    async fn test_single_char_keeps_first_byte() {
        let (channel, _sent) = channel_with_peer(vec![b"10#"]).await;
        let command = MountCmd::Flip.command();

        let reply = channel.send(&command, None).await.unwrap();

        assert_eq!(reply, "1");
    }

    #[tokio::test]
    async fn test_no_reply_returns_immediately() {
        let (channel, mut sent) = channel_with_peer(vec![b""]).await;

        let reply = channel.send(&MountCmd::Unpark.command(), None).await.unwrap();

        assert_eq!(reply, "");
        assert_eq!(sent.recv().await.unwrap(), ":PO#");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_bytes() {
        let (channel, _sent) = channel_with_peer(vec![b""]).await;

        let reply = channel.send(&MountCmd::GetRa.command(), None).await;

        assert!(matches!(
            reply,
            Err(ObservatoryError::Timeout {
                kind: TimeoutKind::NoReply,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_partial_bytes() {
        let (channel, _sent) = channel_with_peer(vec![b"PARTIAL"]).await;

        let reply = channel.send(&MountCmd::GetRa.command(), None).await;

        let Err(error) = reply else {
            panic!("Expected a timeout.");
        };
        assert!(matches!(
            error,
            ObservatoryError::Timeout {
                kind: TimeoutKind::MissingTerminator,
                ..
            }
        ));
        assert!(error.to_string().contains("missing terminator"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_char_timeout() {
        let (channel, _sent) = channel_with_peer(vec![b""]).await;

        let reply = channel.send(&MountCmd::Flip.command(), None).await;

        assert!(matches!(reply, Err(ObservatoryError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_unterminated_reply_collects_chunks() {
        let (client, mut server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;

        let peer = task::spawn(async move {
            let mut chunk = [0u8; 64];
            let _ = server.read(&mut chunk).await;
            server.write_all(b"INFO PART1").await.unwrap();
            time::sleep(Duration::from_millis(20)).await;
            server.write_all(b" PART2").await.unwrap();
            // Hold the stream open past the idle window.
            time::sleep(Duration::from_secs(1)).await;
        });

        let reply = channel
            .send(&MountCmd::GetEventLog.command(), None)
            .await
            .unwrap();

        assert_eq!(reply, "INFO PART1 PART2");
        peer.abort();
    }

    #[tokio::test]
    async fn test_unterminated_respects_budget() {
        let (client, mut server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;
        task::spawn(async move {
            let mut chunk = [0u8; 64];
            let _ = server.read(&mut chunk).await;
            server.write_all(b"0123456789").await.unwrap();
            time::sleep(Duration::from_secs(1)).await;
        });
        let command = Command::new(":evlog", Framing::Unterminated, ReplyExpectation::ExpectReply)
            .with_max_bytes(4);

        let reply = channel.send(&command, None).await.unwrap();

        assert_eq!(reply, "0123");
    }

    #[tokio::test]
    async fn test_closed_stream_is_short_reply() {
        let (client, mut server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;
        task::spawn(async move {
            let mut chunk = [0u8; 64];
            let _ = server.read(&mut chunk).await;
            server.write_all(b"SHORT").await.unwrap();
        });

        let reply = channel.send(&MountCmd::GetRa.command(), None).await.unwrap();

        assert_eq!(reply, "SHORT");
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialized() {
        let (channel, mut sent) = channel_with_peer(vec![b"1#", b"2#", b"3#"]).await;
        let channel = Arc::new(channel);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let channel = channel.clone();
                task::spawn(async move { channel.send(&MountCmd::GetStatus.command(), None).await })
            })
            .collect();

        let mut replies = Vec::new();
        for handle in handles {
            replies.push(handle.await.unwrap().unwrap());
        }
        replies.sort();

        assert_eq!(replies, vec!["1", "2", "3"]);
        for _ in 0..3 {
            assert_eq!(sent.recv().await.unwrap(), ":Gstat#");
        }
    }

    #[tokio::test]
    async fn test_close_then_send() {
        let (channel, _sent) = channel_with_peer(vec![]).await;
        assert!(channel.is_connected().await);

        channel.close().await;

        assert!(!channel.is_connected().await);
        assert!(matches!(
            channel.send(&MountCmd::GetRa.command(), None).await,
            Err(ObservatoryError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_single_char_on_closed_stream_is_transport_error() {
        let (client, mut server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;
        task::spawn(async move {
            let mut chunk = [0u8; 64];
            let _ = server.read(&mut chunk).await;
            drop(server);
        });

        let reply = channel.send(&MountCmd::Flip.command(), None).await;

        assert!(matches!(reply, Err(ObservatoryError::Transport(_))), "{reply:?}");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let channel = CommandChannel::new(MountConnection::new(
            "127.0.0.1",
            port,
            Duration::from_secs(2),
        ));

        let result = channel.connect().await;

        assert!(matches!(result, Err(ObservatoryError::Transport(_))), "{result:?}");
        assert!(!channel.is_connected().await);
    }

    #[tokio::test]
    async fn test_late_reply_is_not_taken_for_next() {
        let (client, mut server) = duplex(1024);
        let channel = CommandChannel::new(MountConnection::new("127.0.0.1", 3492, TEST_TIMEOUT));
        channel.attach_stream(client).await;
        task::spawn(async move {
            let mut chunk = [0u8; 64];
            let _ = server.read(&mut chunk).await;
            time::sleep(TEST_TIMEOUT * 2).await;
            server.write_all(b"11:11:11#").await.unwrap();
            let _ = server.read(&mut chunk).await;
            server.write_all(b"22:22:22#").await.unwrap();
            time::sleep(Duration::from_secs(1)).await;
        });

        let first = channel.send(&MountCmd::GetRa.command(), None).await;
        assert!(matches!(
            first,
            Err(ObservatoryError::Timeout {
                kind: TimeoutKind::NoReply,
                ..
            })
        ));
        // Let the late reply land before the next command.
        time::sleep(TEST_TIMEOUT * 3).await;

        let second = channel.send(&MountCmd::GetRa.command(), None).await.unwrap();

        assert_eq!(second, "22:22:22");
    }

    #[tokio::test]
    async fn test_sender_outlives_borrow() {
        let (channel, mut sent) = channel_with_peer(vec![b"7#"]).await;
        let sender = channel.sender().await.unwrap();

        let reply = task::spawn(async move { sender.send(&MountCmd::GetStatus.command(), None).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reply, "7");
        assert_eq!(sent.recv().await.unwrap(), ":Gstat#");
    }

    #[test]
    fn test_decode_degree_sign() {
        assert_eq!(decode_reply(&[b'1', 0xDF, b'#']), "1°");
        assert_eq!(decode_reply(b"+45\xdf30:00#"), "+45°30:00");
        assert_eq!(decode_reply(b"  0#  "), "0");
        assert_eq!(decode_reply(&[b'A', 0xFF]), "A\\xff");
    }
}
