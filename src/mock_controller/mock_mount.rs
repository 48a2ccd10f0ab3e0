//! TCP mock mount.
//!
//! One task owns the [`MountState`]; connection tasks parse incoming
//! commands and forward them to it, so several clients see one mount.

use std::net::SocketAddr;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot},
    task,
    time::Instant,
};

use crate::{
    error::ObservatoryResult,
    mock_controller::mount_state::MountState,
    mount_cmd::{Framing, MountCmd, ReplyExpectation, TERMINATOR},
    mount_cmd_regex::MountCmdRegex,
};

const STATE_CHANNEL_SIZE: usize = 100;

struct MockMountCmd {
    pub mount_cmd: MountCmd,
    pub tx: oneshot::Sender<Option<String>>,
}

/// A mock mount serving in the background.
pub struct MockMount {
    local_addr: SocketAddr,
    server_task: task::JoinHandle<()>,
}

impl MockMount {
    /// Bind `host:port` (port 0 picks a free one) and start serving.
    pub async fn start(host: &str, port: u16, state: MountState) -> ObservatoryResult<MockMount> {
        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Mock mount listening on {local_addr}.");

        let server_task = task::spawn(async move {
            if let Err(error) = serve(listener, state).await {
                log::error!("Mock mount stopped: {error}");
            }
        });

        Ok(MockMount {
            local_addr,
            server_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn stop(&self) {
        self.server_task.abort();
    }
}

impl Drop for MockMount {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

/// Serve a mock mount on `port` until the process ends.
pub async fn run_mock_mount(host: &str, port: u16) -> ObservatoryResult<()> {
    let listener = TcpListener::bind((host, port)).await?;
    log::info!("Mock mount listening on {}.", listener.local_addr()?);
    serve(listener, MountState::default()).await
}

async fn serve(listener: TcpListener, mut state: MountState) -> ObservatoryResult<()> {
    let (tx, mut rx) = mpsc::channel::<MockMountCmd>(STATE_CHANNEL_SIZE);

    task::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            let reply = state.handle(&cmd.mount_cmd, Instant::now());
            let _ = cmd.tx.send(reply);
        }
    });

    loop {
        let (socket, peer) = listener.accept().await?;
        log::info!("Mock mount accepted connection from {peer}.");
        let tx = tx.clone();
        task::spawn(async move {
            match handle_connection(socket, tx).await {
                Ok(()) => log::info!("Mock mount connection from {peer} closed."),
                Err(error) => log::warn!("Mock mount connection from {peer} failed: {error}"),
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    tx: mpsc::Sender<MockMountCmd>,
) -> ObservatoryResult<()> {
    let mount_cmd_regex = MountCmdRegex::new()?;
    let mut pending = Vec::new();
    let mut buf = vec![0; 1024];

    loop {
        let n_bytes = socket.read(&mut buf).await?;
        // Return value of `Ok(0)` signifies that the remote has closed.
        if n_bytes == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&buf[..n_bytes]);

        while let Some(position) = pending.iter().position(|byte| *byte == TERMINATOR) {
            let raw: Vec<u8> = pending.drain(..=position).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let mount_cmd = mount_cmd_regex.into_mount_cmd(&text);

            let (reply_tx, reply_rx) = oneshot::channel();
            if tx
                .send(MockMountCmd {
                    mount_cmd: mount_cmd.clone(),
                    tx: reply_tx,
                })
                .await
                .is_err()
            {
                log::error!("Mock mount state loop is gone.");
                return Ok(());
            }

            let Ok(reply) = reply_rx.await else {
                log::error!("Internal error when requesting response from mount state.");
                return Ok(());
            };

            if let Some(bytes) = frame_reply(&mount_cmd, reply) {
                socket.write_all(&bytes).await?;
            }
        }
    }
}

/// Put a reply on the wire the way the real mount frames it.
fn frame_reply(mount_cmd: &MountCmd, reply: Option<String>) -> Option<Vec<u8>> {
    if mount_cmd.reply() == ReplyExpectation::NoReply {
        return None;
    }
    let reply = reply?;
    let mut bytes = reply.into_bytes();
    if mount_cmd.framing() == Framing::Terminated {
        bytes.push(TERMINATOR);
    }
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn exchange(stream: &mut TcpStream, command: &[u8]) -> String {
        stream.write_all(command).await.unwrap();
        let mut buf = [0u8; 256];
        let n_bytes = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buf[..n_bytes]).to_string()
    }

    #[tokio::test]
    async fn test_mock_mount_answers() {
        let mock_mount = MockMount::start("127.0.0.1", 0, MountState::default())
            .await
            .unwrap();
        let mut stream = TcpStream::connect(mock_mount.local_addr()).await.unwrap();

        assert_eq!(exchange(&mut stream, b":Gstat#").await, "5#");
        assert_eq!(exchange(&mut stream, b":pS#").await, "West#");
        // Single char replies carry no terminator.
        assert_eq!(exchange(&mut stream, b":GTRK#").await, "0");
    }

    #[tokio::test]
    async fn test_mock_mount_skips_no_reply_commands() {
        let mock_mount = MockMount::start("127.0.0.1", 0, MountState::default())
            .await
            .unwrap();
        let mut stream = TcpStream::connect(mock_mount.local_addr()).await.unwrap();

        // Both commands in one write; only the status produces bytes.
        assert_eq!(exchange(&mut stream, b":PO#:Gstat#").await, "7#");
    }

    #[tokio::test]
    async fn test_clients_share_state() {
        let mock_mount = MockMount::start("127.0.0.1", 0, MountState::default())
            .await
            .unwrap();
        let mut first = TcpStream::connect(mock_mount.local_addr()).await.unwrap();
        let mut second = TcpStream::connect(mock_mount.local_addr()).await.unwrap();

        first.write_all(b":PO#").await.unwrap();
        assert_eq!(exchange(&mut first, b":Gstat#").await, "7#");
        assert_eq!(exchange(&mut second, b":Gstat#").await, "7#");
    }

    #[test]
    fn test_frame_reply() {
        assert_eq!(
            frame_reply(&MountCmd::GetRa, Some("12:00:00.00".to_owned())),
            Some(b"12:00:00.00#".to_vec())
        );
        assert_eq!(
            frame_reply(&MountCmd::Flip, Some("1".to_owned())),
            Some(b"1".to_vec())
        );
        assert_eq!(frame_reply(&MountCmd::Park, None), None);
        assert_eq!(
            frame_reply(&MountCmd::SlewEquatorial, Some("0".to_owned())),
            Some(b"0".to_vec())
        );
    }
}
