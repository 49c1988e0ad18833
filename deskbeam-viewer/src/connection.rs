//! Viewer session: locate the host, pair, then stream until told to stop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use deskbeam_core::collab::{Discovery, DiscoveryEvent};
use deskbeam_core::{
    DeskbeamError, DeviceDescriptor, Message, PairingFailure, UdpDiscovery, ViewerClient,
};

use crate::config::ViewerAppConfig;
use crate::display::{is_blank, save_snapshot, stats_line};
use crate::input::{Command, chat_message, parse_command};

/// Whether another code may be tried after `e`.
fn may_retry(e: &DeskbeamError) -> bool {
    matches!(
        e,
        DeskbeamError::Pairing(PairingFailure::InvalidPin) | DeskbeamError::Timeout(_)
    )
}

/// Descriptor for a host given by address rather than discovered.
pub fn direct_host(addr: SocketAddr) -> DeviceDescriptor {
    DeviceDescriptor::new(addr.to_string(), addr.to_string(), addr.ip(), addr.port())
}

/// Resolve the host to dial: the configured address, or the first host
/// heard on the LAN within the discovery wait.
pub async fn find_host(config: &ViewerAppConfig) -> Result<DeviceDescriptor, DeskbeamError> {
    if let Some(addr) = config.host_addr()? {
        return Ok(direct_host(addr));
    }

    let discovery = UdpDiscovery::new(config.discovery_config());
    let (tx, mut rx) = mpsc::channel(16);
    discovery.start_listening(tx).await?;
    info!("searching the LAN for hosts");

    let wait = config.discovery_wait();
    let found = tokio::time::timeout(wait, async {
        while let Some(event) = rx.recv().await {
            if let DiscoveryEvent::DeviceDiscovered(device) = event {
                return Some(device);
            }
        }
        None
    })
    .await;
    discovery.stop().await?;

    match found {
        Ok(Some(device)) => {
            info!(host = %device, "found host");
            Ok(device)
        }
        Ok(None) => Err(DeskbeamError::ChannelClosed),
        Err(_) => Err(DeskbeamError::Timeout(wait)),
    }
}

/// Read a PIN from `lines`, skipping blank lines.
pub async fn read_pin<R>(lines: &mut Lines<R>) -> Result<String, DeskbeamError>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        let pin = line.trim();
        if !pin.is_empty() {
            return Ok(pin.to_string());
        }
    }
    Err(DeskbeamError::Other("no pairing code entered".into()))
}

// ── ViewerSession ────────────────────────────────────────────────

/// A paired (or pairing) viewer driven from the console.
pub struct ViewerSession {
    client: Arc<ViewerClient>,
    config: ViewerAppConfig,
}

impl ViewerSession {
    pub fn new(config: ViewerAppConfig) -> Self {
        Self {
            client: Arc::new(ViewerClient::new(config.to_viewer_config())),
            config,
        }
    }

    pub fn client(&self) -> &ViewerClient {
        &self.client
    }

    pub async fn connect(&self, host: &DeviceDescriptor) -> Result<(), DeskbeamError> {
        self.client.connect_to(host).await
    }

    /// Pair over the dialled connection. `pin` is tried first when given;
    /// after a wrong or unanswered code the next one is read from `lines`.
    /// Any other verdict, such as a lockout, ends the attempt.
    ///
    /// Returns the session token.
    pub async fn pair_until_accepted<R>(
        &self,
        mut pin: Option<String>,
        lines: &mut Lines<R>,
    ) -> Result<String, DeskbeamError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let code = match pin.take() {
                Some(code) => code,
                None => read_pin(lines).await?,
            };
            match self.client.pair(&code).await {
                Ok(token) => {
                    info!(session = %token, "session established");
                    return Ok(token);
                }
                Err(e) if may_retry(&e) => warn!("{e}; enter the code again"),
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream frames, log stats and execute console commands until the
    /// host goes away, `quit` is entered or `cancel` fires.
    pub async fn run<R>(&self, mut commands: Lines<R>, cancel: CancellationToken)
    where
        R: AsyncBufRead + Unpin,
    {
        let receive_cancel = cancel.child_token();
        let mut receiver = {
            let client = Arc::clone(&self.client);
            let cancel = receive_cancel.clone();
            tokio::spawn(async move { client.run(cancel).await })
        };

        let stats = self.client.stats_receiver();
        let quality = self.client.quality_receiver();
        let mut inbound = self.client.subscribe_inbound();
        let mut ticker = tokio::time::interval(self.config.stats_interval());
        let mut stdin_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                finished = &mut receiver => {
                    if let Err(e) = finished {
                        error!("receive task failed: {e}");
                    }
                    info!("host closed the session");
                    return self.finish();
                }
                _ = ticker.tick() => {
                    let line = stats_line(&stats.borrow(), quality.borrow().as_ref());
                    info!("{line}");
                }
                line = commands.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = self.execute(command).await {
                                warn!("command failed: {e}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("{e}"),
                    },
                    Ok(None) | Err(_) => stdin_open = false,
                },
                msg = inbound.recv() => match msg {
                    Ok(msg) => log_inbound(&msg),
                    Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "inbound messages dropped"),
                    Err(broadcast::error::RecvError::Closed) => {}
                },
            }
        }

        receive_cancel.cancel();
        if tokio::time::timeout(Duration::from_secs(2), &mut receiver).await.is_err() {
            receiver.abort();
        }
        self.client.disconnect().await;
        self.finish();
    }

    /// Send one console command to the host.
    pub async fn execute(&self, command: Command) -> Result<(), DeskbeamError> {
        match command {
            Command::Input(events) => {
                for event in events {
                    self.client.send_input(event).await?;
                }
                Ok(())
            }
            Command::Clipboard(data) => self.client.send_clipboard(data).await,
            Command::Chat(text) => {
                let msg = chat_message(&self.config.identity.device_name, text);
                self.client.send_auxiliary(Message::ChatMessage(msg)).await
            }
            Command::Quit => Ok(()),
        }
    }

    fn finish(&self) {
        let Some(path) = &self.config.display.snapshot_path else {
            return;
        };
        let frame = self.client.frame_receiver().borrow().clone();
        if is_blank(&frame) {
            info!("no frame to save");
            return;
        }
        match save_snapshot(&frame, path) {
            Ok(()) => info!("saved frame {} to {}", frame.frame_id, path.display()),
            Err(e) => warn!("could not save snapshot: {e}"),
        }
    }
}

fn log_inbound(msg: &Message) {
    match msg {
        Message::ChatMessage(chat) => info!("{}: {}", chat.sender_name, chat.text),
        Message::ClipboardData(data) => info!(bytes = data.len(), "host clipboard changed"),
        Message::AudioData(_) => {}
        other => info!(kind = %other.kind(), "message from host"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbeam_core::EnvelopeCodec;
    use deskbeam_core::protocol::{ClipboardData, MouseEvent, PairingResponse};
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_util::codec::Framed;

    /// A host that accepts `correct` and answers every other code with
    /// `otherwise`. Yields the codes it was shown.
    async fn scripted_host(
        correct: &'static str,
        otherwise: PairingFailure,
    ) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, EnvelopeCodec::new());
            let mut shown = Vec::new();
            while let Some(Ok(Message::PairingRequest(req))) = framed.next().await {
                let accepted = req.pin == correct;
                shown.push(req.pin);
                let resp = if accepted {
                    PairingResponse::accepted("session-1")
                } else {
                    PairingResponse::rejected(otherwise)
                };
                if framed.send(Message::PairingResponse(resp)).await.is_err() || accepted {
                    break;
                }
            }
            shown
        });
        (addr, task)
    }

    #[tokio::test]
    async fn configured_address_skips_discovery() {
        let mut config = ViewerAppConfig::default();
        config.network.host_address = "10.0.0.5:4000".into();
        let host = find_host(&config).await.unwrap();
        assert_eq!(host.socket_addr().to_string(), "10.0.0.5:4000");
    }

    #[tokio::test]
    async fn read_pin_skips_blank_lines() {
        let mut lines = (&b"\n  \n 123456 \n"[..]).lines();
        assert_eq!(read_pin(&mut lines).await.unwrap(), "123456");
        assert!(read_pin(&mut lines).await.is_err());
    }

    #[tokio::test]
    async fn wrong_code_is_retried_on_the_same_connection() {
        let (addr, host) = scripted_host("222222", PairingFailure::InvalidPin).await;
        let session = ViewerSession::new(ViewerAppConfig::default());
        session.connect(&direct_host(addr)).await.unwrap();

        let mut lines = (&b"\n222222\n"[..]).lines();
        let token = session
            .pair_until_accepted(Some("111111".into()), &mut lines)
            .await
            .unwrap();
        assert_eq!(token, "session-1");
        assert!(session.client().is_paired());
        assert_eq!(host.await.unwrap(), vec!["111111", "222222"]);
    }

    #[tokio::test]
    async fn lockout_ends_pairing_without_prompting() {
        let (addr, host) = scripted_host("222222", PairingFailure::TooManyAttempts).await;
        let session = ViewerSession::new(ViewerAppConfig::default());
        session.connect(&direct_host(addr)).await.unwrap();

        let mut lines = (&b"222222\n"[..]).lines();
        let err = session
            .pair_until_accepted(Some("111111".into()), &mut lines)
            .await
            .unwrap_err();
        assert!(matches!(err, DeskbeamError::Pairing(PairingFailure::TooManyAttempts)));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("222222"));

        session.client().disconnect().await;
        assert_eq!(host.await.unwrap(), vec!["111111"]);
    }

    #[tokio::test]
    async fn commands_need_pairing() {
        let session = ViewerSession::new(ViewerAppConfig::default());
        let move_to = Command::Input(vec![MouseEvent::move_to(1, 2).into()]);
        assert!(matches!(session.execute(move_to).await, Err(DeskbeamError::NotPaired)));
        let clip = Command::Clipboard(ClipboardData::Text("x".into()));
        assert!(matches!(session.execute(clip).await, Err(DeskbeamError::NotPaired)));
        let chat = Command::Chat("hi".into());
        assert!(matches!(session.execute(chat).await, Err(DeskbeamError::NotPaired)));
    }

    #[tokio::test]
    async fn quit_ends_the_run_loop() {
        let session = ViewerSession::new(ViewerAppConfig::default());
        let commands = (&b"bogus\nquit\n"[..]).lines();
        tokio::time::timeout(Duration::from_secs(5), session.run(commands, CancellationToken::new()))
            .await
            .unwrap();
        assert!(!session.client().is_paired());
    }
}
