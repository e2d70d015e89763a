//! Session manager - connect, keep alive, tear down

use super::keepalive::{self, KeepaliveConfig, KeepaliveHandle};
use crate::command::{CommandExecutor, ExchangeCorrelator, ExchangeState};
use crate::error::{LinkError, Result};
use crate::link::DroneLink;
use crate::telemetry::TelemetryReader;
use crate::transport::{DatagramChannel, UdpChannel};
use crate::video::VideoHandoff;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tello_shared::state_machine::TransitionResult;
use tello_shared::{
    commands, net, timing, Command, LifecycleEvent, LifecycleStateMachine, Reply, Response,
    SessionState, TelemetryRecord,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for a drone session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Drone address
    pub device_ip: IpAddr,
    /// Drone command port
    pub command_port: u16,
    /// Local interface to bind
    pub bind_ip: IpAddr,
    /// Local command port (0 = ephemeral)
    pub local_command_port: u16,
    /// Local telemetry port (0 = ephemeral)
    pub telemetry_port: u16,
    /// Local port the drone streams video to
    pub video_port: u16,
    /// Timeout for the mode-entry handshake
    pub connect_timeout: Duration,
    /// Timeout for calls that do not pass one
    pub command_timeout: Duration,
    /// Time between keepalive queries
    pub keepalive_interval: Duration,
    /// How long teardown waits for background tasks to stop
    pub stop_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1)),
            command_port: net::COMMAND_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_command_port: net::COMMAND_PORT,
            telemetry_port: net::TELEMETRY_PORT,
            video_port: net::VIDEO_PORT,
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            command_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
            keepalive_interval: Duration::from_millis(timing::KEEPALIVE_INTERVAL_MS),
            stop_grace: Duration::from_millis(timing::KEEPALIVE_STOP_GRACE_MS),
        }
    }
}

impl SessionConfig {
    /// Default configuration for the drone at `device_ip`
    pub fn for_device(device_ip: IpAddr) -> Self {
        Self {
            device_ip,
            ..Default::default()
        }
    }

    pub fn device_addr(&self) -> SocketAddr {
        SocketAddr::new(self.device_ip, self.command_port)
    }

    fn command_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.local_command_port)
    }

    fn telemetry_bind(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.telemetry_port)
    }

    fn video_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.video_port)
    }
}

/// A connected drone: both channels, the keepalive task and the telemetry
/// reader
///
/// Call [`disconnect`](Self::disconnect) when done. A session dropped without
/// it still cancels its background tasks and closes both channels.
pub struct Session {
    config: SessionConfig,
    lifecycle: RwLock<LifecycleStateMachine>,
    correlator: Arc<ExchangeCorrelator<UdpChannel>>,
    command_channel: Arc<UdpChannel>,
    telemetry_channel: Arc<UdpChannel>,
    telemetry: Arc<TelemetryReader>,
    /// Parent of every background task's cancellation token
    shutdown: CancellationToken,
    keepalive: Mutex<Option<KeepaliveHandle>>,
    telemetry_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open both channels, enter SDK mode and start the keepalive task
    ///
    /// Fails with `HandshakeFailed` if the drone does not answer the
    /// mode-entry command with success within `connect_timeout`. Nothing is
    /// left open on failure.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let device = config.device_addr();
        info!("Connecting to drone at {}", device);

        let command_channel = Arc::new(UdpChannel::command(config.command_bind(), device).await?);
        let telemetry_channel = Arc::new(UdpChannel::telemetry(config.telemetry_bind()).await?);

        let shutdown = CancellationToken::new();
        let telemetry = Arc::new(TelemetryReader::new());
        let telemetry_task = telemetry.spawn(telemetry_channel.clone(), shutdown.child_token());

        let session = Self {
            correlator: Arc::new(ExchangeCorrelator::new(command_channel.clone())),
            lifecycle: RwLock::new(LifecycleStateMachine::new()),
            command_channel,
            telemetry_channel,
            telemetry,
            shutdown,
            keepalive: Mutex::new(None),
            telemetry_task: Mutex::new(Some(telemetry_task)),
            config,
        };

        if let Err(e) = session.handshake().await {
            warn!("Handshake with {} failed: {}", device, e);
            session.disconnect().await;
            return Err(e);
        }

        let keepalive = keepalive::spawn(
            session.correlator.clone(),
            session.keepalive_config(),
            session.shutdown.child_token(),
        );
        *session.keepalive.lock().await = Some(keepalive);

        session
            .lifecycle
            .write()
            .await
            .process_event(LifecycleEvent::HandshakeSucceeded);
        info!("Session with {} active", device);

        Ok(session)
    }

    /// Connect, run `work`, then disconnect whatever `work` returned
    ///
    /// If the returned future is dropped part way, the session's drop
    /// teardown still runs.
    pub async fn scoped<T, F>(config: SessionConfig, work: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s Session) -> BoxFuture<'s, T>,
    {
        let session = Self::connect(config).await?;
        let output = work(&session).await;
        session.disconnect().await;
        Ok(output)
    }

    async fn handshake(&self) -> Result<()> {
        let request = commands::command().encode();

        match self.correlator.issue(&request, self.config.connect_timeout).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(other) => Err(LinkError::HandshakeFailed(format!(
                "drone answered '{}'",
                other
            ))),
            Err(e) => Err(LinkError::HandshakeFailed(e.to_string())),
        }
    }

    fn keepalive_config(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            interval: self.config.keepalive_interval,
            timeout: self.config.command_timeout,
            query: commands::get_time().encode(),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.lifecycle.read().await.state()
    }

    /// Send one encoded request and wait up to `timeout` for its response
    ///
    /// Concurrent callers (including the keepalive task) are serialized.
    pub async fn issue(&self, request: &[u8], timeout: Duration) -> Result<Response> {
        {
            let lifecycle = self.lifecycle.read().await;
            if !lifecycle.is_active() {
                return Err(LinkError::NotActive(lifecycle.state()));
            }
        }

        self.correlator.issue(request, timeout).await
    }

    /// Run a catalog command with the default timeout
    pub async fn execute(&self, command: &Command) -> Result<Reply> {
        CommandExecutor::new(self).execute(command).await
    }

    /// Most recent telemetry record, without waiting
    pub fn latest_telemetry(&self) -> Option<TelemetryRecord> {
        self.telemetry.latest()
    }

    /// Wait up to `timeout` for the next telemetry record
    pub async fn next_telemetry(&self, timeout: Duration) -> Result<TelemetryRecord> {
        self.telemetry.next(timeout).await
    }

    /// Enable the video stream and hand its endpoint to an external decoder
    pub async fn start_video(&self) -> Result<VideoHandoff<'_>> {
        self.execute(&commands::streamon()).await?;
        let endpoint = self.config.video_endpoint();
        info!("Video stream enabled on {}", endpoint);
        Ok(VideoHandoff::new(self, endpoint))
    }

    /// Stop background work and close both channels
    ///
    /// Idempotent: calls after the first return immediately.
    pub async fn disconnect(&self) {
        match self
            .lifecycle
            .write()
            .await
            .process_event(LifecycleEvent::CloseRequested)
        {
            TransitionResult::Success(_) => {}
            other => {
                debug!("Disconnect ignored: {:?}", other);
                return;
            }
        }

        info!("Disconnecting from {}", self.config.device_addr());
        let grace = self.config.stop_grace;

        if let Some(keepalive) = self.keepalive.lock().await.take() {
            if !keepalive.stop(grace).await {
                warn!("Keepalive did not acknowledge stop");
            }
        }

        self.shutdown.cancel();
        self.command_channel.close();
        self.telemetry_channel.close();

        if let Some(mut task) = self.telemetry_task.lock().await.take() {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Telemetry reader ended abnormally: {}", e),
                Err(_) => {
                    warn!("Telemetry reader ignored shutdown, aborting");
                    task.abort();
                }
            }
        }

        self.lifecycle
            .write()
            .await
            .process_event(LifecycleEvent::TeardownComplete);
        info!("Session closed");
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_addr(&self) -> SocketAddr {
        self.config.device_addr()
    }

    /// Local address of the command channel
    pub fn command_local_addr(&self) -> Result<SocketAddr> {
        self.command_channel.local_addr()
    }

    /// Local address of the telemetry channel
    pub fn telemetry_local_addr(&self) -> Result<SocketAddr> {
        self.telemetry_channel.local_addr()
    }

    /// Exchange state of the command channel
    pub fn exchange_state(&self) -> ExchangeState {
        self.correlator.state()
    }
}

#[async_trait]
impl DroneLink for Session {
    async fn issue(&self, request: &[u8], timeout: Duration) -> Result<Response> {
        Session::issue(self, request, timeout).await
    }

    fn latest_telemetry(&self) -> Option<TelemetryRecord> {
        Session::latest_telemetry(self)
    }

    fn default_timeout(&self) -> Duration {
        self.config.command_timeout
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state() == SessionState::Closed {
            return;
        }

        warn!(
            "Session with {} dropped without disconnect, tearing down",
            self.config.device_addr()
        );
        self.shutdown.cancel();
        self.command_channel.close();
        self.telemetry_channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::net::UdpSocket;
    use tokio::sync::mpsc;

    const SAMPLE: &str = "mid:-1;x:0;y:0;z:0;mpry:0,0,0;pitch:0;roll:0;yaw:0;vgx:0;vgy:0;vgz:0;templ:79;temph:82;tof:6553;h:0;bat:89;baro:51.81;time:0;agx:-8.00;agy:4.00;agz:-1050.00;";

    /// A loopback drone: answers via `reply`, `None` means stay silent
    struct FakeDrone {
        addr: SocketAddr,
        socket: Arc<UdpSocket>,
        requests: mpsc::UnboundedReceiver<String>,
        task: JoinHandle<()>,
    }

    impl FakeDrone {
        async fn spawn(reply: fn(&str) -> Option<&'static str>) -> Self {
            let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
            let addr = socket.local_addr().unwrap();
            let (tx, requests) = mpsc::unbounded_channel();

            let task = {
                let socket = socket.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while let Ok((n, from)) = socket.recv_from(&mut buf).await {
                        let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if let Some(answer) = reply(&request) {
                            let _ = socket.send_to(answer.as_bytes(), from).await;
                        }
                        let _ = tx.send(request);
                    }
                })
            };

            Self {
                addr,
                socket,
                requests,
                task,
            }
        }

        fn cooperative(request: &str) -> Option<&'static str> {
            match request {
                "battery?" => Some("87"),
                "sdk?" => Some("30"),
                "time?" => Some("0s"),
                "takeoff" => None,
                _ => Some("ok"),
            }
        }

        /// Requests received so far, excluding keepalive queries
        fn drain(&mut self) -> Vec<String> {
            let mut seen = Vec::new();
            while let Ok(request) = self.requests.try_recv() {
                if request != "time?" {
                    seen.push(request);
                }
            }
            seen
        }

        fn config(&self) -> SessionConfig {
            SessionConfig {
                device_ip: self.addr.ip(),
                command_port: self.addr.port(),
                bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                local_command_port: 0,
                telemetry_port: 0,
                video_port: 0,
                connect_timeout: Duration::from_millis(300),
                command_timeout: Duration::from_millis(300),
                keepalive_interval: Duration::from_secs(30),
                stop_grace: Duration::from_millis(500),
            }
        }
    }

    impl Drop for FakeDrone {
        fn drop(&mut self) {
            self.task.abort();
        }
    }

    /// Two distinct loopback ports that were free a moment ago
    fn free_ports() -> (u16, u16) {
        let a = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        (a.local_addr().unwrap().port(), b.local_addr().unwrap().port())
    }

    #[tokio::test]
    async fn test_connect_issue_disconnect() {
        let mut drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();
        assert_eq!(session.state().await, SessionState::Active);

        let reply = session.execute(&commands::get_battery()).await.unwrap();
        assert_eq!(reply, Reply::Integer(87));

        let response = session
            .issue(b"sdk?", Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(response, Response::Success("30".into()));

        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Closed);
        assert_eq!(drone.drain(), vec!["command", "battery?", "sdk?"]);
    }

    #[tokio::test]
    async fn test_silent_drone_fails_handshake_and_releases_sockets() {
        let drone = FakeDrone::spawn(|_| None).await;
        let mut config = drone.config();
        (config.local_command_port, config.telemetry_port) = free_ports();

        let result = Session::connect(config.clone()).await;
        assert!(matches!(result, Err(LinkError::HandshakeFailed(_))));

        // Both local ports are free again
        UdpSocket::bind(config.command_bind()).await.unwrap();
        UdpSocket::bind(config.telemetry_bind()).await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let drone = FakeDrone::spawn(|_| Some("error")).await;
        let result = Session::connect(drone.config()).await;
        assert!(matches!(result, Err(LinkError::HandshakeFailed(_))));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();

        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Closed);

        let result = session.issue(b"battery?", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(LinkError::NotActive(SessionState::Closed))));
    }

    #[tokio::test]
    async fn test_disconnect_releases_both_ports() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let mut config = drone.config();
        (config.local_command_port, config.telemetry_port) = free_ports();

        let session = Session::connect(config.clone()).await.unwrap();
        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Closed);

        // Session still in scope; its ports must already be free
        UdpSocket::bind(config.command_bind()).await.unwrap();
        UdpSocket::bind(config.telemetry_bind()).await.unwrap();
        drop(session);
    }

    #[tokio::test]
    async fn test_reconnect_on_same_ports_after_disconnect() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let mut config = drone.config();
        (config.local_command_port, config.telemetry_port) = free_ports();

        let first = Session::connect(config.clone()).await.unwrap();
        first.disconnect().await;

        let second = Session::connect(config).await.unwrap();
        assert_eq!(second.state().await, SessionState::Active);
        second.disconnect().await;
        drop(first);
    }

    #[tokio::test]
    async fn test_disconnect_wakes_pending_issue() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();
        let started = tokio::time::Instant::now();

        // The drone never answers takeoff
        let (result, _) = tokio::join!(session.issue(b"takeoff", Duration::from_secs(5)), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            session.disconnect().await;
        });

        assert!(matches!(result, Err(LinkError::ChannelClosed("command"))));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(session.exchange_state(), ExchangeState::Idle);
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_timeout_then_next_call_succeeds() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();

        let result = session.execute(&commands::takeoff()).await;
        assert!(matches!(result, Err(LinkError::Timeout(_))));
        assert_eq!(session.exchange_state(), ExchangeState::Idle);

        let reply = session.execute(&commands::get_battery()).await.unwrap();
        assert_eq!(reply.as_integer(), Some(87));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_telemetry_is_decoded_as_it_arrives() {
        let drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();
        assert!(session.latest_telemetry().is_none());

        let target = session.telemetry_local_addr().unwrap();
        let (record, _) = tokio::join!(session.next_telemetry(Duration::from_secs(1)), async {
            drone.socket.send_to(SAMPLE.as_bytes(), target).await.unwrap();
        });

        let record = record.unwrap();
        assert_eq!(record.bat, 89);
        assert_eq!(record.mpry, (0, 0, 0));
        assert_eq!(session.latest_telemetry(), Some(record));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_keepalive_runs_while_active() {
        let mut drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let mut config = drone.config();
        config.keepalive_interval = Duration::from_millis(30);
        let session = Session::connect(config).await.unwrap();

        let mut keepalives = 0;
        while keepalives < 2 {
            let request = tokio::time::timeout(Duration::from_secs(1), drone.requests.recv())
                .await
                .expect("no keepalive traffic")
                .unwrap();
            if request == "time?" {
                keepalives += 1;
            }
        }

        session.disconnect().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        while drone.requests.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(drone.requests.try_recv().is_err(), "keepalive outlived disconnect");
    }

    #[tokio::test]
    async fn test_drop_without_disconnect_stops_keepalive() {
        let mut drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let mut config = drone.config();
        config.keepalive_interval = Duration::from_millis(20);
        let session = Session::connect(config).await.unwrap();

        drop(session);
        tokio::time::sleep(Duration::from_millis(100)).await;
        while drone.requests.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(drone.requests.try_recv().is_err(), "keepalive outlived drop");
    }

    #[tokio::test]
    async fn test_scoped_session_disconnects() {
        let mut drone = FakeDrone::spawn(FakeDrone::cooperative).await;

        let battery = Session::scoped(drone.config(), |session| {
            async move { session.execute(&commands::get_battery()).await }.boxed()
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(battery.as_integer(), Some(87));

        assert_eq!(drone.drain(), vec!["command", "battery?"]);
    }

    #[tokio::test]
    async fn test_video_handoff_brackets_stream() {
        let mut drone = FakeDrone::spawn(FakeDrone::cooperative).await;
        let session = Session::connect(drone.config()).await.unwrap();

        let video = session.start_video().await.unwrap();
        assert_eq!(video.endpoint().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(video.url(), "udp://@127.0.0.1:0");
        video.finish().await.unwrap();

        session.disconnect().await;
        assert_eq!(drone.drain(), vec!["command", "streamon", "streamoff"]);
    }
}
