//! High-level converter interface

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use z397_core::{
    codec, command,
    constants::{
        DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TIMEOUT, MODE_ENABLE_FRAME, RESET_GRACE_MS,
        TELNET_EXTRA_TIMEOUT_MS, TELNET_PORT,
    },
    response, FrameReceiver, Inbound, Session,
};
use z397_transport::{TcpReader, TcpTransport, TcpWriter, TelnetReset};
use z397_types::{CommandKind, ConnectionState, Request, Response, ResponseData};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::registry::Registry;

const EVENT_CAPACITY: usize = 64;

/// Write half of the current link, tagged with its session generation
struct Link {
    generation: u64,
    writer: TcpWriter,
}

type LinkSlot = Arc<Mutex<Option<Link>>>;

/// Returns a connecting session to Disconnected unless disarmed
///
/// Covers both a failed attempt and a `connect` future dropped mid-way.
struct ConnectGuard<'a> {
    session: &'a Session,
    generation: u64,
    armed: bool,
}

impl<'a> ConnectGuard<'a> {
    fn new(session: &'a Session, generation: u64) -> Self {
        Self {
            session,
            generation,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.close(self.generation) {
            debug!(generation = self.generation, "Connect attempt abandoned");
        }
    }
}

/// Z397 converter
///
/// Talks to the controllers behind a converter over its TCP data channel.
/// Methods take `&self`, so requests can be issued concurrently; replies are
/// matched to requests by ID.
///
/// # Examples
///
/// ```no_run
/// use z397::Converter;
///
/// #[tokio::main]
/// async fn main() -> z397::Result<()> {
///     let converter = Converter::new("192.168.1.50", 1000);
///
///     converter.connect().await?;
///     for addr in converter.scan().await? {
///         println!("{}: {}", addr, converter.serial_number(addr).await?);
///     }
///
///     converter.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct Converter {
    host: String,
    port: u16,
    key: String,
    telnet_port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
    reset_grace: Duration,
    session: Session,
    registry: Registry,
    link: LinkSlot,
    reader: parking_lot::Mutex<Option<(u64, JoinHandle<()>)>>,
    events: broadcast::Sender<Event>,
}

impl Converter {
    /// Create a converter client for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            host: host.into(),
            port,
            key: String::new(),
            telnet_port: TELNET_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            reset_grace: Duration::from_millis(RESET_GRACE_MS),
            session: Session::new(),
            registry: Registry::new(),
            link: Arc::new(Mutex::new(None)),
            reader: parking_lot::Mutex::new(None),
            events,
        }
    }

    /// Set the device key used by [`reset`](Self::reset)
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set how long a request waits for its reply
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the delay between the reset command and reporting the reset
    pub fn with_reset_grace(mut self, grace: Duration) -> Self {
        self.reset_grace = grace;
        self
    }

    /// Set the port of the Telnet console
    pub fn with_telnet_port(mut self, port: u16) -> Self {
        self.telnet_port = port;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Number of requests waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.registry.len()
    }

    /// Next ID from the built-in counter
    ///
    /// The counter wraps after 255 and does not know about IDs picked by the
    /// caller, so mixing both can collide.
    pub fn next_request_id(&self) -> u32 {
        u32::from(self.session.next_request_id())
    }

    /// Receive connection-level events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Open the data link
    ///
    /// Sends the mode-enable frame once the socket is open.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` unless disconnected; an open link is left untouched
    /// - `Transport` if the socket cannot be opened in time
    pub async fn connect(&self) -> Result<()> {
        let generation = self
            .session
            .begin_connect()
            .map_err(|_| Error::AlreadyConnected)?;
        let guard = ConnectGuard::new(&self.session, generation);

        info!("Connecting to {}:{}...", self.host, self.port);

        match self.open_link(generation).await {
            Ok(()) => {
                guard.disarm();
                info!("Connected to {}:{}", self.host, self.port);
                self.emit(Event::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}:{}: {}", self.host, self.port, e);
                Err(e)
            }
        }
    }

    async fn open_link(&self, generation: u64) -> Result<()> {
        let mut transport =
            TcpTransport::new(&self.host, self.port).with_connect_timeout(self.connect_timeout);
        let (reader, mut writer) = transport.connect().await?;

        writer.send(&MODE_ENABLE_FRAME).await?;
        trace!(generation, "Mode-enable frame sent");

        let mut link = self.link.lock().await;
        if self.session.connected(generation).is_err() {
            let _ = writer.shutdown().await;
            return Err(Error::ConnectionLost(
                "link was torn down while connecting".into(),
            ));
        }
        *link = Some(Link { generation, writer });

        // Reader is registered before the link lock is released, so a
        // teardown that finds this link also finds its reader
        let inbox = Inbox {
            generation,
            session: self.session.clone(),
            registry: self.registry.clone(),
            link: self.link.clone(),
            events: self.events.clone(),
        };
        *self.reader.lock() = Some((generation, tokio::spawn(inbox.run(reader))));

        Ok(())
    }

    /// Close the data link
    ///
    /// Requests still waiting are rejected with `ConnectionLost`.
    ///
    /// # Errors
    ///
    /// `AlreadyDisconnected` unless connected.
    pub async fn disconnect(&self) -> Result<()> {
        let retired = self
            .session
            .begin_disconnect()
            .map_err(|_| Error::AlreadyDisconnected)?;

        info!("Disconnecting from {}:{}...", self.host, self.port);

        self.teardown(retired, "disconnected").await;
        self.emit(Event::Disconnected);

        info!("Disconnected");
        Ok(())
    }

    /// Reboot the converter over its Telnet console
    ///
    /// Closes the data link first if there is one. Resolves once the reboot
    /// command was sent and the grace delay passed; the converter is not
    /// confirmed to be back.
    pub async fn reset(&self) -> Result<()> {
        if let Some(retired) = self.session.force_close() {
            debug!("Closing data link before reset");
            self.teardown(retired, "converter reset").await;
            self.emit(Event::Disconnected);
        }

        warn!("Resetting converter {}...", self.host);

        TelnetReset::new(&self.host, &self.key)
            .with_port(self.telnet_port)
            .with_timeout(self.request_timeout + Duration::from_millis(TELNET_EXTRA_TIMEOUT_MS))
            .with_grace(self.reset_grace)
            .run()
            .await?;

        info!("Reset initiated");
        Ok(())
    }

    /// Release the link opened as `retired`
    ///
    /// A newer link that was opened in the meantime is left alone.
    async fn teardown(&self, retired: u64, reason: &str) {
        let link = {
            let mut slot = self.link.lock().await;
            if slot.as_ref().is_some_and(|link| link.generation == retired) {
                slot.take()
            } else {
                None
            }
        };

        let task = {
            let mut reader = self.reader.lock();
            match reader.take() {
                Some((generation, task)) if generation == retired => Some(task),
                other => {
                    *reader = other;
                    None
                }
            }
        };
        if let Some(task) = task {
            task.abort();
        }

        if let Some(mut link) = link {
            if let Err(e) = link.writer.shutdown().await {
                warn!("Failed to shut down link: {}", e);
            }
        }

        self.registry
            .cancel_all(|| Error::ConnectionLost(reason.to_string()));
    }

    /// Run a request envelope
    ///
    /// Lifecycle commands answer with the connection state or the reset
    /// notice; bus commands with the parsed reply.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let data = match request.command {
            CommandKind::Connect => {
                self.connect().await?;
                ResponseData::Connection(ConnectionState::Connected)
            }
            CommandKind::Disconnect => {
                self.disconnect().await?;
                ResponseData::Connection(ConnectionState::Disconnected)
            }
            CommandKind::Reset => {
                self.reset().await?;
                ResponseData::ResetInitiated
            }
            command => return self.execute(request.id, command, request.addr).await,
        };

        Ok(Response {
            id: request.id,
            addr: None,
            command: request.command,
            data,
        })
    }

    async fn execute(&self, id: u32, command: CommandKind, addr: Option<u32>) -> Result<Response> {
        if !self.session.is_connected() {
            return Err(Error::NotConnected);
        }

        let handle = self.registry.submit(id, command, self.request_timeout)?;
        let wire_id = handle.id();

        let frame = match command::build(command, wire_id, addr, Local::now().naive_local()) {
            Ok(frame) => frame,
            Err(e) => {
                self.registry.discard(wire_id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.send(&frame).await {
            self.registry.discard(wire_id);
            return Err(e);
        }

        debug!(id = wire_id, command = command.name(), "Request sent");

        handle.wait().await
    }

    async fn send(&self, frame: &[u8]) -> Result<()> {
        let mut link = self.link.lock().await;
        let link = link.as_mut().ok_or(Error::NotConnected)?;
        link.writer.send(frame).await?;
        Ok(())
    }

    /// Addresses of the controllers on the bus
    pub async fn scan(&self) -> Result<Vec<u8>> {
        let response = self.execute(self.next_request_id(), CommandKind::Scan, None).await?;
        match response.data {
            ResponseData::Addresses(addrs) => Ok(addrs),
            _ => Err(mismatch(&response, CommandKind::Scan)),
        }
    }

    /// Serial number of the controller at `addr`
    pub async fn serial_number(&self, addr: u8) -> Result<u16> {
        let response = self
            .execute(self.next_request_id(), CommandKind::GetSn, Some(u32::from(addr)))
            .await?;
        match response.data {
            ResponseData::SerialNumber(serial) => Ok(serial),
            _ => Err(mismatch(&response, CommandKind::GetSn)),
        }
    }

    /// Clock of the controller at `addr`
    pub async fn get_time(&self, addr: u8) -> Result<NaiveDateTime> {
        let response = self
            .execute(self.next_request_id(), CommandKind::GetTime, Some(u32::from(addr)))
            .await?;
        match response.data {
            ResponseData::Time(time) => Ok(time),
            _ => Err(mismatch(&response, CommandKind::GetTime)),
        }
    }

    /// Set the clock of the controller at `addr` to local time
    pub async fn set_time(&self, addr: u8) -> Result<()> {
        self.execute(self.next_request_id(), CommandKind::SetTime, Some(u32::from(addr)))
            .await
            .map(|_| ())
    }

    /// Pulse the door lock of the controller at `addr`
    pub async fn open(&self, addr: u8) -> Result<()> {
        self.execute(self.next_request_id(), CommandKind::Open, Some(u32::from(addr)))
            .await
            .map(|_| ())
    }
}

fn mismatch(response: &Response, expected: CommandKind) -> Error {
    Error::UnexpectedResponse {
        id: response.id as u8,
        expected,
        actual: response.data.bus_command().unwrap_or(response.command),
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        if let Some((_, task)) = self.reader.get_mut().take() {
            if self.session.is_connected() {
                warn!("Converter dropped while still connected");
            }
            task.abort();
        }
    }
}

/// Reader side of a link, owned by its own task
struct Inbox {
    generation: u64,
    session: Session,
    registry: Registry,
    link: LinkSlot,
    events: broadcast::Sender<Event>,
}

impl Inbox {
    async fn run(self, mut reader: TcpReader) {
        let mut receiver = FrameReceiver::new();

        let reason = loop {
            match reader.receive().await {
                Ok(chunk) => {
                    for inbound in receiver.feed(&chunk) {
                        self.handle(inbound);
                    }
                }
                Err(e) => break e.to_string(),
            }
        };

        self.close(reason).await;
    }

    fn handle(&self, inbound: Inbound) {
        let raw = match inbound {
            Inbound::Frame(raw) => raw,
            Inbound::Fault(fault) => {
                warn!("Converter reported: {}", fault);
                let _ = self.events.send(Event::Fault(fault));
                return;
            }
        };

        let packet = match codec::decode(&raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        if !packet.checksum_ok() {
            let frame_type = u8::from(packet.frame_type);
            warn!(frame_type, id = packet.id, "Checksum error for incoming packet");

            let _ = self.events.send(Event::ChecksumMismatch {
                frame_type,
                id: packet.id,
            });
            self.registry.fail(
                packet.id,
                z397_core::Error::ChecksumMismatch {
                    frame_type,
                    id: packet.id,
                }
                .into(),
            );
            return;
        }

        match response::dispatch(&packet) {
            Ok(reply) => {
                self.registry.complete(packet.id, reply);
            }
            Err(e) => {
                let message = e.to_string();
                if !self.registry.fail(packet.id, e.into()) {
                    warn!(id = packet.id, "Dropping reply: {}", message);
                }
            }
        }
    }

    async fn close(self, reason: String) {
        if !self.session.close(self.generation) {
            trace!(generation = self.generation, "Reader of a retired link stopped");
            return;
        }

        warn!("Connection lost: {}", reason);

        {
            let mut link = self.link.lock().await;
            if link.as_ref().is_some_and(|link| link.generation == self.generation) {
                *link = None;
            }
        }

        self.registry
            .cancel_all(|| Error::ConnectionLost(reason.clone()));
        let _ = self.events.send(Event::Closed { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_create() {
        let converter = Converter::new("192.168.1.50", 1000);
        assert!(!converter.is_connected());
        assert_eq!(converter.state(), ConnectionState::Disconnected);
        assert_eq!(converter.pending_requests(), 0);
    }

    #[test]
    fn test_request_ids_count_up() {
        let converter = Converter::new("192.168.1.50", 1000);
        assert_eq!(converter.next_request_id(), 0);
        assert_eq!(converter.next_request_id(), 1);
    }

    #[tokio::test]
    async fn test_commands_need_connection() {
        let converter = Converter::new("192.168.1.50", 1000);

        assert!(matches!(converter.scan().await, Err(Error::NotConnected)));
        assert!(matches!(
            converter.request(Request::addressed(1, 2, CommandKind::Open)).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(converter.disconnect().await, Err(Error::AlreadyDisconnected)));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let converter = Converter::new("127.0.0.1", port);
        assert!(converter.connect().await.is_err());
        assert_eq!(converter.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dropped_connect_leaves_disconnected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let converter = Converter::new("127.0.0.1", port);

        // Poll once, then give up on it
        tokio::select! {
            biased;
            _ = converter.connect() => {}
            _ = async {} => {}
        }

        assert_eq!(converter.state(), ConnectionState::Disconnected);
        assert!(matches!(converter.disconnect().await, Err(Error::AlreadyDisconnected)));
        assert!(converter.link.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_teardown_keeps_newer_link() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let converter = Converter::new("127.0.0.1", port);

        let mut transport = TcpTransport::new("127.0.0.1", port);
        let (link, accepted) = tokio::join!(transport.connect(), listener.accept());
        let (_reader, writer) = link.unwrap();
        let _peer = accepted.unwrap();
        *converter.link.lock().await = Some(Link { generation: 3, writer });

        // Teardown of link 2 running after link 3 was opened
        converter.teardown(2, "disconnected").await;
        assert!(
            converter
                .link
                .lock()
                .await
                .as_ref()
                .is_some_and(|link| link.generation == 3 && link.writer.is_open())
        );

        converter.teardown(3, "disconnected").await;
        assert!(converter.link.lock().await.is_none());
    }
}
