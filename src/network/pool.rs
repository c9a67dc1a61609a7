// src/network/pool.rs

//! Mining pool client implementation
//!
//! Speaks the Monero stratum dialect (JSON-RPC `login`, `job`, `submit`,
//! `keepalived`) over WebSocket. Jobs go to the engine through a
//! [`MinerHandle`]; shares come back on a crossbeam channel and are bridged
//! into the async loop.
use crate::miner::controller::MinerHandle;
use crate::miner::job::{Job, JobMessage, ShareSubmission};
use crate::utils::error::MinerError;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::Message;
use url::Url;

/// Interval between `keepalived` requests
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered requests remembered per connection; older ones are forgotten
const MAX_PENDING: usize = 256;

type PoolStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for connecting to a mining pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool connection URL (e.g., "wss://pool.example.com:3333")
    pub url: String,
    /// Wallet address or pool username
    pub user: String,
    /// Worker password (often "x" if not required)
    #[serde(default = "default_password")]
    pub password: String,
    /// Worker identifier sent as `rigid`
    #[serde(default)]
    pub worker_id: String,
}

fn default_password() -> String {
    "x".into()
}

/// What a pool message means for the miner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// Login succeeded; the pool may attach the first job
    LoggedIn {
        /// Session id used in later requests
        session: String,
        /// First job, if the pool sent one with the login result
        job: Option<JobMessage>,
    },
    /// New job notification
    Job(JobMessage),
    /// A submitted share was accepted
    Accepted,
    /// A submitted share was rejected
    Rejected(String),
    /// Anything the miner does not act on (keepalive replies, unknown methods)
    Ignored,
}

/// Kind of an outstanding request, keyed by JSON-RPC id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Login,
    Submit,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    id: String,
    #[serde(default)]
    job: Option<JobMessage>,
}

/// Protocol state of one pool connection, independent of the socket
#[derive(Debug)]
pub struct Session {
    next_id: u64,
    pending: BTreeMap<u64, Request>,
    session_id: Option<String>,
}

impl Session {
    /// Fresh, logged-out session
    pub fn new() -> Self {
        Session {
            next_id: 1,
            pending: BTreeMap::new(),
            session_id: None,
        }
    }

    /// Session id handed out by the pool at login
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn message(&mut self, method: &str, params: Value) -> (u64, Value) {
        let id = self.next_id;
        self.next_id += 1;
        (id, json!({ "id": id, "jsonrpc": "2.0", "method": method, "params": params }))
    }

    /// Builds a request whose reply must be matched back to `kind`
    fn request(&mut self, kind: Request, method: &str, params: Value) -> Value {
        let (id, message) = self.message(method, params);
        self.pending.insert(id, kind);
        while self.pending.len() > MAX_PENDING {
            if let Some((id, kind)) = self.pending.pop_first() {
                log::warn!("Pool never answered {:?} request {}", kind, id);
            }
        }
        message
    }

    /// `login` request
    pub fn login(&mut self, config: &PoolConfig) -> Value {
        self.request(
            Request::Login,
            "login",
            json!({
                "login": config.user,
                "pass": config.password,
                "agent": format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                "rigid": config.worker_id,
            }),
        )
    }

    /// `submit` request, or `None` before login completed
    pub fn submit(&mut self, share: &ShareSubmission) -> Option<Value> {
        let session = self.session_id.clone()?;
        let share = share.to_message();
        Some(self.request(
            Request::Submit,
            "submit",
            json!({
                "id": session,
                "job_id": share.job_id,
                "nonce": share.nonce,
                "result": share.result,
            }),
        ))
    }

    /// `keepalived` request, or `None` before login completed
    ///
    /// Replies carry nothing the miner acts on, so the id is not tracked.
    pub fn keepalive(&mut self) -> Option<Value> {
        let session = self.session_id.clone()?;
        let (_, message) = self.message("keepalived", json!({ "id": session }));
        Some(message)
    }

    /// Interprets one text frame from the pool
    ///
    /// # Errors
    /// - `JsonError` for frames that are not JSON-RPC
    /// - `ConnectionError` when the pool refuses the login
    /// - `ProtocolError` for malformed results
    pub fn on_message(&mut self, text: &str) -> Result<PoolEvent, MinerError> {
        let raw: RawMessage = serde_json::from_str(text)?;

        if let Some(method) = raw.method.as_deref() {
            return match method {
                "job" => {
                    let params = raw
                        .params
                        .ok_or_else(|| MinerError::ProtocolError("job without params".into()))?;
                    Ok(PoolEvent::Job(serde_json::from_value(params)?))
                }
                other => {
                    log::warn!("Unknown method received: {}", other);
                    Ok(PoolEvent::Ignored)
                }
            };
        }

        let Some(request) = raw.id.and_then(|id| self.pending.remove(&id)) else {
            log::debug!("Unsolicited pool response: {}", text);
            return Ok(PoolEvent::Ignored);
        };

        match request {
            Request::Login => {
                if let Some(error) = raw.error {
                    return Err(MinerError::ConnectionError(format!(
                        "Login refused ({}): {}",
                        error.code, error.message
                    )));
                }
                let result = raw
                    .result
                    .ok_or_else(|| MinerError::ProtocolError("login without result".into()))?;
                let login: LoginResult = serde_json::from_value(result)?;
                self.session_id = Some(login.id.clone());
                Ok(PoolEvent::LoggedIn {
                    session: login.id,
                    job: login.job,
                })
            }
            Request::Submit => match raw.error {
                Some(error) => Ok(PoolEvent::Rejected(error.message)),
                None => {
                    let status = raw
                        .result
                        .as_ref()
                        .and_then(|r| r.get("status"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if status.eq_ignore_ascii_case("OK") {
                        Ok(PoolEvent::Accepted)
                    } else {
                        Ok(PoolEvent::Rejected(format!("unexpected status '{}'", status)))
                    }
                }
            },
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for communicating with a mining pool
///
/// Handles all pool protocol interactions including:
/// - Connection management
/// - Job hand-off to the engine
/// - Share submission and feedback
/// - Keepalive messages
pub struct PoolClient {
    /// Pool connection configuration
    config: PoolConfig,
    /// Engine the jobs are dispatched to
    miner: MinerHandle,
    /// WebSocket connection, taken by `run`
    connection: Option<PoolStream>,
    session: Session,
}

impl PoolClient {
    /// Creates a new PoolClient instance
    ///
    /// # Arguments
    /// * `config` - Pool connection configuration
    /// * `miner` - Engine that receives jobs and pool feedback
    pub fn new(config: PoolConfig, miner: MinerHandle) -> Self {
        PoolClient {
            config,
            miner,
            connection: None,
            session: Session::new(),
        }
    }

    /// Establishes connection to the mining pool
    ///
    /// # Errors
    /// Returns `MinerError` if:
    /// - URL is invalid
    /// - DNS resolution fails
    /// - WebSocket handshake fails
    pub async fn connect(&mut self) -> Result<(), MinerError> {
        let url_str = &self.config.url;
        let url = Url::parse(url_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid URL '{}': {}", url_str, e)))?;

        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(MinerError::ConfigError(format!(
                "Pool URL '{}' must use ws:// or wss://",
                url_str
            )));
        }

        match tokio_tungstenite::connect_async(url_str.as_str()).await {
            Ok((ws_stream, _)) => {
                log::info!("Connected to pool {}", url_str);
                self.connection = Some(ws_stream);
                Ok(())
            }
            Err(e) if e.to_string().contains("dns error") => Err(MinerError::ConnectionError(
                format!("DNS resolution failed. Check pool URL: {}", url_str),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Main event loop for pool communication
    ///
    /// Logs in, then multiplexes pool messages, shares from the engine and
    /// the keepalive timer until either side goes away. The engine is told
    /// about a closed connection before this returns.
    ///
    /// # Arguments
    /// * `shares` - Shares found by the engine
    pub async fn run(
        &mut self,
        shares: crossbeam_channel::Receiver<ShareSubmission>,
    ) -> Result<(), MinerError> {
        let mut ws = self
            .connection
            .take()
            .ok_or(MinerError::ConnectionError("Not connected".into()))?;

        let result = self.drive(&mut ws, bridge_shares(shares)).await;

        let reason = match &result {
            Ok(()) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };
        // The engine may already be gone during shutdown
        let _ = self.miner.pool_closed(reason);
        result
    }

    async fn drive(
        &mut self,
        ws: &mut PoolStream,
        mut shares: mpsc::UnboundedReceiver<ShareSubmission>,
    ) -> Result<(), MinerError> {
        let login = self.session.login(&self.config);
        send(ws, &login).await?;

        let mut keepalive = time::interval(KEEPALIVE_INTERVAL);
        keepalive.tick().await;

        loop {
            tokio::select! {
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text).await?,
                    Some(Ok(Message::Close(frame))) => {
                        log::warn!("Pool closed the connection: {:?}", frame);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
                share = shares.recv() => match share {
                    Some(share) => match self.session.submit(&share) {
                        Some(request) => send(ws, &request).await?,
                        None => log::warn!("Dropping share for job {}: not logged in", share.job_id),
                    },
                    None => {
                        log::info!("Miner stopped, leaving pool");
                        // Best effort, the socket may already be gone
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                },
                _ = keepalive.tick() => {
                    if let Some(request) = self.session.keepalive() {
                        send(ws, &request).await?;
                    }
                }
            }
        }
    }

    /// Handles one incoming frame
    ///
    /// # Errors
    /// Returns `MinerError` when the login is refused or the engine cannot
    /// take the job (context build failure, engine stopped).
    async fn handle_message(&mut self, text: &str) -> Result<(), MinerError> {
        let event = match self.session.on_message(text) {
            Ok(event) => event,
            Err(e @ MinerError::ConnectionError(_)) => return Err(e),
            Err(e) => {
                log::warn!("Ignoring malformed pool message: {}", e);
                return Ok(());
            }
        };

        match event {
            PoolEvent::LoggedIn { session, job } => {
                log::info!("Logged in to pool as {} (session {})", self.config.user, session);
                if let Some(job) = job {
                    self.dispatch(job).await?;
                }
            }
            PoolEvent::Job(job) => self.dispatch(job).await?,
            PoolEvent::Accepted => {
                log::info!("Share accepted");
                self.miner.share_accepted()?;
            }
            PoolEvent::Rejected(reason) => self.miner.share_rejected(reason)?,
            PoolEvent::Ignored => {}
        }
        Ok(())
    }

    /// Hands a job to the engine
    ///
    /// Runs on the blocking pool since a seed change rebuilds the dataset.
    async fn dispatch(&self, message: JobMessage) -> Result<(), MinerError> {
        let job = match Job::try_from(message) {
            Ok(job) => job,
            Err(e) => {
                log::warn!("Skipping job: {}", e);
                return Ok(());
            }
        };

        let miner = self.miner.clone();
        tokio::task::spawn_blocking(move || miner.submit_job(job)).await??;
        Ok(())
    }
}

/// Moves shares from the engine's crossbeam channel onto a tokio channel
///
/// The bridge thread ends once either side is dropped.
fn bridge_shares(
    shares: crossbeam_channel::Receiver<ShareSubmission>,
) -> mpsc::UnboundedReceiver<ShareSubmission> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for share in shares {
            if tx.send(share).is_err() {
                break;
            }
        }
    });
    rx
}

/// Internal helper for sending JSON messages over WebSocket
async fn send(ws: &mut PoolStream, value: &Value) -> Result<(), MinerError> {
    ws.send(Message::Text(value.to_string().into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig {
            url: "wss://pool.example.com:3333".into(),
            user: "wallet".into(),
            password: "x".into(),
            worker_id: "rig01".into(),
        }
    }

    fn logged_in() -> Session {
        let mut session = Session::new();
        session.login(&config());
        session
            .on_message(r#"{"id":1,"jsonrpc":"2.0","error":null,"result":{"id":"s1","status":"OK"}}"#)
            .unwrap();
        session
    }

    fn share() -> ShareSubmission {
        ShareSubmission {
            job_id: "A".into(),
            nonce: 0x0100_0000,
            result: [0xab; 32],
        }
    }

    #[test]
    fn test_login_request() {
        let request = Session::new().login(&config());

        assert_eq!(request["id"], 1);
        assert_eq!(request["method"], "login");
        assert_eq!(request["params"]["login"], "wallet");
        assert_eq!(request["params"]["pass"], "x");
        assert_eq!(request["params"]["rigid"], "rig01");
    }

    #[test]
    fn test_login_result_carries_first_job() {
        let mut session = Session::new();
        session.login(&config());

        let event = session
            .on_message(
                r#"{"id":1,"jsonrpc":"2.0","error":null,"result":{"id":"s1","status":"OK",
                    "job":{"job_id":"A","blob":"00","target":"f33c0000","seed_hash":"aa"}}}"#,
            )
            .unwrap();

        let PoolEvent::LoggedIn { session: id, job } = event else {
            panic!("expected a login result");
        };
        assert_eq!(id, "s1");
        assert_eq!(job.unwrap().target, "f33c0000");
        assert_eq!(session.session_id(), Some("s1"));
    }

    #[test]
    fn test_refused_login_is_an_error() {
        let mut session = Session::new();
        session.login(&config());

        let err = session
            .on_message(r#"{"id":1,"error":{"code":-1,"message":"invalid address"}}"#)
            .unwrap_err();
        assert!(matches!(err, MinerError::ConnectionError(_)));
    }

    #[test]
    fn test_job_notification() {
        let event = logged_in()
            .on_message(
                r#"{"jsonrpc":"2.0","method":"job","params":{"job_id":"B","blob":"0707","target":"ffffffff"}}"#,
            )
            .unwrap();

        assert_eq!(
            event,
            PoolEvent::Job(JobMessage {
                job_id: "B".into(),
                blob: "0707".into(),
                target: "ffffffff".into(),
                seed_hash: None,
            })
        );
    }

    #[test]
    fn test_submit_feedback() {
        let mut session = logged_in();

        let first = session.submit(&share()).unwrap();
        assert_eq!(first["params"]["id"], "s1");
        assert_eq!(first["params"]["nonce"], "00000001");
        let second = session.submit(&share()).unwrap();

        let accepted = format!(r#"{{"id":{},"error":null,"result":{{"status":"OK"}}}}"#, first["id"]);
        let rejected = format!(
            r#"{{"id":{},"error":{{"code":-1,"message":"Low difficulty share"}}}}"#,
            second["id"]
        );

        assert_eq!(session.on_message(&accepted).unwrap(), PoolEvent::Accepted);
        assert_eq!(
            session.on_message(&rejected).unwrap(),
            PoolEvent::Rejected("Low difficulty share".into())
        );
    }

    #[test]
    fn test_no_submit_or_keepalive_before_login() {
        let mut session = Session::new();
        assert!(session.submit(&share()).is_none());
        assert!(session.keepalive().is_none());
    }

    #[test]
    fn test_keepalive_reply_is_ignored() {
        let mut session = logged_in();
        let request = session.keepalive().unwrap();
        assert_eq!(request["method"], "keepalived");

        let reply = format!(r#"{{"id":{},"result":{{"status":"KEEPALIVED"}}}}"#, request["id"]);
        assert_eq!(session.on_message(&reply).unwrap(), PoolEvent::Ignored);
    }

    #[test]
    fn test_unanswered_keepalives_are_not_tracked() {
        let mut session = logged_in();
        for _ in 0..1_000 {
            session.keepalive().unwrap();
        }

        assert!(session.pending.is_empty());
    }

    #[test]
    fn test_unanswered_submits_are_capped() {
        let mut session = logged_in();
        let first = session.submit(&share()).unwrap();
        let last = (0..MAX_PENDING + 10)
            .map(|_| session.submit(&share()).unwrap())
            .last()
            .unwrap();

        assert_eq!(session.pending.len(), MAX_PENDING);

        // The oldest submit was forgotten, the newest still resolves
        let late = format!(r#"{{"id":{},"result":{{"status":"OK"}}}}"#, first["id"]);
        assert_eq!(session.on_message(&late).unwrap(), PoolEvent::Ignored);
        let reply = format!(r#"{{"id":{},"result":{{"status":"OK"}}}}"#, last["id"]);
        assert_eq!(session.on_message(&reply).unwrap(), PoolEvent::Accepted);
    }

    #[test]
    fn test_unsolicited_response_is_ignored() {
        let mut session = logged_in();
        assert_eq!(
            session.on_message(r#"{"id":99,"result":{"status":"OK"}}"#).unwrap(),
            PoolEvent::Ignored
        );
        assert!(session.on_message("not json").is_err());
    }
}
