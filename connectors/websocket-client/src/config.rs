use std::time::Duration;
use url::Url;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const SOCKET_PATH: &str = "/realtime/v1/websocket";
const PROTOCOL_VERSION: &str = "1.0.0";

#[derive(Debug, Clone)]
pub struct WebsocketConfig {
    /// Project endpoint, e.g. `https://abc.example.co` or a full `wss://` socket url
    pub endpoint: String,
    pub api_key: String,
    /// Database schema the watched tables live in
    pub schema: String,
    pub heartbeat_interval: Duration,
    /// Budget for the websocket handshake plus the join reply before reporting `timed_out`
    pub join_timeout: Duration,
}

impl WebsocketConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            schema: "public".to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// The websocket url including the api key and protocol version query parameters
    pub fn socket_url(&self) -> Result<Url, url::ParseError> {
        let base = match self.endpoint.trim_end_matches('/') {
            u if u.starts_with("ws://") || u.starts_with("wss://") => u.to_string(),
            u if u.starts_with("http://") => format!("ws://{}", &u[7..]),
            u if u.starts_with("https://") => format!("wss://{}", &u[8..]),
            u => format!("wss://{}", u),
        };
        let base = if base.ends_with("/websocket") { base } else { format!("{}{}", base, SOCKET_PATH) };

        let mut url = Url::parse(&base)?;
        url.query_pairs_mut().append_pair("apikey", &self.api_key).append_pair("vsn", PROTOCOL_VERSION);
        Ok(url)
    }
}
