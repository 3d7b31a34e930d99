use percent_encoding::percent_decode_str;
use std::time::Duration;
use url::Url;

/// HTTP connection settings used when a store is resolved from an address.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Per-request timeout
    pub request_timeout: Option<Duration>,

    /// Username for basic authentication (overrides credentials in the URL)
    pub username: Option<String>,

    /// Password for basic authentication
    pub password: Option<String>,

    pub user_agent: String,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(60)),
            username: None,
            password: None,
            user_agent: format!("couchforce/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set basic-auth credentials
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0".to_string());
        }

        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err("request_timeout must be > 0".to_string());
        }

        if self.username.is_some() != self.password.is_some() {
            return Err("username and password must be set together".to_string());
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed CouchDB address.
///
/// Format: `http[s]://[username:password@]host[:port][/prefix..]/database`.
/// The last path segment names the database; any earlier segments stay on
/// the server root, for servers mounted behind a path prefix. The database
/// is optional here; resolution rejects addresses without one.
#[derive(Debug, Clone, PartialEq)]
pub struct CouchAddress {
    /// Server root, without credentials, query or database segment
    pub server: Url,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl CouchAddress {
    pub fn parse(address: &str) -> Result<Self, String> {
        let mut url = Url::parse(address).map_err(|err| format!("{}: {}", address, err))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported scheme '{}'", url.scheme()));
        }

        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(format!("Address '{}' has no host", address));
        }

        let username = match url.username() {
            "" => None,
            name => Some(percent_decode(name)),
        };
        let password = url.password().map(percent_decode);

        let mut segments = url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .map(percent_decode)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let database = segments.pop();

        url.set_username("")
            .map_err(|_| "Cannot strip username from address".to_string())?;
        url.set_password(None)
            .map_err(|_| "Cannot strip password from address".to_string())?;
        url.path_segments_mut()
            .map_err(|_| format!("Address '{}' has no path", address))?
            .clear()
            .extend(&segments);
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            server: url,
            database,
            username,
            password,
        })
    }

    /// Convert back to an address string, with the password masked
    pub fn to_url(&self) -> String {
        let mut url = self.server.clone();
        if let Some(username) = &self.username {
            let password = self.password.as_ref().map(|_| "***");
            // Leave credentials out entirely if the url refuses them
            if url.set_username(username).is_err() || url.set_password(password).is_err() {
                url = self.server.clone();
            }
        }
        if let Some(database) = &self.database {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(database);
            }
        }
        url.to_string()
    }
}

fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}
