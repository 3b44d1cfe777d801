//! HTTP(S) fetches with a blocking client.
//!
//! Credentials come from the prefix URL's userinfo (`https://user:pw@host/`)
//! or from the `user`/`password` parameters, which take precedence. Proxies
//! are picked up from the environment unless one is configured explicitly;
//! a proxy of `none` disables them.

use reqwest::blocking::Client;
use url::Url;

use crate::script::shell_quote;
use crate::{Transport, TransportError, TransportParams};

/// Fetches over HTTP or HTTPS.
#[derive(Debug)]
pub struct HttpTransport {
    params: TransportParams,
    /// Prefix URL without credentials, always ending in `/`
    base: Option<Url>,
    credentials: Option<(String, Option<String>)>,
    client: Option<Client>,
    error: Option<String>,
}

impl HttpTransport {
    pub fn new(params: TransportParams) -> Self {
        let mut transport = Self {
            params,
            base: None,
            credentials: None,
            client: None,
            error: None,
        };

        match transport.parse_base() {
            Ok((base, url_credentials)) => {
                transport.credentials = transport.param_credentials().or(url_credentials);
                transport.base = Some(base);
            }
            Err(reason) => transport.error = Some(reason),
        }

        match transport.build_client() {
            Ok(client) => transport.client = Some(client),
            Err(reason) => {
                transport.error.get_or_insert(reason);
            }
        }

        transport
    }

    /// Registry factory.
    pub fn boxed(params: TransportParams) -> Box<dyn Transport> {
        Box::new(Self::new(params))
    }

    /// The credential-free base URL, if the prefix parsed.
    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    fn parse_base(&self) -> Result<(Url, Option<(String, Option<String>)>), String> {
        let mut prefix = self.params.prefix.clone();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }

        let mut url = Url::parse(&prefix).map_err(|e| format!("invalid URL '{}': {}", self.params.prefix, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme '{}'", url.scheme()));
        }

        let credentials = if url.username().is_empty() {
            None
        } else {
            Some((url.username().to_string(), url.password().map(str::to_string)))
        };

        // set_username/set_password only fail for cannot-be-a-base URLs,
        // which http(s) never are
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Ok((url, credentials))
    }

    fn param_credentials(&self) -> Option<(String, Option<String>)> {
        self.params
            .user
            .as_ref()
            .map(|user| (user.clone(), self.params.password.clone()))
    }

    fn build_client(&self) -> Result<Client, String> {
        let mut builder = Client::builder()
            .timeout(self.params.timeout)
            .user_agent(concat!("hostpol/", env!("CARGO_PKG_VERSION")));

        match self.params.proxy.as_deref() {
            None => {}
            Some("none") | Some("off") => builder = builder.no_proxy(),
            Some(proxy) => {
                let proxy = reqwest::Proxy::all(proxy).map_err(|e| format!("invalid proxy '{}': {}", proxy, e))?;
                builder = builder.proxy(proxy);
            }
        }

        builder.build().map_err(|e| format!("cannot build HTTP client: {}", e))
    }

    /// Resolve `prefix + file` against the base, or take `file` as-is when it
    /// is already a full URL.
    fn resolve(&self, prefix: &str, file: &str) -> Result<Url, TransportError> {
        if file.contains("://") {
            return Url::parse(file).map_err(|e| TransportError::Http {
                url: file.to_string(),
                reason: e.to_string(),
            });
        }

        let base = self.base.as_ref().ok_or_else(|| self.unavailable())?;
        let relative = format!("{}{}", prefix, file);
        base.join(&relative).map_err(|e| TransportError::Http {
            url: relative,
            reason: e.to_string(),
        })
    }

    fn unavailable(&self) -> TransportError {
        TransportError::Unavailable {
            name: self.name().to_string(),
            reason: self.error.clone().unwrap_or_else(|| "not initialized".to_string()),
        }
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn is_available(&mut self) -> bool {
        self.base.is_some() && self.client.is_some()
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn fetch_contents(&self, prefix: &str, file: &str) -> Result<Vec<u8>, TransportError> {
        let client = self.client.as_ref().ok_or_else(|| self.unavailable())?;
        let url = self.resolve(prefix, file)?;
        tracing::debug!(%url, "http fetch");

        let mut request = client.get(url.clone());
        if let Some((ref user, ref password)) = self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().map_err(|e| TransportError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|e| TransportError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(body.to_vec())
    }

    fn bootstrap_script(&self) -> String {
        let base = self
            .base
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| self.params.prefix.clone());
        let timeout = self.params.timeout.as_secs().max(1);

        let (curl_auth, wget_auth) = match self.credentials {
            Some((ref user, ref password)) => {
                let pair = format!("{}:{}", user, password.as_deref().unwrap_or(""));
                let mut wget = format!(" --user={}", shell_quote(user));
                if let Some(ref password) = password {
                    wget.push_str(&format!(" --password={}", shell_quote(password)));
                }
                (format!(" -u {}", shell_quote(&pair)), wget)
            }
            None => (String::new(), String::new()),
        };

        format!(
            r#"HOSTPOL_SOURCE={base}
if command -v curl >/dev/null 2>&1; then
    fetch_file() {{
        curl -fsS --max-time {timeout}{curl_auth} "${{HOSTPOL_SOURCE}}files/$1"
    }}
elif command -v wget >/dev/null 2>&1; then
    fetch_file() {{
        wget -q -T {timeout}{wget_auth} -O - "${{HOSTPOL_SOURCE}}files/$1"
    }}
else
    echo "hostpol: http transport unavailable: neither curl nor wget found" >&2
    exit 1
fi
"#,
            base = shell_quote(&base),
        )
    }
}
