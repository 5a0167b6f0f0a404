use std::future::Future;
use std::time::Duration;

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, ACCEPT_LANGUAGE,
    CONNECTION, CONTENT_DISPOSITION, CONTENT_TYPE, REFERER, USER_AGENT,
};
use reqwest::{Client, Url};

use super::policy::{is_download, PortalDomains};

/// What came back from a single GET, after redirects.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub requested: Url,
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    /// Only captured for portal hosts serving something other than a download.
    pub body: Option<String>,
}

/// Why a GET produced no usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Connect(String),
    Other(String),
}

pub type ProbeOutcome = Result<ProbeResponse, ProbeFailure>;

impl From<reqwest::Error> for ProbeFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeFailure::Timeout
        } else if e.is_connect() {
            ProbeFailure::Connect(error_chain(&e))
        } else {
            ProbeFailure::Other(error_chain(&e))
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

/// One network round trip per call. No retries.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, url: &str) -> impl Future<Output = ProbeOutcome> + Send;
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub body_limit: usize,
    pub user_agent: String,
    pub accept_language: String,
    pub accept: String,
    pub referer: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            timeout: Duration::from_secs(15),
            max_redirects: 10,
            body_limit: 512 * 1024,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36"
                .into(),
            accept_language: "es-CL,es;q=0.9,en;q=0.8".into(),
            accept: "*/*".into(),
            referer: "https://www.portaltransparencia.cl/".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeSetupError {
    #[error("invalid value for header {0}")]
    Header(&'static str, #[source] InvalidHeaderValue),
    #[error("failed to build HTTP client")]
    Client(#[from] reqwest::Error),
}

/// `reqwest`-backed probe. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    portals: PortalDomains,
    body_limit: usize,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig, portals: PortalDomains) -> Result<Self, ProbeSetupError> {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, ACCEPT, "Accept", &config.accept)?;
        insert_header(&mut headers, ACCEPT_LANGUAGE, "Accept-Language", &config.accept_language)?;
        insert_header(&mut headers, REFERER, "Referer", &config.referer)?;
        insert_header(&mut headers, USER_AGENT, "User-Agent", &config.user_agent)?;
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .default_headers(headers)
            .build()?;

        Ok(HttpProbe {
            client,
            portals,
            body_limit: config.body_limit,
        })
    }

    async fn fetch(&self, url: &str) -> ProbeOutcome {
        let requested =
            Url::parse(url).map_err(|e| ProbeFailure::Other(format!("invalid url {}: {}", url, e)))?;

        let resp = self.client.get(requested.clone()).send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().clone();
        let content_type = header_text(resp.headers(), CONTENT_TYPE);
        let content_disposition = header_text(resp.headers(), CONTENT_DISPOSITION);

        let portal = self.portals.matches(&requested) || self.portals.matches(&final_url);
        let body = if portal && !is_download(content_type.as_deref(), content_disposition.as_deref())
        {
            Some(read_capped(resp, self.body_limit).await?)
        } else {
            None
        };

        Ok(ProbeResponse {
            requested,
            final_url,
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.fetch(url).await
    }
}

fn insert_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    label: &'static str,
    value: &str,
) -> Result<(), ProbeSetupError> {
    let value = HeaderValue::from_str(value).map_err(|e| ProbeSetupError::Header(label, e))?;
    headers.insert(name, value);
    Ok(())
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Read at most `limit` bytes of the body, decoding lossily.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<String, ProbeFailure> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = limit.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= limit {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn reply(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
        for (k, v) in headers {
            out.push_str(&format!("{}: {}\r\n", k, v));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    fn route(path: &str) -> String {
        match path {
            "/" => reply("200 OK", &[("Content-Type", "text/html")], "<html>home</html>"),
            "/doc" => reply("200 OK", &[("Content-Type", "text/html")], "<html>doc</html>"),
            "/moved" => reply("302 Found", &[("Location", "/")], ""),
            "/login" => reply("401 Unauthorized", &[], ""),
            "/file.pdf" => reply("200 OK", &[("Content-Type", "application/pdf")], "%PDF-1.4"),
            "/denied" => reply(
                "200 OK",
                &[("Content-Type", "text/html")],
                "<html><body>Acceso denegado</body></html>",
            ),
            _ => reply("404 Not Found", &[], "nope"),
        }
    }

    async fn serve() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    let head = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    if path == "/slow" {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    let _ = sock.write_all(route(&path).as_bytes()).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        addr
    }

    fn probe_with(portals: &[&str], timeout: Duration) -> HttpProbe {
        let config = ProbeConfig {
            timeout,
            ..ProbeConfig::default()
        };
        HttpProbe::new(&config, PortalDomains::new(portals)).unwrap()
    }

    #[tokio::test]
    async fn plain_ok_and_not_found() {
        let addr = serve().await;
        let probe = probe_with(&[], Duration::from_secs(5));

        let ok = probe.probe(&format!("http://{}/doc", addr)).await.unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(ok.final_url.path(), "/doc");
        assert!(ok.body.is_none());

        let missing = probe.probe(&format!("http://{}/gone", addr)).await.unwrap();
        assert_eq!(missing.status, 404);

        let auth = probe.probe(&format!("http://{}/login", addr)).await.unwrap();
        assert_eq!(auth.status, 401);
    }

    #[tokio::test]
    async fn follows_redirects() {
        let addr = serve().await;
        let probe = probe_with(&[], Duration::from_secs(5));
        let resp = probe.probe(&format!("http://{}/moved", addr)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.final_url.path(), "/");
        assert_eq!(resp.requested.path(), "/moved");
    }

    #[tokio::test]
    async fn portal_body_only_when_not_a_download() {
        let addr = serve().await;
        let probe = probe_with(&["127.0.0.1"], Duration::from_secs(5));

        let pdf = probe.probe(&format!("http://{}/file.pdf", addr)).await.unwrap();
        assert_eq!(pdf.content_type.as_deref(), Some("application/pdf"));
        assert!(pdf.body.is_none());

        let denied = probe.probe(&format!("http://{}/denied", addr)).await.unwrap();
        assert!(denied.body.unwrap().contains("Acceso denegado"));
    }

    #[tokio::test]
    async fn body_is_capped() {
        let addr = serve().await;
        let config = ProbeConfig {
            body_limit: 6,
            ..ProbeConfig::default()
        };
        let probe = HttpProbe::new(&config, PortalDomains::new(["127.0.0.1"])).unwrap();
        let resp = probe.probe(&format!("http://{}/denied", addr)).await.unwrap();
        assert_eq!(resp.body.as_deref(), Some("<html>"));
    }

    #[tokio::test]
    async fn timeout_without_response() {
        let addr = serve().await;
        let probe = probe_with(&[], Duration::from_millis(300));
        let err = probe.probe(&format!("http://{}/slow", addr)).await.unwrap_err();
        assert_eq!(err, ProbeFailure::Timeout);
    }

    #[tokio::test]
    async fn refused_connection() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let probe = probe_with(&[], Duration::from_secs(5));
        let err = probe.probe(&format!("http://127.0.0.1:{}/x", port)).await.unwrap_err();
        assert!(matches!(err, ProbeFailure::Connect(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn unresolvable_host_is_connect_failure() {
        let probe = probe_with(&[], Duration::from_secs(5));
        let err = probe.probe("http://no-such-host-zz.invalid/x").await.unwrap_err();
        assert!(matches!(err, ProbeFailure::Connect(_)), "{:?}", err);
        assert_eq!(
            crate::check::ClassifyPolicy::default().decide(&Err(err)),
            crate::check::Label::NetworkOrDnsFailure
        );
    }

    #[tokio::test]
    async fn malformed_url_is_other() {
        let probe = probe_with(&[], Duration::from_secs(1));
        let err = probe.probe("http://exa mple.cl/x").await.unwrap_err();
        assert!(matches!(err, ProbeFailure::Other(_)));
    }

    #[test]
    fn bad_header_value_is_rejected() {
        let config = ProbeConfig {
            referer: "bad\nvalue".into(),
            ..ProbeConfig::default()
        };
        let err = HttpProbe::new(&config, PortalDomains::default()).unwrap_err();
        assert!(matches!(err, ProbeSetupError::Header("Referer", _)));
    }
}
