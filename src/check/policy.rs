use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::label::Label;
use super::probe::{ProbeFailure, ProbeOutcome, ProbeResponse};

/// What a request that timed out without any response counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Reported as "likely operational, no response".
    #[default]
    Flag,
    /// Treated as operational and dropped from the report.
    Pass,
    /// Treated like a network failure.
    Fail,
}

/// Transparency-portal hosts that get bespoke download / access-denied rules.
#[derive(Debug, Clone, Default)]
pub struct PortalDomains(Vec<String>);

impl PortalDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PortalDomains(
            domains
                .into_iter()
                .map(|d| d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        )
    }

    /// Exact host or any subdomain of a listed domain.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.0.iter().any(|d| {
            host == *d
                || (host.len() > d.len()
                    && host.ends_with(d.as_str())
                    && host.as_bytes()[host.len() - d.len() - 1] == b'.')
        })
    }
}

/// Maps a probe outcome onto the label taxonomy. Pure; no I/O.
#[derive(Debug, Clone)]
pub struct ClassifyPolicy {
    pub portals: PortalDomains,
    pub denial_markers: Vec<String>,
    pub home_paths: Vec<String>,
    pub timeout: TimeoutPolicy,
}

impl Default for ClassifyPolicy {
    fn default() -> Self {
        ClassifyPolicy {
            portals: PortalDomains::new(["portaltransparencia.cl", "transparencia.cl"]),
            denial_markers: vec!["acceso denegado".into(), "access denied".into()],
            home_paths: vec!["".into(), "index.html".into(), "home".into()],
            timeout: TimeoutPolicy::Flag,
        }
    }
}

impl ClassifyPolicy {
    pub fn decide(&self, outcome: &ProbeOutcome) -> Label {
        match outcome {
            Ok(resp) => self.decide_response(resp),
            Err(ProbeFailure::Connect(_)) => Label::NetworkOrDnsFailure,
            Err(ProbeFailure::Timeout) => match self.timeout {
                TimeoutPolicy::Flag => Label::LikelyOperationalNoResponse,
                TimeoutPolicy::Pass => Label::Operational,
                TimeoutPolicy::Fail => Label::NetworkOrDnsFailure,
            },
            Err(ProbeFailure::Other(msg)) => {
                warn!(error = %msg, "probe failed with an unclassified error");
                Label::UnknownError
            }
        }
    }

    pub fn is_portal(&self, resp: &ProbeResponse) -> bool {
        self.portals.matches(&resp.requested) || self.portals.matches(&resp.final_url)
    }

    fn decide_response(&self, resp: &ProbeResponse) -> Label {
        if self.is_portal(resp) {
            if is_download(resp.content_type.as_deref(), resp.content_disposition.as_deref()) {
                return Label::Operational;
            }
            if let Some(body) = &resp.body {
                if self.is_access_denied(body) {
                    return Label::Forbidden;
                }
            }
        }

        match resp.status {
            200 => {
                let path = resp.final_url.path().trim_matches('/');
                if self.home_paths.iter().any(|p| p == path) {
                    Label::RedirectsToHome
                } else {
                    Label::Operational
                }
            }
            401 => Label::RequiresAuthentication,
            403 => Label::Forbidden,
            404 => Label::NotFound,
            s if s >= 500 => Label::ServerError,
            s => Label::OtherHttpError(s),
        }
    }

    fn is_access_denied(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        lower.contains("<html") && self.denial_markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

/// Binary payloads served by portals count as working links.
pub(crate) fn is_download(content_type: Option<&str>, disposition: Option<&str>) -> bool {
    let ctype = content_type.unwrap_or("").to_ascii_lowercase();
    let disposition = disposition.unwrap_or("").to_ascii_lowercase();
    ctype.contains("application/pdf")
        || ctype.contains("octet-stream")
        || disposition.contains("attachment")
}
