pub mod label;
pub mod policy;
pub mod probe;

use std::future::Future;

use tracing::debug;

use crate::extract::UrlCandidate;
pub use label::{Label, Taxonomy};
pub use policy::{ClassifyPolicy, PortalDomains, TimeoutPolicy};
pub use probe::{HttpProbe, Probe, ProbeConfig, ProbeFailure, ProbeOutcome, ProbeResponse};

/// Turns a candidate URL into a label. The row processor only sees this seam.
pub trait Classify: Send + Sync + 'static {
    fn classify(&self, url: &UrlCandidate) -> impl Future<Output = Label> + Send;
}

/// Probe → policy: one network round trip, then a pure decision.
pub struct LinkClassifier<P = HttpProbe> {
    probe: P,
    policy: ClassifyPolicy,
}

impl<P: Probe> LinkClassifier<P> {
    pub fn new(probe: P, policy: ClassifyPolicy) -> Self {
        LinkClassifier { probe, policy }
    }

    pub fn policy(&self) -> &ClassifyPolicy {
        &self.policy
    }
}

impl<P: Probe> Classify for LinkClassifier<P> {
    async fn classify(&self, url: &UrlCandidate) -> Label {
        let outcome = self.probe.probe(url.as_str()).await;
        let label = self.policy.decide(&outcome);
        match &outcome {
            Ok(resp) => debug!(%url, status = resp.status, final_url = %resp.final_url, %label, "classified"),
            Err(failure) => debug!(%url, ?failure, %label, "classified"),
        }
        label
    }
}
