use std::sync::Arc;

use async_trait::async_trait;

use lmc_auth::Authenticator;
use lmc_core::{Job, JobKind, LmcError, RemoteApi};
use lmc_scheduler::Processor;

/// Delivers jobs to the remote service, re-authenticating once on a rejected token.
pub struct LinkDelivery {
    api: Arc<dyn RemoteApi>,
    auth: Arc<Authenticator>,
}

impl LinkDelivery {
    pub fn new(api: Arc<dyn RemoteApi>, auth: Arc<Authenticator>) -> Self {
        Self { api, auth }
    }
}

#[async_trait]
impl Processor for LinkDelivery {
    type Job = Job;
    type Error = LmcError;

    async fn process(&self, job: &Job) -> Result<(), LmcError> {
        match &job.kind {
            JobKind::Link(link) => {
                self.auth
                    .with_auth(|token| async move { self.api.create_link(&token, link).await })
                    .await
            }
        }
    }
}
