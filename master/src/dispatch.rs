use anyhow::Result;
use async_trait::async_trait;
use common::{MapRequest, MapResponse, ReduceRequest, ReduceResponse};
use reqwest::Client;
use std::time::Duration;

/// RPCs del coordinador hacia los workers.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn map(&self, worker: &str, req: &MapRequest) -> Result<MapResponse>;
    async fn reduce(&self, worker: &str, req: &ReduceRequest) -> Result<ReduceResponse>;
}

/// Cliente HTTP/JSON contra la API de los workers.
pub struct HttpWorkerClient {
    client: Client,
}

impl HttpWorkerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn map(&self, worker: &str, req: &MapRequest) -> Result<MapResponse> {
        let url = format!("{}/api/v1/map", worker);
        let resp = self.client.post(&url).json(req).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn reduce(&self, worker: &str, req: &ReduceRequest) -> Result<ReduceResponse> {
        let url = format!("{}/api/v1/reduce", worker);
        let resp = self.client.post(&url).json(req).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}
