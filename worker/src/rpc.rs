use anyhow::Result;
use async_trait::async_trait;
use common::{
    DoneResponse, MappedData, MappingDoneRequest, ReducingDoneRequest, WorkerHeartbeatRequest,
    WorkerHeartbeatResponse,
};
use reqwest::Client;
use std::time::Duration;

/// RPCs del worker hacia el master.
#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    async fn heartbeat(&self, req: &WorkerHeartbeatRequest) -> Result<()>;
    async fn mapping_done(&self, req: &MappingDoneRequest) -> Result<()>;
    async fn reducing_done(&self, req: &ReducingDoneRequest) -> Result<()>;
}

/// Lectura de datos mapeados desde otro worker (shuffle).
#[async_trait]
pub trait MapperClient: Send + Sync {
    async fn read_mapped_data(&self, mapper: &str, task_id: &str, region: u32) -> Result<MappedData>;
}

pub fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub struct HttpCoordinatorClient {
    client: Client,
    base_url: String,
}

impl HttpCoordinatorClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CoordinatorClient for HttpCoordinatorClient {
    async fn heartbeat(&self, req: &WorkerHeartbeatRequest) -> Result<()> {
        let url = format!("{}/api/v1/workers/heartbeat", self.base_url);
        let _: WorkerHeartbeatResponse = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(())
    }

    async fn mapping_done(&self, req: &MappingDoneRequest) -> Result<()> {
        let url = format!("{}/api/v1/mapping/done", self.base_url);
        let _: DoneResponse = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(())
    }

    async fn reducing_done(&self, req: &ReducingDoneRequest) -> Result<()> {
        let url = format!("{}/api/v1/reducing/done", self.base_url);
        let _: DoneResponse = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(())
    }
}

pub struct HttpMapperClient {
    client: Client,
}

impl HttpMapperClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MapperClient for HttpMapperClient {
    async fn read_mapped_data(&self, mapper: &str, task_id: &str, region: u32) -> Result<MappedData> {
        let url = format!("{}/api/v1/mapped/{}/{}", mapper, task_id, region);
        let data = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(data)
    }
}
