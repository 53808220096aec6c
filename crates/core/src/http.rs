use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::progress::{PROGRESS_CHUNK_BYTES, ProgressCounter};
use crate::response::{ServiceResponse, decode_envelope};
use crate::service::{
    CompressJobStatus, CompressionJob, FileRecord, FileService, UploadPayload, UploadTask,
};
use crate::{Error, Result};

pub struct HttpFileService {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
}

#[derive(Debug, Deserialize)]
struct UrlData {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompressStatusData {
    status: String,
    resource_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchDownloadBody<'a> {
    ids: &'a [i64],
    #[serde(skip_serializing_if = "Option::is_none")]
    zip_name: Option<&'a str>,
}

impl HttpFileService {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            credentials,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, self.endpoint(path));
        if let Some(token) = self.credentials.token() {
            req = req.header("token", token);
        }
        req
    }

    async fn send_envelope<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<ServiceResponse<T>> {
        let res = req.send().await.map_err(|e| Error::Network {
            message: format!("request failed: {e}"),
        })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| Error::Network {
            message: format!("read response failed: {e}"),
        })?;

        decode_envelope(status, &body)
    }

    pub async fn file_list(&self) -> Result<Vec<FileRecord>> {
        self.send_envelope(self.request(reqwest::Method::GET, "file/list"))
            .await?
            .into_result()
    }

    pub async fn file_url(&self, id: i64) -> Result<String> {
        let data: UrlData = self
            .send_envelope(self.request(reqwest::Method::GET, "file/one").query(&[("id", id)]))
            .await?
            .into_result()?;
        Ok(data.url)
    }

    pub async fn delete_file(&self, id: i64) -> Result<()> {
        self.send_envelope::<serde_json::Value>(
            self.request(reqwest::Method::DELETE, "file/one")
                .query(&[("id", id)]),
        )
        .await?
        .ensure_ok()
    }

    pub async fn batch_download(
        &self,
        ids: &[i64],
        zip_name: Option<&str>,
    ) -> Result<CompressionJob> {
        let body = BatchDownloadBody { ids, zip_name };
        self.send_envelope(
            self.request(reqwest::Method::POST, "file/batch/down")
                .json(&body),
        )
        .await?
        .into_result()
    }
}

fn status_from_data(data: CompressStatusData) -> Result<CompressJobStatus> {
    match data.status.as_str() {
        "pending" => Ok(CompressJobStatus::Pending),
        "ready" => {
            let resource_key = data.resource_key.ok_or_else(|| Error::Parse {
                message: "ready status missing resourceKey".to_string(),
            })?;
            Ok(CompressJobStatus::Ready { resource_key })
        }
        other => Err(Error::Parse {
            message: format!("unknown compress status: {other}"),
        }),
    }
}

impl FileService for HttpFileService {
    fn provider(&self) -> &'static str {
        "http"
    }

    fn upload<'a>(
        &'a self,
        task: UploadTask,
    ) -> Pin<Box<dyn Future<Output = Result<FileRecord>> + Send + 'a>> {
        Box::pin(async move {
            let UploadTask {
                payload,
                key,
                progress,
            } = task;

            debug!(
                event = "upload.start",
                key = %key,
                bytes = payload.len(),
                "upload.start"
            );

            let part = match payload {
                UploadPayload::Bytes(bytes) => {
                    let total = bytes.len() as u64;
                    let mut counter = ProgressCounter::new(total);
                    let chunks: Vec<Vec<u8>> = bytes
                        .chunks(PROGRESS_CHUNK_BYTES)
                        .map(|c| c.to_vec())
                        .collect();
                    // Readings are emitted as the transport pulls each chunk.
                    let stream = futures::stream::iter(chunks).map(move |chunk| {
                        let reading = counter.record(chunk.len() as u64);
                        if let Some(sink) = &progress {
                            sink.on_progress(reading);
                        }
                        Ok::<_, std::io::Error>(chunk)
                    });
                    reqwest::multipart::Part::stream_with_length(
                        reqwest::Body::wrap_stream(stream),
                        total,
                    )
                }
                UploadPayload::Stream(stream) => {
                    reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(stream))
                }
            };

            let form = reqwest::multipart::Form::new()
                .text("key", key.clone())
                .part("file", part.file_name(key));

            let record: FileRecord = self
                .send_envelope(
                    self.request(reqwest::Method::POST, "file/upload")
                        .multipart(form),
                )
                .await?
                .into_result()?;

            debug!(event = "upload.finish", id = record.id, "upload.finish");
            Ok(record)
        })
    }

    fn compress_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CompressJobStatus>> + Send + 'a>> {
        Box::pin(async move {
            let data: CompressStatusData = self
                .send_envelope(
                    self.request(reqwest::Method::POST, "file/compress/status")
                        .json(&serde_json::json!({ "id": job_id })),
                )
                .await?
                .into_result()?;
            status_from_data(data)
        })
    }

    fn compress_download_url<'a>(
        &'a self,
        resource_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let data: UrlData = self
                .send_envelope(
                    self.request(reqwest::Method::POST, "file/compress/down")
                        .json(&serde_json::json!({ "key": resource_key })),
                )
                .await?
                .into_result()?;
            Ok(data.url)
        })
    }
}
