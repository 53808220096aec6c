use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::progress::{PROGRESS_CHUNK_BYTES, ProgressCounter, ProgressSink};
use crate::{Error, Result};

pub enum UploadPayload {
    Bytes(Vec<u8>),
    Stream(BoxStream<'static, std::io::Result<Vec<u8>>>),
}

impl UploadPayload {
    /// Total size, when the transport can compute one. `Stream` payloads have
    /// no known length, so no progress readings are produced for them.
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Stream(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

pub struct UploadTask {
    pub payload: UploadPayload,
    pub key: String,
    pub progress: Option<Arc<dyn ProgressSink>>,
}

impl UploadTask {
    pub fn from_bytes(bytes: Vec<u8>, key: impl Into<String>) -> Self {
        Self {
            payload: UploadPayload::Bytes(bytes),
            key: key.into(),
            progress: None,
        }
    }

    pub fn from_stream(
        stream: BoxStream<'static, std::io::Result<Vec<u8>>>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            payload: UploadPayload::Stream(stream),
            key: key.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub name: Option<String>,
    pub key: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionJob {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressJobStatus {
    Pending,
    Ready { resource_key: String },
}

pub trait FileService {
    fn provider(&self) -> &'static str;

    fn upload<'a>(
        &'a self,
        task: UploadTask,
    ) -> Pin<Box<dyn Future<Output = Result<FileRecord>> + Send + 'a>>;

    fn compress_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CompressJobStatus>> + Send + 'a>>;

    fn compress_download_url<'a>(
        &'a self,
        resource_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

#[derive(Debug)]
enum ScriptedOutcome {
    Ready { resource_key: String },
    Fail { message: String },
}

#[derive(Debug)]
struct ScriptedJob {
    pending_polls: usize,
    outcome: ScriptedOutcome,
}

#[derive(Default)]
pub struct InMemoryFileService {
    pub status_queries: AtomicUsize,
    next_id: AtomicUsize,
    files: Mutex<HashMap<String, Vec<u8>>>,
    jobs: Mutex<HashMap<String, ScriptedJob>>,
    urls: Mutex<HashMap<String, String>>,
}

impl InMemoryFileService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_job(
        &self,
        job_id: impl Into<String>,
        pending_polls: usize,
        resource_key: impl Into<String>,
    ) {
        self.jobs.lock().await.insert(
            job_id.into(),
            ScriptedJob {
                pending_polls,
                outcome: ScriptedOutcome::Ready {
                    resource_key: resource_key.into(),
                },
            },
        );
    }

    pub async fn add_failing_job(
        &self,
        job_id: impl Into<String>,
        pending_polls: usize,
        message: impl Into<String>,
    ) {
        self.jobs.lock().await.insert(
            job_id.into(),
            ScriptedJob {
                pending_polls,
                outcome: ScriptedOutcome::Fail {
                    message: message.into(),
                },
            },
        );
    }

    pub async fn add_download_url(
        &self,
        resource_key: impl Into<String>,
        url: impl Into<String>,
    ) {
        self.urls
            .lock()
            .await
            .insert(resource_key.into(), url.into());
    }

    pub async fn uploaded(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(key).cloned()
    }

    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }
}

impl FileService for InMemoryFileService {
    fn provider(&self) -> &'static str {
        "test.mem"
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

            let bytes = match payload {
                UploadPayload::Bytes(bytes) => {
                    if let Some(sink) = &progress {
                        let mut counter = ProgressCounter::new(bytes.len() as u64);
                        for chunk in bytes.chunks(PROGRESS_CHUNK_BYTES) {
                            sink.on_progress(counter.record(chunk.len() as u64));
                        }
                    }
                    bytes
                }
                UploadPayload::Stream(mut stream) => {
                    let mut bytes = Vec::new();
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(|e| Error::Network {
                            message: format!("payload read failed: {e}"),
                        })?;
                        bytes.extend_from_slice(&chunk);
                    }
                    bytes
                }
            };

            let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1;
            let size = bytes.len() as u64;
            self.files.lock().await.insert(key.clone(), bytes);
            Ok(FileRecord {
                id,
                name: None,
                key: Some(key),
                size: Some(size),
            })
        })
    }

    fn compress_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<CompressJobStatus>> + Send + 'a>> {
        Box::pin(async move {
            self.status_queries.fetch_add(1, Ordering::Relaxed);

            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(job_id).ok_or_else(|| Error::ServerRejected {
                code: 1,
                message: format!("unknown job: {job_id}"),
            })?;

            if job.pending_polls > 0 {
                job.pending_polls -= 1;
                return Ok(CompressJobStatus::Pending);
            }

            match &job.outcome {
                ScriptedOutcome::Ready { resource_key } => Ok(CompressJobStatus::Ready {
                    resource_key: resource_key.clone(),
                }),
                ScriptedOutcome::Fail { message } => Err(Error::Network {
                    message: message.clone(),
                }),
            }
        })
    }

    fn compress_download_url<'a>(
        &'a self,
        resource_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.urls
                .lock()
                .await
                .get(resource_key)
                .cloned()
                .ok_or_else(|| Error::ServerRejected {
                    code: 1,
                    message: format!("unknown resource key: {resource_key}"),
                })
        })
    }
}
