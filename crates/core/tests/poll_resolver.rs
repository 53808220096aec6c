use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use zipdrop_core::{
    CompressJobStatus, Error, FileRecord, FileService, PollConfig, PollOptions, UploadTask,
    resolve_download_url, resolve_download_url_with,
};

enum Step {
    Pending,
    Ready(&'static str),
    Fail(&'static str),
}

struct ScriptedService {
    steps: Mutex<VecDeque<Step>>,
    status_times: Mutex<Vec<Instant>>,
    resolve_calls: AtomicUsize,
    urls: HashMap<&'static str, &'static str>,
}

impl ScriptedService {
    fn new(steps: Vec<Step>, urls: HashMap<&'static str, &'static str>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            status_times: Mutex::new(Vec::new()),
            resolve_calls: AtomicUsize::new(0),
            urls,
        }
    }

    async fn status_times(&self) -> Vec<Instant> {
        self.status_times.lock().await.clone()
    }
}

impl FileService for ScriptedService {
    fn provider(&self) -> &'static str {
        "test.scripted"
    }

    fn upload<'a>(
        &'a self,
        _task: UploadTask,
    ) -> Pin<Box<dyn Future<Output = zipdrop_core::Result<FileRecord>> + Send + 'a>> {
        Box::pin(async {
            Err(Error::InvalidConfig {
                message: "upload not supported in ScriptedService".to_string(),
            })
        })
    }

    fn compress_status<'a>(
        &'a self,
        _job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = zipdrop_core::Result<CompressJobStatus>> + Send + 'a>> {
        Box::pin(async move {
            self.status_times.lock().await.push(Instant::now());
            // An exhausted script keeps reporting pending.
            match self.steps.lock().await.pop_front() {
                None | Some(Step::Pending) => Ok(CompressJobStatus::Pending),
                Some(Step::Ready(key)) => Ok(CompressJobStatus::Ready {
                    resource_key: key.to_string(),
                }),
                Some(Step::Fail(message)) => Err(Error::Network {
                    message: message.to_string(),
                }),
            }
        })
    }

    fn compress_download_url<'a>(
        &'a self,
        resource_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = zipdrop_core::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.resolve_calls.fetch_add(1, Ordering::Relaxed);
            self.urls
                .get(resource_key)
                .map(|url| url.to_string())
                .ok_or_else(|| Error::ServerRejected {
                    code: 1,
                    message: format!("unknown resource key: {resource_key}"),
                })
        })
    }
}

#[tokio::test(start_paused = true)]
async fn ready_on_first_query_resolves_without_delay() {
    let service = ScriptedService::new(
        vec![Step::Ready("k1")],
        HashMap::from([("k1", "https://files.example.test/zips/a.zip")]),
    );

    let start = Instant::now();
    let url = resolve_download_url(&service, "job1", PollConfig::default())
        .await
        .unwrap();

    assert_eq!(url, "https://files.example.test/zips/a.zip");
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(service.status_times().await.len(), 1);
    assert_eq!(service.resolve_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_then_ready_resolves_after_one_interval() {
    let service = ScriptedService::new(
        vec![Step::Pending, Step::Ready("k1")],
        HashMap::from([("k1", "https://x/y")]),
    );

    let start = Instant::now();
    let url = resolve_download_url(&service, "job1", PollConfig::default())
        .await
        .unwrap();

    assert_eq!(url, "https://x/y");
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
    assert_eq!(service.status_times().await.len(), 2);
    assert_eq!(service.resolve_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn pending_n_times_issues_n_plus_one_queries_spaced_by_interval() {
    let service = ScriptedService::new(
        vec![Step::Pending, Step::Pending, Step::Pending, Step::Ready("k1")],
        HashMap::from([("k1", "https://files.example.test/zips/b.zip")]),
    );
    let config = PollConfig {
        interval: Duration::from_millis(1000),
        max_attempts: None,
    };

    let url = resolve_download_url(&service, "job2", config).await.unwrap();
    assert_eq!(url, "https://files.example.test/zips/b.zip");

    let times = service.status_times().await;
    assert_eq!(times.len(), 4);
    for window in times.windows(2) {
        assert_eq!(
            window[1].duration_since(window[0]),
            Duration::from_millis(1000)
        );
    }
    assert_eq!(service.resolve_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn status_failure_terminates_polling_immediately() {
    let service = ScriptedService::new(
        vec![Step::Pending, Step::Fail("connection reset"), Step::Pending],
        HashMap::new(),
    );

    let err = resolve_download_url(&service, "job3", PollConfig::default())
        .await
        .unwrap_err();

    match err {
        Error::Network { message } => assert_eq!(message, "connection reset"),
        other => panic!("expected Network, got {other:?}"),
    }
    assert_eq!(service.status_times().await.len(), 2);
    assert_eq!(service.resolve_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test(start_paused = true)]
async fn resolve_url_failure_is_terminal() {
    let service = ScriptedService::new(vec![Step::Ready("missing")], HashMap::new());

    let err = resolve_download_url(&service, "job4", PollConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ServerRejected { .. }));
    assert_eq!(service.status_times().await.len(), 1);
    assert_eq!(service.resolve_calls.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn attempt_limit_stops_an_always_pending_job() {
    let service = ScriptedService::new(Vec::new(), HashMap::new());
    let config = PollConfig {
        interval: Duration::from_millis(1000),
        max_attempts: Some(5),
    };

    let start = Instant::now();
    let err = resolve_download_url(&service, "job5", config).await.unwrap_err();

    match err {
        Error::PollLimitExceeded { attempts } => assert_eq!(attempts, 5),
        other => panic!("expected PollLimitExceeded, got {other:?}"),
    }
    assert_eq!(service.status_times().await.len(), 5);
    // The limit fires on the last query, before another sleep.
    assert_eq!(start.elapsed(), Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_issues_no_queries() {
    let service = ScriptedService::new(Vec::new(), HashMap::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = resolve_download_url_with(
        &service,
        "job6",
        PollConfig::default(),
        PollOptions {
            cancel: Some(&cancel),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(service.status_times().await.len(), 0);
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let service = ScriptedService::new(Vec::new(), HashMap::new());
    let config = PollConfig {
        interval: Duration::ZERO,
        max_attempts: None,
    };

    let err = resolve_download_url(&service, "job7", config).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));
    assert_eq!(service.status_times().await.len(), 0);
}
