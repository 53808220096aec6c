use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use zipdrop_core::{
    APP_NAME, Error, FileService, HttpFileService, PollConfig, ProgressReading, ProgressSink,
    Settings, TOKEN_KEY, TOKEN_STORE_FILE_NAME, TokenStore, UploadTask, init_logging,
    load_settings, parse_settings, resolve_download_url, save_settings, validate_settings,
};

#[derive(Parser)]
#[command(name = "zipdrop")]
#[command(about = "ZipDrop file service CLI", long_about = None)]
struct Cli {
    #[arg(long)]
    json: bool,

    #[arg(long)]
    config_dir: Option<PathBuf>,

    #[arg(long)]
    api_base: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file; `-` reads from stdin
    Upload {
        path: PathBuf,
        #[arg(long)]
        key: Option<String>,
    },
    Archive {
        #[command(subcommand)]
        cmd: ArchiveCmd,
    },
    Files {
        #[command(subcommand)]
        cmd: FilesCmd,
    },
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },
    Settings {
        #[command(subcommand)]
        cmd: SettingsCmd,
    },
}

#[derive(Subcommand)]
enum ArchiveCmd {
    Create {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long)]
        zip_name: Option<String>,
    },
    Resolve {
        job_id: String,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

#[derive(Subcommand)]
enum FilesCmd {
    List,
    Url { id: i64 },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum TokenCmd {
    Set { value: Option<String> },
    Clear,
    Status,
}

#[derive(Subcommand)]
enum SettingsCmd {
    Get,
    Set,
}

#[derive(Debug, Serialize)]
struct CliError {
    code: &'static str,
    message: String,
    retryable: bool,
}

impl CliError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        let code = match &e {
            Error::InvalidConfig { .. } => "config.invalid",
            Error::Io(_) => "io",
            Error::Network { .. } => "network",
            Error::Transport { .. } => "transport",
            Error::ServerRejected { .. } => "server.rejected",
            Error::Parse { .. } => "response.invalid",
            Error::PollLimitExceeded { .. } => "poll.limit",
            Error::Cancelled => "cancelled",
        };
        let retryable = matches!(
            e,
            Error::Network { .. } | Error::Transport { .. } | Error::PollLimitExceeded { .. }
        );
        Self {
            code,
            message: e.to_string(),
            retryable,
        }
    }
}

struct NdjsonProgressSink;

impl ProgressSink for NdjsonProgressSink {
    fn on_progress(&self, r: ProgressReading) {
        let line = serde_json::json!({
            "type": "upload.progress",
            "bytesSent": r.bytes_sent,
            "bytesTotal": r.bytes_total,
            "percent": r.percent(),
        });
        println!("{line}");
    }
}

struct StderrProgressSink;

impl ProgressSink for StderrProgressSink {
    fn on_progress(&self, r: ProgressReading) {
        eprint!("\rupload: {:5.1}%", r.percent());
        if r.bytes_sent == r.bytes_total {
            eprintln!();
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            emit_error(&e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_dir = cli
        .config_dir
        .or_else(|| std::env::var("ZIPDROP_CONFIG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(default_config_dir);

    match cli.cmd {
        Command::Upload { path, key } => {
            upload_run(&config_dir, cli.api_base, path, key, cli.json).await
        }
        Command::Archive { cmd } => match cmd {
            ArchiveCmd::Create { ids, zip_name } => {
                archive_create(&config_dir, cli.api_base, ids, zip_name, cli.json).await
            }
            ArchiveCmd::Resolve {
                job_id,
                interval_ms,
                max_attempts,
            } => {
                archive_resolve(
                    &config_dir,
                    cli.api_base,
                    job_id,
                    interval_ms,
                    max_attempts,
                    cli.json,
                )
                .await
            }
        },
        Command::Files { cmd } => match cmd {
            FilesCmd::List => files_list(&config_dir, cli.api_base, cli.json).await,
            FilesCmd::Url { id } => files_url(&config_dir, cli.api_base, id, cli.json).await,
            FilesCmd::Delete { id } => files_delete(&config_dir, cli.api_base, id, cli.json).await,
        },
        Command::Token { cmd } => match cmd {
            TokenCmd::Set { value } => token_set(&config_dir, value, cli.json),
            TokenCmd::Clear => token_clear(&config_dir, cli.json),
            TokenCmd::Status => token_status(&config_dir, cli.json),
        },
        Command::Settings { cmd } => match cmd {
            SettingsCmd::Get => settings_get(&config_dir, cli.json),
            SettingsCmd::Set => settings_set(&config_dir, cli.json),
        },
    }
}

fn build_service(
    config_dir: &Path,
    api_base: Option<String>,
) -> Result<(HttpFileService, Settings), CliError> {
    let mut settings = load_settings(config_dir)?;
    if let Some(base) = api_base {
        settings.api_base = base;
    }
    validate_settings(&settings)?;

    let store = TokenStore::open(config_dir.join(TOKEN_STORE_FILE_NAME))?;
    let service = HttpFileService::new(settings.api_base.clone(), Arc::new(store));
    Ok((service, settings))
}

async fn upload_run(
    config_dir: &Path,
    api_base: Option<String>,
    path: PathBuf,
    key: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let (service, _) = build_service(config_dir, api_base)?;
    let from_stdin = path.as_os_str() == "-";
    let key = key.unwrap_or_else(|| default_upload_key(&path, from_stdin));

    let task = if from_stdin {
        let stream = ReaderStream::new(tokio::io::stdin())
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        UploadTask::from_stream(stream, key)
    } else {
        let bytes = std::fs::read(&path)
            .map_err(|e| CliError::new("io", format!("read {} failed: {e}", path.display())))?;
        UploadTask::from_bytes(bytes, key)
    };

    let sink: Arc<dyn ProgressSink> = if json {
        Arc::new(NdjsonProgressSink)
    } else {
        Arc::new(StderrProgressSink)
    };
    let record = service.upload(task.with_progress(sink)).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "upload.result", "file": record })
        );
    } else {
        println!(
            "uploaded: id={} key={}",
            record.id,
            record.key.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn archive_create(
    config_dir: &Path,
    api_base: Option<String>,
    ids: Vec<i64>,
    zip_name: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let (service, _) = build_service(config_dir, api_base)?;
    let job = service.batch_download(&ids, zip_name.as_deref()).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "archive.job", "jobId": job.id })
        );
    } else {
        println!("job: {}", job.id);
    }
    Ok(())
}

async fn archive_resolve(
    config_dir: &Path,
    api_base: Option<String>,
    job_id: String,
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    json: bool,
) -> Result<(), CliError> {
    let (service, settings) = build_service(config_dir, api_base)?;

    let mut config: PollConfig = settings.poll.to_poll_config();
    if let Some(ms) = interval_ms {
        config.interval = std::time::Duration::from_millis(ms);
    }
    if let Some(max) = max_attempts {
        config.max_attempts = Some(max);
    }

    let url = resolve_download_url(&service, &job_id, config).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "archive.url", "url": url })
        );
    } else {
        println!("{url}");
    }
    Ok(())
}

async fn files_list(
    config_dir: &Path,
    api_base: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let (service, _) = build_service(config_dir, api_base)?;
    let records = service.file_list().await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "files.list", "files": records })
        );
    } else {
        for r in records {
            println!(
                "{}\t{}\t{}",
                r.id,
                r.key.as_deref().unwrap_or("-"),
                r.name.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn files_url(
    config_dir: &Path,
    api_base: Option<String>,
    id: i64,
    json: bool,
) -> Result<(), CliError> {
    let (service, _) = build_service(config_dir, api_base)?;
    let url = service.file_url(id).await?;

    if json {
        println!("{}", serde_json::json!({ "type": "files.url", "url": url }));
    } else {
        println!("{url}");
    }
    Ok(())
}

async fn files_delete(
    config_dir: &Path,
    api_base: Option<String>,
    id: i64,
    json: bool,
) -> Result<(), CliError> {
    let (service, _) = build_service(config_dir, api_base)?;
    service.delete_file(id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "files.deleted", "id": id })
        );
    } else {
        println!("deleted: {id}");
    }
    Ok(())
}

fn open_token_store(config_dir: &Path) -> Result<TokenStore, CliError> {
    Ok(TokenStore::open(config_dir.join(TOKEN_STORE_FILE_NAME))?)
}

fn token_set(config_dir: &Path, value: Option<String>, json: bool) -> Result<(), CliError> {
    let value = match value {
        Some(v) => v,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| CliError::new("io", format!("token read failed: {e}")))?;
            input.trim().to_string()
        }
    };
    if value.is_empty() {
        return Err(CliError::new("token.invalid", "token must not be empty"));
    }

    let mut store = open_token_store(config_dir)?;
    store.set(TOKEN_KEY, value);
    store.save()?;

    if json {
        println!("{}", serde_json::json!({ "type": "token.set" }));
    } else {
        println!("token saved");
    }
    Ok(())
}

fn token_clear(config_dir: &Path, json: bool) -> Result<(), CliError> {
    let mut store = open_token_store(config_dir)?;
    let removed = store.remove(TOKEN_KEY);
    store.save()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "token.cleared", "removed": removed })
        );
    } else {
        println!("token cleared (was present: {removed})");
    }
    Ok(())
}

fn token_status(config_dir: &Path, json: bool) -> Result<(), CliError> {
    let store = open_token_store(config_dir)?;
    let present = store.get(TOKEN_KEY).is_some();

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "token.status", "present": present })
        );
    } else {
        println!("tokenPresent={present}");
    }
    Ok(())
}

fn settings_get(config_dir: &Path, json: bool) -> Result<(), CliError> {
    let settings = load_settings(config_dir)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "type": "settings", "settings": settings })
        );
    } else {
        let text = toml::to_string(&settings)
            .map_err(|e| CliError::new("config.invalid", e.to_string()))?;
        print!("{text}");
        if !text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn settings_set(config_dir: &Path, json: bool) -> Result<(), CliError> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| CliError::new("config.read_failed", e.to_string()))?;

    let settings = parse_settings(&input)?;
    save_settings(config_dir, &settings)?;

    if json {
        println!("{}", serde_json::json!({ "type": "settings.saved" }));
    } else {
        println!("settings saved");
    }
    Ok(())
}

fn default_upload_key(path: &Path, from_stdin: bool) -> String {
    if from_stdin {
        return format!("up_{}", uuid::Uuid::new_v4());
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("up_{}", uuid::Uuid::new_v4()))
}

fn default_config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join(APP_NAME.to_lowercase())
}

fn emit_error(e: &CliError) {
    let json = serde_json::to_string(e).unwrap_or_else(|_| {
        "{\"code\":\"unknown\",\"message\":\"json encode failed\",\"retryable\":false}".to_string()
    });
    let _ = writeln!(std::io::stderr(), "{json}");
}
