use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use caredoc_app::cli::{Cli, Commands, ProcessArgs, SplitArgs};
use caredoc_app::config;
use caredoc_app::error::AppError;
use caredoc_app::matching::MasterRecord;
use caredoc_app::pdf::{DocMimeType, split_into_pages};
use caredoc_app::pipeline::{DocumentProcessor, MasterRegistry};
use caredoc_app::services::{
    CancelFlag, FailureRecorder, GeminiOcrClient, InvokerConfig, JsonlAuditSink, LogNotifier,
    ModelParams, OcrInvoker,
};
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Process(args)) => run_process(args).await,
        Some(Commands::Split(args)) => run_split(args),
        None => {
            Cli::print_help();
            Ok(())
        }
    }
}

async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let bytes = read_file(&args.file)?;
    let mime = mime_for(&args.file)?;
    let file_id = file_stem(&args.file);
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| file_id.clone());

    let registry = Arc::new(MasterRegistry {
        customers: load_records(args.customers.as_deref())?,
        offices: load_records(args.offices.as_deref())?,
        document_types: load_records(args.document_types.as_deref())?,
    });

    let model = ModelParams::for_model(args.model.as_deref().unwrap_or(&cfg.ocr.model));
    let client = Arc::new(GeminiOcrClient::new(&cfg.ocr)?);
    let invoker = OcrInvoker::new(
        client,
        InvokerConfig::builder()
            .batch_size(cfg.ocr.batch_size)
            .batch_pause(Duration::from_millis(cfg.ocr.batch_pause_ms))
            .call_timeout(Duration::from_secs(cfg.ocr.call_timeout_secs))
            .build(),
    );
    let recorder = Arc::new(FailureRecorder::new(
        Box::new(JsonlAuditSink::new(cfg.audit.log_path.clone())),
        Box::new(LogNotifier),
        cfg.audit.notify_recipients.clone(),
    ));

    let processor = DocumentProcessor::new(invoker, model, cfg.split.clone(), registry, recorder);
    let outcome = processor
        .process(&file_id, &file_name, &bytes, &mime, &CancelFlag::new())
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_split(args: SplitArgs) -> Result<(), AppError> {
    let cfg = config::load()?;
    let bytes = read_file(&args.file)?;
    let mime = mime_for(&args.file)?;
    let stem = file_stem(&args.file);
    let out_dir = args
        .out_dir
        .clone()
        .or_else(|| args.file.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let units = split_into_pages(&bytes, &mime, &cfg.split)?;
    fs::create_dir_all(&out_dir).map_err(|source| AppError::Io {
        path: out_dir.clone(),
        source,
    })?;

    for unit in &units {
        let extension = match &unit.mime_type {
            DocMimeType::Pdf => "pdf",
            DocMimeType::Image(mime) => mime.strip_prefix("image/").unwrap_or("bin"),
        };
        let path = out_dir.join(format!("{stem}_p{}.{extension}", unit.page_number));
        fs::write(&path, unit.bytes.as_ref()).map_err(|source| AppError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(page = unit.page_number, path = %path.display(), "wrote page");
    }

    println!("{} pages written to {}", units.len(), out_dir.display());
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn mime_for(path: &Path) -> Result<String, AppError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocMimeType::from_extension)
        .map(|mime| mime.as_str().to_string())
        .ok_or_else(|| AppError::UnknownExtension {
            path: path.to_path_buf(),
        })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

fn load_records(path: Option<&Path>) -> Result<Vec<MasterRecord>, AppError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let bytes = read_file(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
