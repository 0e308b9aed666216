use anyhow::{Context, Result};
use checker_core::{
    open_history, Config, ImageDownloader, Notifier, Pipeline, RunOutcome, XkcdClient,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "xkcd-checker")]
#[command(about = "Email the latest xkcd comic if it hasn't been sent yet")]
struct Args {
    /// Load settings from this env file instead of the default locations
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Override XKCD_HISTORY_FILE
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Override XKCD_COMIC_DIR
    #[arg(long)]
    comic_dir: Option<PathBuf>,

    /// Skip saving the comic image (also disables attachments)
    #[arg(long)]
    no_download: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::from_env(args.env_file.as_deref())?;

    if let Some(path) = &args.history_file {
        config.history_path = path.clone();
    }
    if let Some(dir) = &args.comic_dir {
        config.comic_dir = dir.clone();
    }
    if args.no_download {
        config.download = false;
        config.mail_attachment = false;
    }

    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = load_config(&args)?;
    info!(
        method = %config.mail_method,
        history = %config.history_path.display(),
        download = config.download,
        "Configuration loaded"
    );

    let source = XkcdClient::new(config.api_url.as_str())?;
    let history = open_history(&config).context("Failed to open history")?;
    let notifier = Notifier::from_config(&config)?;
    let archive = if config.download {
        Some(ImageDownloader::new(config.comic_dir.clone())?)
    } else {
        None
    };

    let mut pipeline = Pipeline::new(source, history, notifier, archive, config.mail_to.as_str())
        .attach_images(config.mail_attachment);

    match pipeline.run().await {
        Ok(RunOutcome::UpToDate { num, .. }) => {
            info!(num, "No new comic");
            Ok(())
        }
        Ok(RunOutcome::Delivered { num, image, .. }) => {
            info!(
                num,
                recipient = %config.mail_to,
                image = ?image,
                "Comic delivered"
            );
            Ok(())
        }
        Err(e) => {
            let stage = e.stage;
            Err(e.source).with_context(|| format!("xkcd-checker aborted during {} stage", stage))
        }
    }
}
