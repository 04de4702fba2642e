//! Workbench CLI: manage scripts on the translation backend and run
//! translation jobs with live progress.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use interp_workbench::application::Workbench;
use interp_workbench::domain::{JobUpdate, TranslationPhase};
use interp_workbench::infrastructure::logging::init_logging_with_config;
use interp_workbench::infrastructure::{Bucket, ConfigManager, WorkbenchApi};

const USAGE: &str = "\
usage: interp-workbench <command> [args]

commands:
  list <untranslated|translated>           list files in a bucket
  upload <path>                            upload a script to the untranslated bucket
  show <untranslated|translated> <file>    print a script's content
  save <untranslated|translated> <file> <path>
                                           save a local file to the backend
  translate <file> [actor]                 translate a script, streaming progress";

#[tokio::main]
async fn main() -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.initialize_on_first_run().await?;
    init_logging_with_config(&config.logging)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let api = WorkbenchApi::new(&config.backend)?;

    match args.first().map(String::as_str) {
        Some("list") => {
            let bucket = parse_bucket(args.get(1))?;
            for file_name in api.list_files(bucket).await? {
                println!("{file_name}");
            }
        }
        Some("upload") => {
            let path = args.get(1).context("upload needs a file path")?;
            let message = api.upload_script(Path::new(path)).await?;
            println!("{message}");
        }
        Some("show") => {
            let bucket = parse_bucket(args.get(1))?;
            let file_name = args.get(2).context("show needs a file name")?;
            let content = api.fetch_script(bucket, file_name).await?;
            println!("{content}");
        }
        Some("save") => {
            let bucket = parse_bucket(args.get(1))?;
            let file_name = args.get(2).context("save needs a file name")?;
            let path = args.get(3).context("save needs a local file path")?;
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("cannot read {path}"))?;
            let message = api.save_script(bucket, file_name, &content).await?;
            println!("{message}");
        }
        Some("translate") => {
            let file_name = args.get(1).context("translate needs a file name")?.clone();
            let actor = args.get(2).cloned().unwrap_or_else(|| config.actor.email.clone());
            translate(api, &file_name, &actor).await?;
        }
        _ => {
            println!("{USAGE}");
        }
    }

    Ok(())
}

fn parse_bucket(arg: Option<&String>) -> Result<Bucket> {
    let Some(name) = arg else { bail!("missing bucket name\n\n{USAGE}") };
    Bucket::parse(name).with_context(|| format!("unknown bucket `{name}`\n\n{USAGE}"))
}

/// Runs one translation job to completion, printing streamed progress.
///
/// Ctrl-C stops the job the way the stop button would; a finished job's
/// result is saved into the translated bucket under its derived name.
async fn translate(api: WorkbenchApi, file_name: &str, actor: &str) -> Result<()> {
    let mut workbench = Workbench::new(Arc::new(api.clone()));
    let mut updates = workbench.subscribe();

    let printer = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                JobUpdate::Log(line) => println!("{line}"),
                JobUpdate::Progress(progress) if progress.total > 0 => {
                    println!(
                        "  {}/{} blocks ({:.0}%)",
                        progress.current, progress.total, progress.percentage
                    );
                }
                JobUpdate::Progress(_) | JobUpdate::Completed(_) => {}
            }
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = workbench.translate(file_name, actor, cancel).await;
    printer.abort();

    match workbench.controller().phase() {
        Some(TranslationPhase::Done) => {
            let result = result.context("done without a result")?;
            let message =
                api.save_script(Bucket::Translated, &result.file_name, &result.text).await?;
            println!("{message}");
            println!("saved translation as {}", result.file_name);
        }
        Some(TranslationPhase::Cancelled) => {
            println!("translation stopped by you");
        }
        Some(TranslationPhase::Errored) => {
            bail!("translation failed, see log above");
        }
        None => {
            println!("no translation was started");
        }
        phase => {
            warn!(?phase, "translation ended in an unexpected state");
        }
    }

    Ok(())
}
