use std::process::ExitCode;

use buildpost_core::{
    batch::FileBatch,
    config::DeliveryConfig,
    notifier::{deliver, DeliveryResult, NO_FILES_NOTICE},
};
use buildpost_telegram::TelegramBackend;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "delivery failed");
            eprintln!("[-] Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), buildpost_core::Error> {
    buildpost_core::logging::init("buildpost")?;

    let batch = FileBatch::from_args(std::env::args_os().skip(1))?;
    if batch.is_empty() {
        // Checked before config so a build without artifacts never fails here.
        println!("[-] {NO_FILES_NOTICE}");
        return Ok(());
    }

    let cfg = DeliveryConfig::load()?;
    tracing::debug!(?cfg, "loaded configuration");

    println!("[+] Logging in and sending {} files...", batch.len());
    let backend = TelegramBackend::new(&cfg);

    match deliver(&batch, &cfg, &backend).await? {
        DeliveryResult::Skipped { notice } => println!("[-] {notice}"),
        DeliveryResult::Sent {
            files,
            messages,
            target,
        } => {
            tracing::info!(files, messages, chat = %target, "delivered");
            println!("[+] Success! Sent {files} files to {target}");
        }
    }

    Ok(())
}
