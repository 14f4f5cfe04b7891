use amount_codecs::{Batch, MessageCodec};
use anyhow::Context;
use arguments::Arguments;
use clap::Parser;
use config::ClientConfig;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

mod arguments;
mod config;
mod console;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Sends one batch at a time and reads one response for it. That read is
/// bounded by `bufferCapacity`: once the report outgrows it, the leftover
/// bytes stay buffered and are shown as the response to the next batch.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Arguments::parse();
    let config = ClientConfig::from_file(&args.config)?;

    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to connect to {}:{}", config.host, config.port))?;
    tracing::info!("Connected to server on host {} and port {}", config.host, config.port);

    let codec = MessageCodec::with_capacity(config.buffer_capacity);
    let (reader, writer) = stream.into_split();
    let mut reader = FramedRead::new(reader, codec);
    let mut writer = FramedWrite::new(writer, codec);

    println!(
        "Type one amount per line, then '{}' to send the batch. '{}' ends the session.",
        config.processing_terminator, config.app_terminator
    );
    println!("CTRL+C or CTRL+D to leave without sending.");
    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        let Some(lines) = console::read_batch(&mut rl, &config.processing_terminator)? else {
            break;
        };
        let batch = Batch::from_lines(&lines, &config.app_terminator);
        let halt = batch.halt;
        if halt {
            tracing::info!("Halt keyword detected, shutting down after this batch");
        }
        let Some(message) = batch.into_message(&config.app_terminator) else {
            tracing::warn!("Nothing sent to the server, try entering some proper numerical values");
            continue;
        };

        tracing::debug!("Sending:\n{message}");
        writer.send(message).await?;
        match reader.next().await {
            Some(Ok(response)) => {
                let response = String::from_utf8_lossy(&response);
                tracing::debug!("Received: {response}");
                println!("{}", console::describe(response.trim()));
            }
            Some(Err(e)) => return Err(e.context("Failed to read server response")),
            None => {
                tracing::warn!("Server closed the connection");
                break;
            }
        }
        if halt {
            break;
        }
    }

    if let Err(e) = writer.close().await {
        tracing::debug!("Failed to shut down connection: {e:#}");
    }
    Ok(())
}
