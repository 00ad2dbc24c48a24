use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::fmt::time::ChronoLocal;
use tutor_live::history::{HistoryStore, InMemoryHistory};
use tutor_live::settings::{FeedbackLanguage, TutorSpeed};
use tutor_live::utils::{device, CpalBackend};
use tutor_live::{
    ClientConfig, Collaborators, Config, GeminiLive, ReviewerClient, SessionHandle, Settings,
};

#[derive(Parser)]
struct Cli {
    /// What to talk about. The tutor suggests something when omitted.
    topic: Option<String>,
    /// Your name, passed to the tutor.
    #[arg(long)]
    name: Option<String>,
    /// Feedback language: ko, ja or zh.
    #[arg(long, default_value = "ko")]
    language: String,
    /// Ask the tutor to speak more slowly.
    #[arg(long)]
    slow: bool,
    #[arg(long)]
    input_device: Option<String>,
    #[arg(long)]
    output_device: Option<String>,
    /// Print the available audio devices and exit.
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    if args.list_devices {
        println!("Inputs:\n{}", device::get_available_inputs()?);
        println!("Outputs:\n{}", device::get_available_outputs()?);
        return Ok(());
    }

    let config = Config::from_env().context("Failed to load application configuration")?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let language: FeedbackLanguage = serde_json::from_value(serde_json::json!(args.language))
        .context("Unsupported feedback language")?;
    let settings = Settings {
        name: args.name.unwrap_or_default(),
        language,
        speed: if args.slow {
            TutorSpeed::Slower
        } else {
            TutorSpeed::Default
        },
        ..Settings::default()
    };
    let (_settings_tx, settings_rx) = watch::channel(settings);

    let mut audio = CpalBackend::new();
    if let Some(name) = args.input_device {
        audio = audio.with_input_device(name);
    }
    if let Some(name) = args.output_device {
        audio = audio.with_output_device(name);
    }

    let history = Arc::new(InMemoryHistory::new());
    let handle = SessionHandle::spawn(Collaborators {
        connector: Arc::new(GeminiLive::new(ClientConfig::from(&config))),
        reviewer: Arc::new(ReviewerClient::new(
            config.rest_url.clone(),
            config.api_key.clone(),
            config.feedback_model.clone(),
        )),
        history: history.clone(),
        audio: Box::new(audio),
        settings: settings_rx,
        voice: config.voice.clone(),
    });

    let mut state = handle.subscribe();
    tokio::spawn(async move {
        let mut combo = 0;
        let mut last_feedback = None;
        let mut last_error = None;
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            if snapshot.combo != combo {
                combo = snapshot.combo;
                println!("combo x{combo}");
            }
            if let Some(feedback) = snapshot.latest_feedback {
                if last_feedback.as_ref() != Some(&feedback.id) {
                    println!("feedback: {}", feedback.corrected_text);
                    last_feedback = Some(feedback.id);
                }
            }
            if snapshot.last_error != last_error {
                if let Some(error) = &snapshot.last_error {
                    eprintln!("error: {error}");
                }
                last_error = snapshot.last_error;
            }
        }
    });

    handle.start(args.topic).await?;
    println!("Session started, press Ctrl-C to finish.");
    tokio::signal::ctrl_c().await?;

    if let Some(finalize) = handle.stop().await? {
        finalize.await?;
    }
    handle.shutdown().await;

    for record in history.sessions() {
        println!("{} | max combo {} | {}", record.date, record.max_combo, record.summary);
        for turn in &record.conversation {
            println!("  {:?}: {}", turn.speaker, turn.text);
        }
    }
    for item in history.feedback() {
        println!("- {}\n  -> {}", item.original_text, item.corrected_text);
        for comment in &item.comments {
            println!("     {comment}");
        }
    }
    Ok(())
}
