use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, Level};

use signspeak::capture::{ScriptCard, SyntheticCamera, NEUTRAL_CARD};
use signspeak::classify::card_color;
use signspeak::{
    AppError, ConsoleSpeech, DetectionLabel, LogHaptics, PaletteClassifier, Settings,
    TranslatorBuilder,
};

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

/// Walks the whole vocabulary with neutral gaps in between, like signing
/// each phrase at the camera one after another.
fn demo_script() -> Vec<ScriptCard> {
    let mut script = Vec::new();
    for label in DetectionLabel::ALL {
        script.push(ScriptCard::new(card_color(label), 75));
        script.push(ScriptCard::new(NEUTRAL_CARD, 45));
    }
    script
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logging();
    let settings = Settings::load()?;
    info!(?settings, "settings loaded");

    let camera = SyntheticCamera::new(demo_script()).with_fps(30).with_noise(6);
    let classifier = PaletteClassifier::new(settings.high_accuracy);
    let translator = TranslatorBuilder::new()
        .frame_source(Arc::new(camera))
        .classifier(Arc::new(classifier))
        .speech(Arc::new(ConsoleSpeech::default()))
        .haptics(Arc::new(LogHaptics))
        .settings(settings.clone())
        .build()?;

    if settings.show_debug_info {
        let mut events = translator.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => info!(?event, "pipeline event"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event stream lagged")
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let mut label_rx = translator.detected_label();
    tokio::spawn(async move {
        while label_rx.changed().await.is_ok() {
            if let Some(label) = *label_rx.borrow_and_update() {
                info!(%label, "detected");
            }
        }
    });

    translator.start().await?;
    info!("translating, ctrl-c to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping");
        }
        _ = translator.join() => {
            info!("frame source finished");
        }
    }
    translator.stop();
    translator.join().await;
    Ok(())
}
