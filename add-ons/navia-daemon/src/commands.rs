//! Spoken commands and the stdin recognition host.
//!
//! The phone app had buttons for search, chat, live monitoring and a one-shot check.
//! Headless, each of those is a phrase; anything else goes to the assistant.

use navia_core::{CycleOutcome, Navigator};
use navia_voice::{BridgeCommand, BridgeMessage, BridgeRecognizer, STATUS_STARTING};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate(String),
    StopNavigation,
    LiveOn,
    LiveOff,
    Check,
    Status,
    Reset,
    Quit,
    Chat(String),
}

const NAVIGATE_PREFIXES: &[&str] = &["navigate to ", "take me to ", "go to ", "directions to "];

impl Command {
    /// `None` for blank input.
    pub fn parse(utterance: &str) -> Option<Self> {
        let text = utterance.trim();
        if text.is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        for prefix in NAVIGATE_PREFIXES {
            if !lowered.starts_with(prefix) {
                continue;
            }
            let destination = text.get(prefix.len()..).map(str::trim).unwrap_or_default();
            if !destination.is_empty() {
                return Some(Command::Navigate(destination.to_string()));
            }
        }
        let command = match lowered.trim_end_matches(['.', '!', '?']) {
            "stop navigation" | "cancel route" | "stop route" => Command::StopNavigation,
            "live on" | "start monitoring" | "activate" => Command::LiveOn,
            "live off" | "stop monitoring" | "deactivate" => Command::LiveOff,
            "check" | "check surroundings" | "what's around" | "what is around me" => Command::Check,
            "status" => Command::Status,
            "reset" | "new conversation" => Command::Reset,
            "quit" | "exit" | "goodbye" => Command::Quit,
            _ => Command::Chat(text.to_string()),
        };
        Some(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Act on one utterance.
pub async fn dispatch(navigator: &Navigator, utterance: &str) -> Flow {
    let Some(command) = Command::parse(utterance) else {
        return Flow::Continue;
    };
    info!(target: "navia::daemon", ?command, "command");
    match command {
        Command::Navigate(destination) => {
            let outcome = navigator.navigate_to(&destination).await;
            info!(target: "navia::daemon", ?outcome, "route search finished");
        }
        Command::StopNavigation => {
            navigator.stop_navigation();
        }
        Command::LiveOn => {
            navigator.set_live_monitoring(true).await;
        }
        Command::LiveOff => {
            navigator.set_live_monitoring(false).await;
        }
        Command::Check => {
            if let CycleOutcome::Decided(decision) = navigator.check_surroundings().await {
                info!(target: "navia::daemon", ?decision, "surroundings checked");
            }
        }
        Command::Status => match serde_json::to_string_pretty(&navigator.status()) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!(target: "navia::daemon", error = %e, "status not serializable"),
        },
        Command::Reset => navigator.reset_conversation().await,
        Command::Quit => return Flow::Quit,
        Command::Chat(text) => {
            navigator.converse(&text, None).await;
        }
    }
    Flow::Continue
}

/// Bridge host fed by text lines: each `START` consumes one line as the recognized
/// utterance. Lines starting with `{` are passed through as raw bridge messages, so a
/// session can be scripted. End of input cancels `token`.
pub async fn run_line_host<R>(
    bridge: Arc<BridgeRecognizer>,
    mut commands: mpsc::Receiver<BridgeCommand>,
    input: R,
    token: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    bridge.deliver(BridgeMessage::Ready);
    loop {
        let command = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            c = commands.recv() => c,
        };
        match command {
            None => break,
            Some(BridgeCommand::Stop) => continue,
            Some(BridgeCommand::Start) => {}
        }

        bridge.deliver(BridgeMessage::Status(STATUS_STARTING.to_string()));
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            l = lines.next_line() => l,
        };
        match line {
            Ok(Some(text)) if text.trim_start().starts_with('{') => {
                if let Err(e) = bridge.handle_message(&text) {
                    bridge.deliver(BridgeMessage::Error(e.to_string()));
                }
            }
            Ok(Some(text)) if text.trim().is_empty() => {
                bridge.deliver(BridgeMessage::Error("no-speech".to_string()));
            }
            Ok(Some(text)) => bridge.deliver(BridgeMessage::Result(text)),
            Ok(None) => {
                info!(target: "navia::daemon", "input closed");
                bridge.deliver(BridgeMessage::End);
                token.cancel();
                break;
            }
            Err(e) => {
                warn!(target: "navia::daemon", error = %e, "input read failed");
                bridge.deliver(BridgeMessage::Error(e.to_string()));
            }
        }
        bridge.deliver(BridgeMessage::End);
    }
    bridge.unregister_bridge();
}
