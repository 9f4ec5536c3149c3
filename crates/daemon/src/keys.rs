//! Line-based keyboard controls read from stdin.
//!
//! `p` or a single space toggles pause, `q` or `Esc` quits. Each command is
//! confirmed with Enter.

use std::io::BufRead;
use std::sync::Arc;

use tracing::debug;

use foldersync_core::control::SyncControl;
use foldersync_core::models::Operation;
use foldersync_core::notify::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    TogglePause,
    Quit,
}

/// Map one input line to a command.
pub fn parse_line(line: &str) -> Option<KeyCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == " " {
        return Some(KeyCommand::TogglePause);
    }
    match line.trim().to_ascii_lowercase().as_str() {
        "p" => Some(KeyCommand::TogglePause),
        "q" | "\u{1b}" => Some(KeyCommand::Quit),
        _ => None,
    }
}

/// Flip the pause flag and report the new state.
pub fn toggle_pause(control: &SyncControl, notifier: &dyn Notify) {
    if control.toggle_pause() {
        notifier.notify(Operation::Info, "Synchronization paused. Press p to resume.");
    } else {
        notifier.notify(Operation::Info, "Synchronization resumed.");
    }
}

/// Spawn the stdin listener on its own thread.
///
/// A plain thread rather than a runtime task: a blocking stdin read cannot
/// be cancelled and would otherwise hold up runtime shutdown.
pub fn spawn(control: SyncControl, notifier: Arc<dyn Notify>) {
    let spawned = std::thread::Builder::new()
        .name("foldersync-keys".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_line(&line) {
                    Some(KeyCommand::TogglePause) => toggle_pause(&control, notifier.as_ref()),
                    Some(KeyCommand::Quit) => {
                        notifier.notify(Operation::Info, "Quitting.");
                        control.cancel();
                        break;
                    }
                    None => debug!(input = %line, "ignoring unknown key command"),
                }
            }
            debug!("keyboard listener stopped");
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to start keyboard listener");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldersync_core::notify::MemoryNotifier;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("p"), Some(KeyCommand::TogglePause));
        assert_eq!(parse_line("P\r"), Some(KeyCommand::TogglePause));
        assert_eq!(parse_line(" "), Some(KeyCommand::TogglePause));
        assert_eq!(parse_line("q"), Some(KeyCommand::Quit));
        assert_eq!(parse_line("\u{1b}"), Some(KeyCommand::Quit));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("pause"), None);
    }

    #[test]
    fn test_toggle_pause_notifies() {
        let control = SyncControl::new();
        let sink = MemoryNotifier::new();

        toggle_pause(&control, &sink);
        assert!(control.is_paused());
        toggle_pause(&control, &sink);
        assert!(!control.is_paused());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].1.contains("paused"));
        assert!(events[1].1.contains("resumed"));
    }
}
