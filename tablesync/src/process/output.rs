use regex::Regex;
use std::sync::LazyLock;

use crate::state::log::LogLevel;

/// DML statement prefixes counted as one applied row each.
const DML_PREFIXES: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];

/// Tokens classifying a line as an error report.
const ERROR_TOKENS: [&str; 2] = ["error", "fatal"];

/// Tokens classifying a line as a warning.
const WARNING_TOKENS: [&str; 2] = ["warning", "warn"];

/// Phrases the tool prints when it finishes working on a table.
const COMPLETION_TOKENS: [&str; 2] = ["completed", "finished"];

/// Matches an embedded `processed/total` progress pair.
static PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)/(\d+)\b").expect("progress pattern is valid"));

/// Structured observation produced while classifying tool output.
///
/// The process controller only ever emits these over a channel; applying
/// them to shared state is the orchestrator's job.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// One DML statement was echoed, meaning one row was applied.
    RowApplied,
    /// The tool reported explicit progress as a processed/total pair.
    Progress { processed: u64, total: u64 },
    /// A line worth surfacing in the run log.
    Log { level: LogLevel, message: String },
    /// An error token was seen. The exit code stays authoritative for the
    /// final verdict; this only flips the live status.
    TableFailed,
}

/// Classifies one line of the tool's standard output.
///
/// Priorities, applied in order: DML statements, progress pairs, completion
/// phrases, error tokens, warning tokens, everything else informational.
/// Blank lines produce nothing.
pub fn classify_stdout_line(line: &str) -> Vec<SyncEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let lowered = trimmed.to_lowercase();

    if is_dml_statement(trimmed) {
        let mut events = vec![SyncEvent::RowApplied];
        if contains_any(&lowered, &ERROR_TOKENS) {
            events.push(SyncEvent::Log {
                level: LogLevel::Error,
                message: trimmed.to_string(),
            });
        }
        return events;
    }

    if let Some(captures) = PROGRESS_RE.captures(trimmed) {
        if let (Ok(processed), Ok(total)) = (captures[1].parse(), captures[2].parse()) {
            return vec![SyncEvent::Progress { processed, total }];
        }
    }

    if contains_any(&lowered, &COMPLETION_TOKENS) {
        return vec![SyncEvent::Log {
            level: LogLevel::Info,
            message: trimmed.to_string(),
        }];
    }

    if contains_any(&lowered, &ERROR_TOKENS) {
        return vec![
            SyncEvent::Log {
                level: LogLevel::Error,
                message: trimmed.to_string(),
            },
            SyncEvent::TableFailed,
        ];
    }

    if contains_any(&lowered, &WARNING_TOKENS) {
        return vec![SyncEvent::Log {
            level: LogLevel::Warning,
            message: trimmed.to_string(),
        }];
    }

    vec![SyncEvent::Log {
        level: LogLevel::Info,
        message: trimmed.to_string(),
    }]
}

/// Classifies one line of the tool's standard error.
///
/// Same priorities as stdout, collapsed: error tokens, warning tokens,
/// everything else informational.
pub fn classify_stderr_line(line: &str) -> Vec<SyncEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let lowered = trimmed.to_lowercase();

    if contains_any(&lowered, &ERROR_TOKENS) {
        return vec![
            SyncEvent::Log {
                level: LogLevel::Error,
                message: trimmed.to_string(),
            },
            SyncEvent::TableFailed,
        ];
    }

    if contains_any(&lowered, &WARNING_TOKENS) {
        return vec![SyncEvent::Log {
            level: LogLevel::Warning,
            message: trimmed.to_string(),
        }];
    }

    vec![SyncEvent::Log {
        level: LogLevel::Info,
        message: trimmed.to_string(),
    }]
}

fn is_dml_statement(trimmed: &str) -> bool {
    let Some(first_word) = trimmed.split_whitespace().next() else {
        return false;
    };

    DML_PREFIXES
        .iter()
        .any(|prefix| first_word.eq_ignore_ascii_case(prefix))
}

fn contains_any(lowered: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|token| lowered.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dml_lines_count_one_applied_row() {
        let events = classify_stdout_line("INSERT INTO `users` VALUES (1, 'a')");
        assert_eq!(events, vec![SyncEvent::RowApplied]);

        let events = classify_stdout_line("REPLACE INTO `users` VALUES (2, 'b')");
        assert_eq!(events, vec![SyncEvent::RowApplied]);
    }

    #[test]
    fn dml_lines_with_error_tokens_also_log() {
        let events = classify_stdout_line("DELETE FROM `users` -- error: lock wait timeout");

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SyncEvent::RowApplied);
        assert!(matches!(
            &events[1],
            SyncEvent::Log {
                level: LogLevel::Error,
                ..
            }
        ));
    }

    #[test]
    fn progress_pairs_update_counters() {
        let events = classify_stdout_line("syncing chunk 3/10");

        assert_eq!(
            events,
            vec![SyncEvent::Progress {
                processed: 3,
                total: 10
            }]
        );
    }

    #[test]
    fn completion_phrases_log_as_info() {
        let events = classify_stdout_line("table sync completed");

        assert_eq!(
            events,
            vec![SyncEvent::Log {
                level: LogLevel::Info,
                message: "table sync completed".to_string()
            }]
        );
    }

    #[test]
    fn error_lines_log_and_mark_the_table() {
        let events = classify_stdout_line("ERROR 1045: access denied");

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            SyncEvent::Log {
                level: LogLevel::Error,
                ..
            }
        ));
        assert_eq!(events[1], SyncEvent::TableFailed);
    }

    #[test]
    fn warning_lines_log_as_warning() {
        let events = classify_stdout_line("Warning: skipping trigger check");

        assert_eq!(
            events,
            vec![SyncEvent::Log {
                level: LogLevel::Warning,
                message: "Warning: skipping trigger check".to_string()
            }]
        );
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert!(classify_stdout_line("   ").is_empty());
        assert!(classify_stderr_line("").is_empty());
    }

    #[test]
    fn other_lines_are_informational() {
        let events = classify_stdout_line("checking table checksums");

        assert_eq!(
            events,
            vec![SyncEvent::Log {
                level: LogLevel::Info,
                message: "checking table checksums".to_string()
            }]
        );
    }

    #[test]
    fn stderr_errors_mark_the_table() {
        let events = classify_stderr_line("fatal: cannot connect to target");

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SyncEvent::TableFailed);
    }

    #[test]
    fn stderr_other_lines_are_informational() {
        let events = classify_stderr_line("using default charset");

        assert_eq!(
            events,
            vec![SyncEvent::Log {
                level: LogLevel::Info,
                message: "using default charset".to_string()
            }]
        );
    }
}
