use promptdeck_core::redact_sensitive_text;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-run log file under `<data_dir>/promptdeck/logs`.
pub struct SessionLogger {
    path: Option<PathBuf>,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl SessionLogger {
    pub fn new() -> Self {
        match log_dir() {
            Some(dir) => Self::in_dir(&dir),
            None => Self::disabled(),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        let _ = create_dir_all(dir);
        let log_path = dir.join(format!("session-{}.log", now_millis()));
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok()
            .map(BufWriter::new);
        match writer {
            Some(writer) => Self {
                path: Some(log_path),
                writer: Mutex::new(Some(writer)),
            },
            None => Self::disabled(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            writer: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn display_path(&self) -> Option<String> {
        self.path().map(|p| p.display().to_string())
    }

    pub fn event(&self, label: &str, message: &str) {
        let sanitized = sanitize_for_log(message);
        let bounded = truncate_with_notice(&sanitized, MAX_EVENT_BYTES);
        let line = format!("[{}] {} {}", now_millis(), label, bounded);
        self.append_line(&line);
    }

    pub fn block(&self, label: &str, body: &str) {
        self.append_line(&format!("[{}] {} BEGIN", now_millis(), label));
        let sanitized = sanitize_for_log(body);
        let bounded = truncate_with_notice(&sanitized, MAX_BLOCK_BYTES);
        for line in bounded.lines() {
            self.append_line(line);
        }
        self.append_line(&format!("[{}] {} END", now_millis(), label));
    }

    fn append_line(&self, line: &str) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };
        if writeln!(writer, "{}", line).is_ok() {
            let _ = writer.flush();
        }
    }
}

pub fn log_dir() -> Option<PathBuf> {
    let base = dirs::data_dir().or_else(|| std::env::current_dir().ok())?;
    Some(base.join("promptdeck").join("logs"))
}

const MAX_EVENT_BYTES: usize = 4096;
const MAX_BLOCK_BYTES: usize = 65536;

fn sanitize_for_log(input: &str) -> String {
    redact_sensitive_text(input)
}

fn truncate_with_notice(input: &str, limit: usize) -> String {
    if input.len() <= limit {
        return input.to_string();
    }

    let mut out = String::new();
    for ch in input.chars() {
        if out.len() + ch.len_utf8() > limit.saturating_sub(64) {
            break;
        }
        out.push(ch);
    }
    let omitted = input.len().saturating_sub(out.len());
    out.push_str(&format!("\n...[truncated {} bytes]", omitted));
    out
}

pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
