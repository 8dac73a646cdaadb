use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, MailSettings};
use base64::Engine;
use chrono::Local;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;
use wait_timeout::ChildExt;

/// Outbound message channel. A returned error means the message was not
/// delivered and the caller may retry later.
pub trait NotificationSink: Send + Sync {
    /// Stable sink identifier used in logs.
    fn id(&self) -> &'static str;

    fn send(&self, subject: &str, body: &str) -> AppResult<()>;
}

/// Logs reminders instead of delivering them. Used when mail is not configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn id(&self) -> &'static str {
        "log"
    }

    fn send(&self, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(subject = %subject, body = %body, "reminder delivered to log sink");
        Ok(())
    }
}

/// Hands a plain-text message to a sendmail-compatible program on stdin.
#[derive(Debug, Clone)]
pub struct MailCommandSink {
    settings: MailSettings,
}

impl MailCommandSink {
    pub fn new(settings: MailSettings) -> AppResult<Self> {
        if settings.program.trim().is_empty() {
            return Err(AppError::Validation("mail program cannot be empty".to_string()));
        }
        for (name, address) in [("from", &settings.from), ("to", &settings.to)] {
            if address.trim().is_empty() {
                return Err(AppError::Validation(format!("mail '{name}' address cannot be empty")));
            }
            if address.contains(['\r', '\n']) {
                return Err(AppError::Validation(format!(
                    "mail '{name}' address contains a line break"
                )));
            }
        }
        Ok(Self { settings })
    }

    pub fn compose(&self, subject: &str, body: &str) -> String {
        let mut message = String::new();
        message.push_str(&format!("From: {}\r\n", self.settings.from.trim()));
        message.push_str(&format!("To: {}\r\n", self.settings.to.trim()));
        message.push_str(&format!("Subject: {}\r\n", encode_header(subject)));
        message.push_str(&format!("Date: {}\r\n", Local::now().to_rfc2822()));
        message.push_str(&format!("Message-ID: <{}@task-reminder>\r\n", Uuid::new_v4().simple()));
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");
        message.push_str("\r\n");
        for line in body.lines() {
            message.push_str(line);
            message.push_str("\r\n");
        }
        message
    }
}

impl NotificationSink for MailCommandSink {
    fn id(&self) -> &'static str {
        "mail-command"
    }

    fn send(&self, subject: &str, body: &str) -> AppResult<()> {
        let message = self.compose(subject, body);
        let mut child = Command::new(&self.settings.program)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                AppError::Notification(format!(
                    "failed to start '{}': {}",
                    self.settings.program, error
                ))
            })?;

        // The program may stop reading before the message is fully written, so
        // the write must not run on the thread that enforces the timeout.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(message.as_bytes())?;
            }
            Ok(())
        });

        let timeout = Duration::from_millis(self.settings.timeout_ms);
        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = writer.join();
                return Err(AppError::Notification(format!(
                    "'{}' timed out after {}ms",
                    self.settings.program, self.settings.timeout_ms
                )));
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = writer.join();
                return Err(AppError::Notification(error.to_string()));
            }
        };
        let written = writer
            .join()
            .map_err(|_| AppError::Notification("message writer panicked".to_string()))?;

        if status.success() {
            return written.map_err(|error| {
                AppError::Notification(format!("failed to write message: {error}"))
            });
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let detail = stderr.trim();
        Err(AppError::Notification(if detail.is_empty() {
            format!("'{}' exited with {}", self.settings.program, status)
        } else {
            format!("'{}' exited with {}: {}", self.settings.program, status, detail)
        }))
    }
}

/// Picks the mail sink when mail is configured, the log sink otherwise.
pub fn sink_from_settings(settings: &AppSettings) -> AppResult<Arc<dyn NotificationSink>> {
    match settings.mail.clone() {
        Some(mail) => Ok(Arc::new(MailCommandSink::new(mail)?)),
        None => {
            tracing::warn!("no mail settings configured; reminders will only be logged");
            Ok(Arc::new(LogSink))
        }
    }
}

// RFC 2047 encoded-word for non-ASCII header values; line breaks are flattened.
fn encode_header(value: &str) -> String {
    let flat: String = value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect();
    if flat.is_ascii() {
        return flat;
    }
    format!(
        "=?utf-8?B?{}?=",
        base64::engine::general_purpose::STANDARD.encode(flat.as_bytes())
    )
}
