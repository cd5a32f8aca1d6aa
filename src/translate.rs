// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query translation into the encoder's expected language.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::errors::TranslationError;

/// Trait for query translators.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// Translator that pipes the query through an external command.
///
/// The command receives the raw query on stdin and must print the
/// translation on stdout.
pub struct CommandTranslator {
    command: String,
}

impl CommandTranslator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Translator for CommandTranslator {
    fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TranslationError(format!("failed to spawn '{}': {}", self.command, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| TranslationError(format!("failed to write query: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| TranslationError(format!("failed to read translation: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranslationError(format!(
                "command failed (status {}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let translated = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if translated.is_empty() {
            return Err(TranslationError("empty translation".to_string()));
        }
        Ok(translated)
    }
}
