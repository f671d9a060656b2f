//! An ordered collection of chats with file import/export.
//!
//! Two container formats are supported, chosen by file extension: one
//! JSON object per line (`.jsonl`) and a single-column CSV holding the
//! same JSON strings (`.csv`). Import is all-or-nothing: a malformed
//! line aborts the whole load with the offending line number.

use std::fs;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ModelError;
use crate::model::chat::Chat;

const CSV_HEADER: &str = "chat";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    chats: Vec<Chat>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chat> {
        self.chats.iter()
    }

    pub fn add_chat(&mut self, chat: Chat) {
        self.chats.push(chat);
    }

    pub fn get_chat(&self, index: usize) -> Result<&Chat, ModelError> {
        self.chats.get(index).ok_or(ModelError::IndexOutOfRange {
            kind: "chats",
            index,
            len: self.chats.len(),
        })
    }

    pub fn get_chat_mut(&mut self, index: usize) -> Result<&mut Chat, ModelError> {
        let len = self.chats.len();
        self.chats.get_mut(index).ok_or(ModelError::IndexOutOfRange {
            kind: "chats",
            index,
            len,
        })
    }

    pub fn remove_chat(&mut self, index: usize) -> Result<Chat, ModelError> {
        if index >= self.chats.len() {
            return Err(ModelError::IndexOutOfRange {
                kind: "chats",
                index,
                len: self.chats.len(),
            });
        }
        Ok(self.chats.remove(index))
    }

    /// Clones the chat at `index` and appends the copy to the dataset.
    pub fn duplicate_chat(&mut self, index: usize) -> Result<(), ModelError> {
        let mut copy = self.get_chat(index)?.clone();
        copy.set_name(&format!("{} (copy)", copy.name()));
        self.chats.push(copy);
        Ok(())
    }

    fn chat_lines(&self) -> Result<Vec<String>, ModelError> {
        self.chats
            .iter()
            .map(|chat| {
                serde_json::to_string(chat)
                    .map_err(|e| ModelError::SchemaValidation(format!("serialize chat: {}", e)))
            })
            .collect()
    }

    pub fn export_jsonl(&self, path: &Path) -> Result<(), ModelError> {
        let mut out = String::new();
        for line in self.chat_lines()? {
            out.push_str(&line);
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    /// Training export: each line is the chat's OpenAI request payload.
    /// Lossy and one-way; tags and language are dropped.
    pub fn export_openai_jsonl(&self, path: &Path) -> Result<(), ModelError> {
        let mut out = String::new();
        for chat in &self.chats {
            out.push_str(&chat.to_openai_request().to_string());
            out.push('\n');
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn import_jsonl(path: &Path) -> Result<Self, ModelError> {
        let contents = fs::read_to_string(path)?;
        let mut dataset = Dataset::new();
        for (i, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| ModelError::import_parse(i + 1, e))?;
            let chat = Chat::from_value(value).map_err(|e| ModelError::import_parse(i + 1, e))?;
            dataset.add_chat(chat);
        }
        Ok(dataset)
    }

    pub fn export_csv(&self, path: &Path) -> Result<(), ModelError> {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for line in self.chat_lines()? {
            // JSON strings contain no literal newlines, so one record is
            // one physical line; quotes are doubled per the CSV rules.
            out.push('"');
            out.push_str(&line.replace('"', "\"\""));
            out.push_str("\"\n");
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn import_csv(path: &Path) -> Result<Self, ModelError> {
        let contents = fs::read_to_string(path)?;
        let mut lines = contents.lines().enumerate();

        let header = lines
            .next()
            .map(|(_, l)| l.trim().trim_matches('"'))
            .unwrap_or_default();
        if header != CSV_HEADER {
            return Err(ModelError::import_parse(
                1,
                format!("expected `{}` header, got `{}`", CSV_HEADER, header),
            ));
        }

        let mut dataset = Dataset::new();
        for (i, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let cell = unquote_csv_cell(line)
                .ok_or_else(|| ModelError::import_parse(i + 1, "malformed CSV record"))?;
            let value: Value = serde_json::from_str(&cell)
                .map_err(|e| ModelError::import_parse(i + 1, e))?;
            let chat = Chat::from_value(value).map_err(|e| ModelError::import_parse(i + 1, e))?;
            dataset.add_chat(chat);
        }
        Ok(dataset)
    }

    /// Dispatches on file extension (`.jsonl` vs `.csv`).
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        match extension(path) {
            Some("jsonl") => self.export_jsonl(path),
            Some("csv") => self.export_csv(path),
            other => Err(ModelError::SchemaValidation(format!(
                "unsupported dataset extension: {:?}",
                other
            ))),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        match extension(path) {
            Some("jsonl") => Self::import_jsonl(path),
            Some("csv") => Self::import_csv(path),
            other => Err(ModelError::SchemaValidation(format!(
                "unsupported dataset extension: {:?}",
                other
            ))),
        }
    }

    /// Content hash over the persisted form, used for unsaved-change
    /// detection. Not a cryptographic integrity check.
    pub fn fingerprint(&self) -> Result<String, ModelError> {
        let mut hasher = Sha256::new();
        for line in self.chat_lines()? {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

/// Strips the quoting from a single-column CSV record. An unquoted cell
/// is returned as-is; a quoted cell has its outer quotes removed and
/// doubled quotes collapsed. Returns None for an unterminated quote.
fn unquote_csv_cell(line: &str) -> Option<String> {
    let line = line.trim_end_matches('\r');
    if let Some(rest) = line.strip_prefix('"') {
        let inner = rest.strip_suffix('"')?;
        Some(inner.replace("\"\"", "\""))
    } else {
        Some(line.to_string())
    }
}
