//! Capture files
//!
//! A capture is JSON lines, one `{topic, payload_hex, received_at_ms?}`
//! record per gateway message. Blank lines and lines starting with `#`
//! are skipped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One captured gateway message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Topic the message was published on
    #[serde(default)]
    pub topic: String,
    /// Envelope bytes as hex
    pub payload_hex: String,
    /// Local receive time, used when the packet carries none
    #[serde(default)]
    pub received_at_ms: Option<i64>,
}

impl CaptureRecord {
    pub fn new(topic: impl Into<String>, payload: &[u8]) -> Self {
        Self {
            topic: topic.into(),
            payload_hex: hex::encode(payload),
            received_at_ms: None,
        }
    }

    pub fn at(mut self, received_at_ms: i64) -> Self {
        self.received_at_ms = Some(received_at_ms);
        self
    }

    /// Decoded envelope bytes
    pub fn payload(&self) -> Result<Vec<u8>> {
        hex::decode(self.payload_hex.trim()).context("payload_hex is not valid hex")
    }
}

/// Parse capture text
pub fn parse_capture(text: &str) -> Result<Vec<CaptureRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| format!("capture line {}", index + 1))
        })
        .collect()
}

/// Read a capture file
pub async fn read_capture(path: &Path) -> Result<Vec<CaptureRecord>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading capture {}", path.display()))?;
    parse_capture(&text)
}

/// Render records as capture text
pub fn write_capture(records: &[CaptureRecord]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_comments() {
        let text = "# capture\n\n{\"topic\":\"msh/US/2/e/LongFast/!1\",\"payload_hex\":\"0a00\"}\n";
        let records = parse_capture(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload().unwrap(), vec![0x0a, 0x00]);
        assert_eq!(records[0].received_at_ms, None);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let err = parse_capture("{\"payload_hex\":\"00\"}\nnot json\n").unwrap_err();
        assert!(format!("{err:#}").contains("capture line 2"));
    }

    #[test]
    fn test_bad_hex() {
        let record = CaptureRecord {
            topic: String::new(),
            payload_hex: "zz".to_string(),
            received_at_ms: None,
        };
        assert!(record.payload().is_err());
    }

    #[test]
    fn test_write_then_parse() {
        let records = vec![
            CaptureRecord::new("t", &[1, 2, 3]).at(5),
            CaptureRecord::new("", &[]),
        ];
        let text = write_capture(&records).unwrap();
        assert_eq!(parse_capture(&text).unwrap(), records);
    }

    #[tokio::test]
    async fn test_read_capture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jsonl");
        tokio::fs::write(&path, "{\"topic\":\"x\",\"payload_hex\":\"ff\"}\n")
            .await
            .unwrap();
        let records = read_capture(&path).await.unwrap();
        assert_eq!(records[0].topic, "x");
    }
}
