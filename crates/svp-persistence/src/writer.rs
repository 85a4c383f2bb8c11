//! JSON Lines file writer for tick snapshots.
//!
//! One object per line, opened in append mode, so an interrupted write
//! only loses its own line. Files rotate on the UTC date of the record.

use crate::error::PersistenceResult;
use crate::record::SnapshotRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Open file for one day.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

fn close(mut active: ActiveWriter) {
    if let Err(e) = active.writer.flush() {
        warn!(?e, "Failed to flush writer on close");
    }
    info!(
        date = %active.date,
        records = active.records_written,
        "Closed snapshot file"
    );
}

/// Buffered, date-rotating snapshot writer.
pub struct JsonLinesWriter {
    base_dir: PathBuf,
    buffer: Vec<SnapshotRecord>,
    /// Buffer size that triggers a flush.
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl JsonLinesWriter {
    pub fn new(base_dir: impl AsRef<Path>, max_buffer_size: usize) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create snapshot directory");
        }

        Self {
            base_dir,
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        }
    }

    /// Path of the file holding records for `date`.
    pub fn path_for(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("snapshots_{date}.jsonl"))
    }

    /// Queue a record, flushing once the buffer is full.
    pub fn append(&mut self, record: SnapshotRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn close_active_writer(&mut self) {
        if let Some(active) = self.active_writer.take() {
            close(active);
        }
    }

    /// Writer for `date`, rotating if the open file is for another day.
    fn writer_for(&mut self, date: &str) -> PersistenceResult<&mut ActiveWriter> {
        let active = match self.active_writer.take() {
            Some(active) if active.date == date => active,
            previous => {
                if let Some(previous) = previous {
                    close(previous);
                }
                let path = self.path_for(date);
                info!(path = %path.display(), "Opening snapshot file (append mode)");
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveWriter {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                    records_written: 0,
                }
            }
        };
        Ok(self.active_writer.insert(active))
    }

    /// Write all buffered records.
    ///
    /// Records stay buffered until their line is written, so a failed flush
    /// keeps the unwritten tail for the next attempt.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut written = 0;
        let result = self.write_buffered(&mut written);
        self.buffer.drain(..written);
        if let Err(e) = &result {
            warn!(error = %e, written, pending = self.buffer.len(), "Snapshot flush failed");
        } else {
            debug!(records = written, "Flushed snapshots");
        }
        result
    }

    fn write_buffered(&mut self, written: &mut usize) -> PersistenceResult<()> {
        while let Some(record) = self.buffer.get(*written) {
            let line = serde_json::to_string(record)?;
            let date = record.date();
            let active = self.writer_for(&date)?;
            writeln!(active.writer, "{line}")?;
            active.records_written += 1;
            *written += 1;
        }

        if let Some(active) = self.active_writer.as_mut() {
            active.writer.flush()?;
        }
        Ok(())
    }

    /// Flush pending records and close the file.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush snapshots on drop");
        }
        self.close_active_writer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MULTI_EXCHANGE;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::io::{BufRead, BufReader};
    use svp_detector::{ConfluenceLabel, MetricId, SignalKind, TimeframeDeltas};
    use tempfile::TempDir;

    // 2024-01-01T00:00:00Z
    const DAY1: i64 = 1_704_067_200_000;
    const DAY_MS: i64 = 86_400_000;

    fn record(timestamp_ms: i64) -> SnapshotRecord {
        let mut deltas = TimeframeDeltas::new();
        deltas.insert(
            "5m",
            BTreeMap::from([
                (MetricId::CbCvd, dec!(2.5)),
                (MetricId::BinSpot, dec!(1)),
                (MetricId::BinPerp, dec!(-3)),
            ]),
        );
        SnapshotRecord {
            timestamp_ms,
            exchange: MULTI_EXCHANGE.to_string(),
            signal: SignalKind::SpotLedWithBtc,
            confidence: 8,
            bias: ConfluenceLabel::SpotDominant,
            price: Some(dec!(142.35)),
            funding_rate: dec!(0.01),
            spike: false,
            spike_delta: Decimal::ZERO,
            btc_spot: dec!(12.5),
            btc_perp: dec!(-4),
            oi: Default::default(),
            liquidations: Default::default(),
            sentiment: Default::default(),
            deltas,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        BufReader::new(file).lines().map_while(Result::ok).collect()
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(dir.path(), 100);
        for i in 0..3 {
            writer.append(record(DAY1 + i)).unwrap();
        }
        assert_eq!(writer.pending(), 3);
        writer.close().unwrap();

        let lines = read_lines(&dir.path().join("snapshots_2024-01-01.jsonl"));
        assert_eq!(lines.len(), 3);

        let parsed: SnapshotRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed, record(DAY1));

        let raw: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        for field in [
            "timestamp_ms",
            "exchange",
            "signal",
            "confidence",
            "bias",
            "price",
            "funding_rate",
            "spike",
            "spike_delta",
            "btc_spot",
            "btc_perp",
            "oi",
            "liquidations",
            "sentiment",
            "deltas",
        ] {
            assert!(raw.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(raw["exchange"], "multi");
    }

    #[test]
    fn test_append_across_writers() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = JsonLinesWriter::new(dir.path(), 1);
            writer.append(record(DAY1)).unwrap();
        }
        {
            let mut writer = JsonLinesWriter::new(dir.path(), 1);
            writer.append(record(DAY1 + 1)).unwrap();
        }

        let lines = read_lines(&dir.path().join("snapshots_2024-01-01.jsonl"));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_rotates_on_record_date() {
        let dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(dir.path(), 1);
        writer.append(record(DAY1 + DAY_MS - 1)).unwrap();
        writer.append(record(DAY1 + DAY_MS)).unwrap();
        writer.close().unwrap();

        assert_eq!(read_lines(&writer.path_for("2024-01-01")).len(), 1);
        assert_eq!(read_lines(&writer.path_for("2024-01-02")).len(), 1);
    }

    #[test]
    fn test_failed_flush_keeps_records() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();

        let mut writer = JsonLinesWriter::new(&blocker, 3);
        writer.append(record(DAY1)).unwrap();
        writer.append(record(DAY1 + 1)).unwrap();
        assert!(writer.append(record(DAY1 + 2)).is_err());
        assert_eq!(writer.pending(), 3);

        assert!(writer.flush().is_err());
        assert_eq!(writer.pending(), 3);
    }

    #[test]
    fn test_empty_flush_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(dir.path(), 10);
        writer.flush().unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty());
    }
}
