use crate::streamer_core::trade_detector::{TradeDirection, TradeSignal};
use crate::streamer_core::writer_backend::{SignalWriter, WriterError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One journal line per classified signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: i64,
    pub signature: String,
    pub action: TradeDirection,
    pub actor: String,
    pub mint: String,
    pub sol_amount: f64,
    pub latency_ms: i64,
    pub dispatched: bool,
}

impl SignalRecord {
    pub fn from_signal(signal: &TradeSignal, dispatched: bool) -> Self {
        Self {
            timestamp: signal.event_timestamp.timestamp_millis(),
            signature: signal.signature.clone(),
            action: signal.direction,
            actor: signal.actor_address.clone(),
            mint: signal.token_mint_address.clone(),
            sol_amount: signal.sol_amount,
            latency_ms: signal.observed_latency_ms,
            dispatched,
        }
    }
}

pub struct JsonlWriter {
    file: BufWriter<File>,
    current_size: u64,
    max_size: u64,
    base_path: PathBuf,
    rotation_count: u32,
    max_rotations: u32,
}

impl JsonlWriter {
    pub fn new(path: impl AsRef<Path>, max_size_mb: u64, max_rotations: u32) -> Result<Self, WriterError> {
        Self::with_max_bytes(path, max_size_mb.saturating_mul(1024 * 1024), max_rotations)
    }

    pub fn with_max_bytes(
        path: impl AsRef<Path>,
        max_size: u64,
        max_rotations: u32,
    ) -> Result<Self, WriterError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            file: BufWriter::new(file),
            current_size,
            max_size,
            base_path: path.to_path_buf(),
            rotation_count: 0,
            max_rotations,
        })
    }

    pub fn write_record(&mut self, record: &SignalRecord) -> Result<(), WriterError> {
        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{}", json)?;
        self.file.flush()?;

        self.current_size += (json.len() + 1) as u64;

        if self.max_size > 0 && self.current_size >= self.max_size {
            self.rotate()?;
        }

        Ok(())
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = self.base_path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> Result<(), WriterError> {
        self.file.flush()?;

        if self.max_rotations == 0 {
            std::fs::remove_file(&self.base_path)?;
        } else {
            let oldest = self.rotated_path(self.max_rotations);
            if oldest.exists() {
                std::fs::remove_file(&oldest)?;
            }
            for i in (1..self.max_rotations).rev() {
                let old_path = self.rotated_path(i);
                if old_path.exists() {
                    std::fs::rename(&old_path, self.rotated_path(i + 1))?;
                }
            }
            std::fs::rename(&self.base_path, self.rotated_path(1))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base_path)?;

        self.file = BufWriter::new(file);
        self.current_size = 0;
        self.rotation_count += 1;

        log::info!("📄 Rotated signal journal (rotation #{})", self.rotation_count);

        Ok(())
    }
}

#[async_trait]
impl SignalWriter for JsonlWriter {
    async fn write(&mut self, record: &SignalRecord) -> Result<(), WriterError> {
        self.write_record(record)
    }

    async fn flush(&mut self) -> Result<(), WriterError> {
        self.file.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}
