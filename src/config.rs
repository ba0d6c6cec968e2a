//! Configuration types for the load pipeline
//!
//! This module contains the configuration structures used to size queues,
//! batch records for the sink, and map source streams to destination
//! streams. Configs are loaded from YAML or JSON.

use crate::error::{Error, Result, ResultExt};
use crate::queue::{EnqueueMode, QueueCapacityCalculator};
use crate::types::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Memory budget for queue buffering
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Queue and worker layout
    #[serde(default)]
    pub pipeline: QueueConfig,

    /// Sink batching limits
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Source to destination stream mapping
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Parse and validate a YAML config
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.num_partitions == 0 {
            return Err(Error::invalid_value(
                "pipeline.num_partitions",
                "must be greater than 0",
            ));
        }
        if self.pipeline.num_producers == 0 {
            return Err(Error::invalid_value(
                "pipeline.num_producers",
                "must be greater than 0",
            ));
        }
        if self.memory.reserved_bytes == 0 {
            return Err(Error::invalid_value(
                "memory.reserved_bytes",
                "must be greater than 0",
            ));
        }
        if self.memory.expected_message_size_bytes == 0 {
            return Err(Error::invalid_value(
                "memory.expected_message_size_bytes",
                "must be greater than 0",
            ));
        }
        if let Some(total) = self.memory.total_bytes {
            if total < self.memory.reserved_bytes {
                return Err(Error::invalid_value(
                    "memory.total_bytes",
                    "must be at least memory.reserved_bytes",
                ));
            }
        }
        if self.batching.max_records_per_batch == 0 {
            return Err(Error::invalid_value(
                "batching.max_records_per_batch",
                "must be greater than 0",
            ));
        }
        if self.batching.max_bytes_per_batch == 0 {
            return Err(Error::invalid_value(
                "batching.max_bytes_per_batch",
                "must be greater than 0",
            ));
        }
        if self.namespace.definition == NamespaceDefinition::CustomFormat
            && self.namespace.custom_format.is_none()
        {
            return Err(Error::invalid_value(
                "namespace.custom_format",
                "required when namespace.definition is custom_format",
            ));
        }
        Ok(())
    }

    /// Queue capacity calculator for a queue consumed by one worker per partition
    pub fn capacity_calculator(&self) -> QueueCapacityCalculator {
        let calculator = QueueCapacityCalculator::new(
            self.pipeline.num_producers,
            self.pipeline.num_partitions,
            self.pipeline.num_partitions,
            self.memory.reserved_bytes,
            self.memory.expected_message_size_bytes,
        );
        match self.pipeline.max_slots_per_partition {
            Some(max_slots) => calculator.with_max_slots(max_slots),
            None => calculator,
        }
    }

    /// Set the memory section
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Set the number of queue partitions
    #[must_use]
    pub fn with_partitions(mut self, num_partitions: usize) -> Self {
        self.pipeline.num_partitions = num_partitions;
        self
    }

    /// Set the queue mode
    #[must_use]
    pub fn with_queue_mode(mut self, queue_mode: EnqueueMode) -> Self {
        self.pipeline.queue_mode = queue_mode;
        self
    }

    /// Set the batching section
    #[must_use]
    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Set the namespace section
    #[must_use]
    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespace = namespace;
        self
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.logging.level = level;
        self
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Memory budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Bytes reserved for queue buffering
    #[serde(default = "default_reserved_bytes")]
    pub reserved_bytes: u64,

    /// Typical serialized message size
    #[serde(default = "default_expected_message_size")]
    pub expected_message_size_bytes: u64,

    /// Total memory the reservation is taken from (defaults to the reservation)
    #[serde(default)]
    pub total_bytes: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            reserved_bytes: default_reserved_bytes(),
            expected_message_size_bytes: default_expected_message_size(),
            total_bytes: None,
        }
    }
}

fn default_reserved_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_expected_message_size() -> u64 {
    1024 * 1024
}

// ============================================================================
// Queue Layout
// ============================================================================

/// Queue and worker layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Partitions per queue (and workers per step)
    #[serde(default = "default_num_partitions")]
    pub num_partitions: usize,

    /// Producers feeding the first queue
    #[serde(default = "default_num_producers")]
    pub num_producers: usize,

    /// Behaviour of enqueue after close
    #[serde(default)]
    pub queue_mode: EnqueueMode,

    /// Optional cap on slots per partition
    #[serde(default)]
    pub max_slots_per_partition: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            num_partitions: default_num_partitions(),
            num_producers: default_num_producers(),
            queue_mode: EnqueueMode::default(),
            max_slots_per_partition: None,
        }
    }
}

fn default_num_partitions() -> usize {
    4
}

fn default_num_producers() -> usize {
    1
}

// ============================================================================
// Batching
// ============================================================================

/// Sink batching limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Records buffered before a batch is written
    #[serde(default = "default_max_records")]
    pub max_records_per_batch: usize,

    /// Bytes buffered before a batch is written
    #[serde(default = "default_max_bytes")]
    pub max_bytes_per_batch: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_records_per_batch: default_max_records(),
            max_bytes_per_batch: default_max_bytes(),
        }
    }
}

fn default_max_records() -> usize {
    1000
}

fn default_max_bytes() -> u64 {
    8 * 1024 * 1024
}

// ============================================================================
// Namespace Mapping
// ============================================================================

/// Where the destination namespace comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceDefinition {
    /// Keep the source namespace
    #[default]
    Source,
    /// Use the destination's default namespace
    Destination,
    /// Render `custom_format`
    CustomFormat,
}

/// Source to destination stream mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace strategy
    #[serde(default)]
    pub definition: NamespaceDefinition,

    /// Destination default namespace
    #[serde(default)]
    pub default_namespace: Option<String>,

    /// Format with an optional `${SOURCE_NAMESPACE}` placeholder
    #[serde(default)]
    pub custom_format: Option<String>,

    /// Prefix prepended to every stream name
    #[serde(default)]
    pub stream_prefix: Option<String>,
}

// ============================================================================
// Logging
// ============================================================================

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    #[serde(default)]
    pub level: LogLevel,
}
