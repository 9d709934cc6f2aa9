// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output emitters: delimited JSON-lines records for types and topics.
//!
//! Each record is a single-line JSON object framed by `>>> type`/`<<< type`
//! (or the `topic` equivalents) so downstream parsers can split a mixed
//! stream. A single mutex serialises writes; interleaved records from
//! concurrent producers are never torn.

use crate::idl::to_idl;
use crate::typecode::TypeCode;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

const BEGIN_TYPE: &str = ">>> type";
const END_TYPE: &str = "<<< type";
const BEGIN_TOPIC: &str = ">>> topic";
const END_TOPIC: &str = "<<< topic";

/// Errors raised while opening or writing output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sink for asserted descriptors and topic bindings.
pub trait OutputEmitter: Send + Sync {
    fn open(&self) -> Result<(), OutputError>;

    fn close(&self);

    fn emit_type(&self, tc: &TypeCode) -> Result<(), OutputError>;

    fn emit_topic(&self, topic_name: &str, tc: &TypeCode) -> Result<(), OutputError>;
}

/// Output configuration.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Destination file; `None` writes to the standard stream.
    pub output_file: Option<PathBuf>,
    /// Append to an existing file instead of truncating.
    pub append: bool,
    /// Overwrite an existing file.
    pub overwrite: bool,
    /// Send records to stderr (and diagnostics to stdout).
    pub swap_outputs: bool,
}

#[derive(Serialize)]
struct TypeRecord<'a> {
    fqname: &'a str,
    idl: String,
}

#[derive(Serialize)]
struct TopicRecord<'a> {
    name: &'a str,
    type_name: &'a str,
    idl: String,
}

enum Sink {
    File(BufWriter<std::fs::File>),
    Stdout,
    Stderr,
}

impl Sink {
    fn write_record(&mut self, begin: &str, payload: &str, end: &str) -> io::Result<()> {
        match self {
            Sink::File(file) => {
                writeln!(file, "{begin}\n{payload}\n{end}")?;
                file.flush()
            }
            Sink::Stdout => {
                let stdout = io::stdout();
                let mut lock = stdout.lock();
                writeln!(lock, "{begin}\n{payload}\n{end}")?;
                lock.flush()
            }
            Sink::Stderr => {
                let stderr = io::stderr();
                let mut lock = stderr.lock();
                writeln!(lock, "{begin}\n{payload}\n{end}")?;
                lock.flush()
            }
        }
    }
}

/// JSON-lines output emitter writing to a file or a standard stream.
pub struct JsonOutput {
    options: OutputOptions,
    sink: Mutex<Option<Sink>>,
}

impl JsonOutput {
    pub fn new(options: OutputOptions) -> Self {
        let target = match &options.output_file {
            Some(path) => path.display().to_string(),
            None if options.swap_outputs => "stderr".to_string(),
            None => "stdout".to_string(),
        };
        debug!(
            output = %target,
            append = options.append,
            overwrite = options.overwrite,
            "output emitter"
        );
        Self {
            options,
            sink: Mutex::new(None),
        }
    }

    fn emit(&self, begin: &str, payload: &str, end: &str) -> Result<(), OutputError> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match sink.as_mut() {
            Some(sink) => {
                sink.write_record(begin, payload, end)?;
                Ok(())
            }
            // Emitting on a closed sink means shutdown raced an in-flight
            // record; drop it silently.
            None => Ok(()),
        }
    }

    /// Fold CRLF to LF; serde escaping handles quotes and newlines.
    fn idl_payload(tc: &TypeCode) -> String {
        to_idl(tc).replace("\r\n", "\n")
    }
}

impl OutputEmitter for JsonOutput {
    fn open(&self) -> Result<(), OutputError> {
        let sink = match &self.options.output_file {
            None => {
                debug!("no output file specified, using standard stream");
                if self.options.swap_outputs {
                    Sink::Stderr
                } else {
                    Sink::Stdout
                }
            }
            Some(path) => {
                if path.exists() && !self.options.overwrite && !self.options.append {
                    return Err(OutputError::AlreadyExists(path.clone()));
                }
                info!(
                    "opening output: {}{}",
                    path.display(),
                    if self.options.append { " (append)" } else { "" }
                );
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(self.options.append)
                    .truncate(!self.options.append)
                    .open(path)?;
                Sink::File(BufWriter::new(file))
            }
        };
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        Ok(())
    }

    fn close(&self) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = &self.options.output_file {
            info!("closing output: {}", path.display());
        }
        if let Some(Sink::File(mut file)) = sink.take() {
            let _ = file.flush();
        }
    }

    fn emit_type(&self, tc: &TypeCode) -> Result<(), OutputError> {
        let fqname = tc.name().unwrap_or_default();
        let payload = serde_json::to_string(&TypeRecord {
            fqname,
            idl: Self::idl_payload(tc),
        })?;
        self.emit(BEGIN_TYPE, &payload, END_TYPE)
    }

    fn emit_topic(&self, topic_name: &str, tc: &TypeCode) -> Result<(), OutputError> {
        let type_name = tc.name().unwrap_or_default();
        let payload = serde_json::to_string(&TopicRecord {
            name: topic_name,
            type_name,
            idl: Self::idl_payload(tc),
        })?;
        self.emit(BEGIN_TOPIC, &payload, END_TOPIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typecode::{Bound, Member, TypeCode};

    fn sample_type() -> std::sync::Arc<TypeCode> {
        TypeCode::structure(
            "std_msgs::msg::String",
            vec![Member::new("data", TypeCode::string(Bound::Unbounded))],
        )
    }

    fn read_back(output: &JsonOutput, path: &std::path::Path) -> String {
        output.close();
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn type_records_are_framed_single_line_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.txt");
        let output = JsonOutput::new(OutputOptions {
            output_file: Some(path.clone()),
            ..Default::default()
        });
        output.open().unwrap();
        output.emit_type(&sample_type()).unwrap();

        let written = read_back(&output, &path);
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], ">>> type");
        assert_eq!(lines[2], "<<< type");

        let payload: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(payload["fqname"], "std_msgs::msg::String");
        let idl = payload["idl"].as_str().unwrap();
        assert!(idl.contains("struct std_msgs::msg::String"));
        assert!(idl.contains("string data;"));
    }

    #[test]
    fn topic_records_carry_binding_and_idl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.txt");
        let output = JsonOutput::new(OutputOptions {
            output_file: Some(path.clone()),
            ..Default::default()
        });
        output.open().unwrap();
        output.emit_topic("/chatter", &sample_type()).unwrap();

        let written = read_back(&output, &path);
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines[0], ">>> topic");
        assert_eq!(lines[2], "<<< topic");
        let payload: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(payload["name"], "/chatter");
        assert_eq!(payload["type_name"], "std_msgs::msg::String");
    }

    #[test]
    fn refuses_existing_file_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, "previous").unwrap();

        let output = JsonOutput::new(OutputOptions {
            output_file: Some(path.clone()),
            ..Default::default()
        });
        assert!(matches!(
            output.open(),
            Err(OutputError::AlreadyExists(_))
        ));

        let output = JsonOutput::new(OutputOptions {
            output_file: Some(path.clone()),
            overwrite: true,
            ..Default::default()
        });
        output.open().unwrap();
        output.emit_type(&sample_type()).unwrap();
        let written = read_back(&output, &path);
        assert!(!written.contains("previous"));
    }

    #[test]
    fn append_preserves_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.txt");
        std::fs::write(&path, ">>> type\nold\n<<< type\n").unwrap();

        let output = JsonOutput::new(OutputOptions {
            output_file: Some(path.clone()),
            append: true,
            ..Default::default()
        });
        output.open().unwrap();
        output.emit_type(&sample_type()).unwrap();
        let written = read_back(&output, &path);
        assert!(written.starts_with(">>> type\nold\n<<< type\n"));
        assert!(written.contains("std_msgs::msg::String"));
    }
}
