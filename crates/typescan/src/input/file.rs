// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Line-oriented file input.
//!
//! One record per line, split on the first `@`: `<type>@<topic>`. A line
//! without `@` is a type-only record; blank lines are skipped. The path `-`
//! denotes standard input, which is always consumed last.

use super::{InputEmitter, InputError, InputQueue, NoInput, Record};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// File input configuration.
#[derive(Debug, Clone, Default)]
pub struct FileInputOptions {
    /// Input files in consumption order; `-` is standard input.
    pub input_files: Vec<String>,
}

/// Input emitter reading records from files and standard input on a
/// dedicated reader thread.
pub struct FileInput {
    options: FileInputOptions,
    queue: Arc<InputQueue>,
    reader: Mutex<Option<JoinHandle<()>>>,
    keep_alive: bool,
}

impl FileInput {
    pub fn new(options: FileInputOptions) -> Self {
        Self::with_keep_alive(options, false)
    }

    /// `keep_alive` leaves the stream open after all files are drained;
    /// used when discovery producers share the queue.
    pub(crate) fn with_keep_alive(options: FileInputOptions, keep_alive: bool) -> Self {
        info!(input_files = options.input_files.len(), "file input");
        for input_file in &options.input_files {
            info!(
                "input file: {}",
                if input_file == "-" {
                    "stdin"
                } else {
                    input_file.as_str()
                }
            );
        }
        Self {
            options,
            queue: InputQueue::new(),
            reader: Mutex::new(None),
            keep_alive,
        }
    }

    pub(crate) fn queue(&self) -> &Arc<InputQueue> {
        &self.queue
    }

    fn parse_line(line: &str) -> Record {
        let (type_name, topic_name) = match line.split_once('@') {
            Some((type_name, topic_name)) => (type_name, topic_name),
            None => (line, ""),
        };
        Record {
            topic_name: topic_name.to_string(),
            type_name: type_name.to_string(),
            typecode: None,
        }
    }

    fn reader_thread(
        queue: Arc<InputQueue>,
        streams: Vec<(String, Box<dyn BufRead + Send>)>,
        keep_alive: bool,
    ) {
        for (name, stream) in streams {
            if !queue.is_active() {
                break;
            }
            debug!(input = %name, "consuming input");
            for line in stream.lines() {
                if !queue.is_active() {
                    break;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(input = %name, %err, "read failed");
                        break;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                queue.push(Self::parse_line(&line));
            }
            debug!(input = %name, "consumed input");
        }
        debug!("reader thread complete");
        queue.set_reader_active(keep_alive);
    }
}

impl InputEmitter for FileInput {
    fn open(&self) -> Result<(), InputError> {
        let mut streams: Vec<(String, Box<dyn BufRead + Send>)> = Vec::new();
        let mut read_stdin = false;
        for input_file in &self.options.input_files {
            if input_file == "-" {
                read_stdin = true;
                continue;
            }
            let file = File::open(input_file)?;
            streams.push((input_file.clone(), Box::new(BufReader::new(file))));
        }
        // Standard input goes last so regular files are consumed first.
        if read_stdin {
            streams.push(("stdin".to_string(), Box::new(BufReader::new(io::stdin()))));
        }
        if streams.is_empty() {
            self.queue.set_reader_active(self.keep_alive);
            return Ok(());
        }

        self.queue.set_reader_active(true);
        let queue = Arc::clone(&self.queue);
        let keep_alive = self.keep_alive;
        let handle = std::thread::Builder::new()
            .name("typescan-input".to_string())
            .spawn(move || Self::reader_thread(queue, streams, keep_alive))?;
        *self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn close(&self) {
        self.queue.shutdown();
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn is_active(&self) -> bool {
        self.queue.is_active()
    }

    fn next(&self) -> Result<Record, NoInput> {
        self.queue.next(None)
    }

    fn next_timeout(&self, timeout: Duration) -> Result<Record, NoInput> {
        self.queue.next(Some(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_type_and_topic_records() {
        let record = FileInput::parse_line("std_msgs/msg/String@/chatter");
        assert_eq!(record.type_name, "std_msgs/msg/String");
        assert_eq!(record.topic_name, "/chatter");

        let record = FileInput::parse_line("std_msgs/msg/String");
        assert_eq!(record.type_name, "std_msgs/msg/String");
        assert!(record.topic_name.is_empty());

        // Only the first @ splits; topic names may contain @.
        let record = FileInput::parse_line("t@a@b");
        assert_eq!(record.type_name, "t");
        assert_eq!(record.topic_name, "a@b");
    }

    #[test]
    fn reads_records_in_file_order() {
        let file = write_temp("a/msg/A\n\nb/msg/B@/topic\nc/msg/C\n");
        let input = FileInput::new(FileInputOptions {
            input_files: vec![file.path().to_string_lossy().to_string()],
        });
        input.open().unwrap();

        let mut records = Vec::new();
        while let Ok(record) = input.next() {
            records.push(record);
        }
        let types: Vec<_> = records.iter().map(|r| r.type_name.as_str()).collect();
        assert_eq!(types, vec!["a/msg/A", "b/msg/B", "c/msg/C"]);
        assert_eq!(records[1].topic_name, "/topic");
        input.close();
    }

    #[test]
    fn consumes_files_in_argument_order() {
        let first = write_temp("a/msg/A\n");
        let second = write_temp("b/msg/B\n");
        let input = FileInput::new(FileInputOptions {
            input_files: vec![
                first.path().to_string_lossy().to_string(),
                second.path().to_string_lossy().to_string(),
            ],
        });
        input.open().unwrap();
        assert_eq!(input.next().unwrap().type_name, "a/msg/A");
        assert_eq!(input.next().unwrap().type_name, "b/msg/B");
        assert_eq!(input.next(), Err(NoInput));
        input.close();
    }

    #[test]
    fn missing_file_fails_open() {
        let input = FileInput::new(FileInputOptions {
            input_files: vec!["/nonexistent/typescan/input".to_string()],
        });
        assert!(matches!(input.open(), Err(InputError::Io(_))));
    }

    #[test]
    fn no_files_means_immediate_exhaustion() {
        let input = FileInput::new(FileInputOptions::default());
        input.open().unwrap();
        assert_eq!(input.next(), Err(NoInput));
    }
}
