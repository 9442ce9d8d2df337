use chrono::Local;
use log::{set_boxed_logger, set_max_level, Level, Log, SetLoggerError};
use std::io::{stdout, BufWriter, Write};
use std::sync::mpsc;
use std::thread;

const DEFAULT_BUFFER_SIZE: usize = 1024;

enum LogCommand {
    Record(String),
    Flush,
}

/// A `log::Log` implementation that hands formatting off to a single
/// background thread, so call sites never block on stdout contention.
pub struct NetwatchLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl NetwatchLogger {
    fn new(max_level: Level, buffer_size: usize) -> (Self, mpsc::Receiver<LogCommand>) {
        let (sender, receiver) = mpsc::sync_channel(buffer_size);
        (NetwatchLogger { max_level, sender }, receiver)
    }

    /// Installs the logger as the global `log` backend with the given buffer size.
    pub fn init_with_buffer(max_level: Level, buffer_size: usize) -> Result<(), SetLoggerError> {
        let (logger, receiver) = NetwatchLogger::new(max_level, buffer_size);

        thread::Builder::new()
            .name("netwatch-log-writer".into())
            .spawn(move || {
                let mut writer = BufWriter::new(stdout());
                while let Ok(command) = receiver.recv() {
                    match command {
                        LogCommand::Record(message) => {
                            if let Err(e) = writer.write_all(message.as_bytes()) {
                                eprintln!("[netwatch-log] failed to write log record: {e}");
                            }
                        }
                        LogCommand::Flush => {
                            if let Err(e) = writer.flush() {
                                eprintln!("[netwatch-log] failed to flush log: {e}");
                            }
                        }
                    }
                }
                let _ = writer.flush();
            })
            .expect("failed to spawn log writer thread");

        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }

    /// Installs the logger with the default channel capacity.
    pub fn init(max_level: Level) -> Result<(), SetLoggerError> {
        Self::init_with_buffer(max_level, DEFAULT_BUFFER_SIZE)
    }
}

impl Log for NetwatchLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now();
        let message = format!(
            "{} {} [{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );

        if let Err(e) = self.sender.try_send(LogCommand::Record(message)) {
            eprintln!("[netwatch-log] dropped log record: {e}");
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
