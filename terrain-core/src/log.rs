// Copyright (c) 2019-present Dmitry Stepanov and Fyrox Engine contributors.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Simple process-wide logger. By default, it writes in the console only. To enable logging into
//! a file, call [`Log::set_file_name`] once at startup.
//!
//! Tools embedding the terrain store can subscribe to every message with [`Log::add_listener`],
//! which is also how tests observe data-loss warnings.

use crate::{instant::Instant, parking_lot::Mutex};
use std::{
    fmt::Debug,
    io::{self, Write},
    path::Path,
    sync::{mpsc::Sender, LazyLock},
    time::Duration,
};

/// A message that could be sent by the logger to all listeners.
#[derive(Debug, Clone)]
pub struct LogMessage {
    /// Kind of the message: information, warning or error.
    pub kind: MessageKind,
    /// The source message without logger prefixes.
    pub content: String,
    /// Time point at which the message was recorded, relative to logger initialization.
    pub time: Duration,
}

static LOG: LazyLock<Mutex<Log>> = LazyLock::new(|| {
    Mutex::new(Log {
        file: None,
        listeners: Default::default(),
        time_origin: Instant::now(),
    })
});

/// A kind of message.
#[derive(Debug, Default, Copy, Clone, PartialOrd, PartialEq, Eq, Ord, Hash)]
#[repr(u32)]
pub enum MessageKind {
    #[default]
    Information = 0,
    Warning = 1,
    Error = 2,
}

impl MessageKind {
    fn as_str(self) -> &'static str {
        match self {
            MessageKind::Information => "[INFO]: ",
            MessageKind::Warning => "[WARNING]: ",
            MessageKind::Error => "[ERROR]: ",
        }
    }
}

/// See module docs.
pub struct Log {
    file: Option<std::fs::File>,
    listeners: Vec<Sender<LogMessage>>,
    time_origin: Instant,
}

impl Log {
    /// Creates a new log file at the specified path. Messages are mirrored into it from now on.
    pub fn set_file_name<P: AsRef<Path>>(path: P) {
        LOG.lock().file = std::fs::File::create(path).ok();
    }

    fn writeln_internal(&mut self, kind: MessageKind, content: &str) {
        let time = self.time_origin.elapsed();
        // Disconnected listeners are dropped.
        self.listeners.retain(|listener| {
            listener
                .send(LogMessage {
                    kind,
                    content: content.to_owned(),
                    time,
                })
                .is_ok()
        });

        let line = format!("{}{content}\n", kind.as_str());

        let _ = io::stdout().write_all(line.as_bytes());

        if let Some(log_file) = self.file.as_mut() {
            let _ = log_file.write_all(line.as_bytes());
            let _ = log_file.flush();
        }
    }

    /// Writes a line to the console, the listeners and the file (if set).
    pub fn writeln<S>(kind: MessageKind, msg: S)
    where
        S: AsRef<str>,
    {
        LOG.lock().writeln_internal(kind, msg.as_ref().trim_end());
    }

    pub fn info<S>(msg: S)
    where
        S: AsRef<str>,
    {
        Self::writeln(MessageKind::Information, msg)
    }

    pub fn warn<S>(msg: S)
    where
        S: AsRef<str>,
    {
        Self::writeln(MessageKind::Warning, msg)
    }

    pub fn err<S>(msg: S)
    where
        S: AsRef<str>,
    {
        Self::writeln(MessageKind::Error, msg)
    }

    /// Adds a listener that will receive a copy of every message passed into the log.
    pub fn add_listener(listener: Sender<LogMessage>) {
        LOG.lock().listeners.push(listener)
    }

    /// Logs the error of a result that can be safely ignored otherwise.
    pub fn verify<T, E>(result: Result<T, E>)
    where
        E: Debug,
    {
        if let Err(e) = result {
            Self::err(format!("Operation failed! Reason: {e:?}"));
        }
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log::Log::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log::Log::warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        $crate::log::Log::err(format!($($arg)*))
    };
}
