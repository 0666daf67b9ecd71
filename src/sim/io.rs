//! IO handling for the simulated program.
//!
//! The built-in I/O functions (`printf`, `scanf`, and friends) ultimately
//! talk to a console, whose interface is the [`Console`] trait.
//! This is exposed to the simulator with the [`SimConsole`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`StdConsole`]: a `Console` over the process's stdin/stdout (the default).
//! - [`EmptyIO`]: a `Console` holding the implementation for a lack of IO support.
//! - [`BufferedIO`]: a `Console` holding a buffered implementation for IO.
//! - [`BiChannelIO`]: a `Console` holding a threaded/channel implementation for IO.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel as cbc;

/// The console a simulated program's I/O is attached to.
///
/// Output is delivered as complete text runs (not necessarily lines);
/// input is requested one line at a time, without its trailing newline.
pub trait Console {
    /// Delivers program output.
    fn output(&mut self, text: &str);

    /// Retrieves one line of input, without its trailing newline.
    ///
    /// Blocks until a line is available, and returns `None` at end of input.
    fn input(&mut self) -> Option<String>;
}
impl dyn Console {} // assert Console is dyn safe

/// No IO. Output is discarded and input is always at its end.
pub struct EmptyIO;
impl Console for EmptyIO {
    fn output(&mut self, _text: &str) {}

    fn input(&mut self) -> Option<String> {
        None
    }
}

/// IO over the process's own stdin and stdout.
pub struct StdConsole;
impl Console for StdConsole {
    fn output(&mut self, text: &str) {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn input(&mut self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(line)
            }
        }
    }
}

/// IO that reads lines from an input buffer and collects output in an
/// output buffer.
///
/// This is cloneable; clones share their buffers, so a test or frontend
/// can keep one clone to feed input and inspect output while the
/// simulator owns the other.
#[derive(Debug, Clone, Default)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<String>>>,
    output: Arc<RwLock<String>>,
}
impl BufferedIO {
    /// Creates a new BufferedIO.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a line of input (without a trailing newline).
    pub fn push_input(&self, line: impl Into<String>) {
        self.input.write().unwrap_or_else(|e| e.into_inner())
            .push_back(line.into());
    }

    /// Everything the program has output so far.
    pub fn output_string(&self) -> String {
        self.output.read().unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<String>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<String>> {
        &self.output
    }
}
impl Console for BufferedIO {
    fn output(&mut self, text: &str) {
        self.output.write().unwrap_or_else(|e| e.into_inner())
            .push_str(text);
    }

    fn input(&mut self) -> Option<String> {
        self.input.write().unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

/// A helper struct for [`BiChannelIO::new`],
/// indicating the channel is closed and no more reads/writes will come from it.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stop;

/// IO that reads lines from one channel and writes output to another.
///
/// The reader function runs on its own thread and is called every time
/// the channel has room for another line; it should block until a line
/// is ready, or return [`Stop`] when there are no more lines.
/// The writer function likewise runs on its own thread and is called
/// for every run of output.
///
/// An input request blocks on the reader channel, which is what lets a
/// simulated `scanf` wait for an asynchronous input source.
pub struct BiChannelIO {
    read_data: cbc::Receiver<String>,
    #[allow(unused)]
    read_handler: JoinHandle<()>,

    write_data: cbc::Sender<String>,
    #[allow(unused)]
    write_handler: JoinHandle<()>,
}
impl BiChannelIO {
    /// Creates a new bi-channel IO device with the given reader and writer.
    ///
    /// Note that the reader thread polls for input even while the
    /// simulator is not awaiting any, so care should be taken not to
    /// send lines through it outside a run.
    pub fn new(
        mut reader: impl FnMut() -> Result<String, Stop> + Send + 'static,
        mut writer: impl FnMut(&str) -> Result<(), Stop> + Send + 'static,
    ) -> Self {
        let (read_tx, read_rx) = cbc::bounded(1);
        let (write_tx, write_rx) = cbc::bounded::<String>(1);

        // Reader thread:
        let read_handler = std::thread::spawn(move || loop {
            let Ok(line) = reader() else { return };
            let Ok(()) = read_tx.send(line) else { return };
        });

        // Writer thread:
        let write_handler = std::thread::spawn(move || {
            for text in write_rx {
                let Ok(()) = writer(&text) else { return };
            }
        });

        Self {
            read_data: read_rx,
            read_handler,
            write_data: write_tx,
            write_handler,
        }
    }
}
impl Console for BiChannelIO {
    fn output(&mut self, text: &str) {
        // if the writer thread is gone, output is dropped
        let _ = self.write_data.send(text.to_string());
    }

    fn input(&mut self) -> Option<String> {
        self.read_data.recv().ok()
    }
}

/// All the variants of IO accepted by the simulator.
#[derive(Default)]
pub enum SimConsole {
    /// The process's stdin/stdout. See [`StdConsole`].
    #[default]
    Std,
    /// No IO. This corresponds to the implementation of [`EmptyIO`].
    Empty,
    /// A buffered implementation. See [`BufferedIO`].
    Buffered(BufferedIO),
    /// A bi-channel IO implementation. See [`BiChannelIO`].
    BiChannel(BiChannelIO),
    /// A custom IO implementation.
    Custom(Box<dyn Console + Send>),
}
impl std::fmt::Debug for SimConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimConsole")
            .finish_non_exhaustive()
    }
}
impl From<StdConsole> for SimConsole {
    fn from(_value: StdConsole) -> Self {
        SimConsole::Std
    }
}
impl From<EmptyIO> for SimConsole {
    fn from(_value: EmptyIO) -> Self {
        SimConsole::Empty
    }
}
impl From<BufferedIO> for SimConsole {
    fn from(value: BufferedIO) -> Self {
        SimConsole::Buffered(value)
    }
}
impl From<BiChannelIO> for SimConsole {
    fn from(value: BiChannelIO) -> Self {
        SimConsole::BiChannel(value)
    }
}
impl From<Box<dyn Console + Send>> for SimConsole {
    fn from(value: Box<dyn Console + Send>) -> Self {
        SimConsole::Custom(value)
    }
}
impl Console for SimConsole {
    fn output(&mut self, text: &str) {
        match self {
            SimConsole::Std => StdConsole.output(text),
            SimConsole::Empty => EmptyIO.output(text),
            SimConsole::Buffered(io) => io.output(text),
            SimConsole::BiChannel(io) => io.output(text),
            SimConsole::Custom(io) => io.output(text),
        }
    }

    fn input(&mut self) -> Option<String> {
        match self {
            SimConsole::Std => StdConsole.input(),
            SimConsole::Empty => EmptyIO.input(),
            SimConsole::Buffered(io) => io.input(),
            SimConsole::BiChannel(io) => io.input(),
            SimConsole::Custom(io) => io.input(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_io() {
        let io = BufferedIO::new();
        let mut sim_side = io.clone();

        io.push_input("first");
        io.push_input("second");
        assert_eq!(sim_side.input(), Some("first".to_string()));
        assert_eq!(sim_side.input(), Some("second".to_string()));
        assert_eq!(sim_side.input(), None);

        sim_side.output("Hello, ");
        sim_side.output("world\n");
        assert_eq!(io.output_string(), "Hello, world\n");
    }

    #[test]
    fn test_empty_io() {
        let mut io = EmptyIO;
        io.output("dropped");
        assert_eq!(io.input(), None);
    }

    #[test]
    fn test_bichannel_io() {
        let (out_tx, out_rx) = cbc::unbounded();
        let mut lines = VecDeque::from(["one".to_string(), "two".to_string()]);

        let mut io = BiChannelIO::new(
            move || lines.pop_front().ok_or(Stop),
            move |text| out_tx.send(text.to_string()).map_err(|_| Stop),
        );

        assert_eq!(io.input(), Some("one".to_string()));
        assert_eq!(io.input(), Some("two".to_string()));
        assert_eq!(io.input(), None);

        io.output("ping");
        assert_eq!(out_rx.recv().unwrap(), "ping");
    }
}
