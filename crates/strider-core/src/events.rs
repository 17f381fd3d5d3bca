//! Session event types and helpers.
//!
//! Observers (front ends, loggers, test harnesses) consume these events to
//! follow the target without polling the session. The session publishes an
//! event whenever it resumes the target, the target stops, a tracepoint
//! reports, the process exits, or the session restarts it.

use std::sync::mpsc;

use crate::breakpoints::BreakpointId;
use crate::types::{Address, ProcessId, ThreadId};

/// Event emitted by a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent
{
    /// The target was resumed (continue or step).
    Resumed
    {
        pid: ProcessId,
    },
    /// The target stopped and is waiting for commands.
    Stopped
    {
        pid: ProcessId,
        /// Thread responsible for the stop (if known).
        thread: Option<ThreadId>,
        /// Where it stopped.
        pc: Option<Address>,
        /// Breakpoint that caused the stop, if any.
        breakpoint: Option<BreakpointId>,
    },
    /// A tracepoint reported and the target kept running.
    Tracepoint
    {
        pid: ProcessId,
        thread: ThreadId,
        breakpoint: BreakpointId,
    },
    /// The process exited, was killed, or was detached.
    Exited
    {
        pid: ProcessId,
        /// Exit status, when there is one.
        status: Option<i32>,
    },
    /// The session replaced the process with a fresh one.
    Restarted
    {
        /// Pid of the new process.
        pid: ProcessId,
        /// Breakpoints that no longer resolved and were dropped.
        dropped: Vec<BreakpointId>,
    },
}

impl SessionEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::Resumed { pid } => format!("process {pid} resumed"),
            Self::Stopped {
                pid,
                thread,
                pc,
                breakpoint,
            } => {
                let mut description = format!("process {pid} stopped");
                if let Some(pc) = pc {
                    description.push_str(&format!(" at {pc}"));
                }
                if let Some(thread) = thread {
                    description.push_str(&format!(" (thread {})", thread.raw()));
                }
                if let Some(id) = breakpoint {
                    description.push_str(&format!(" on breakpoint {id}"));
                }
                description
            }
            Self::Tracepoint {
                pid,
                thread,
                breakpoint,
            } => format!("process {pid} passed tracepoint {breakpoint} (thread {})", thread.raw()),
            Self::Exited { pid, status: Some(status) } => format!("process {pid} exited with status {status}"),
            Self::Exited { pid, status: None } => format!("process {pid} is gone"),
            Self::Restarted { pid, dropped } if dropped.is_empty() => format!("restarted as process {pid}"),
            Self::Restarted { pid, dropped } => {
                format!("restarted as process {pid}, dropped {} breakpoint(s)", dropped.len())
            }
        }
    }
}

/// Sender side of the session event channel.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;
/// Receiver side of the session event channel.
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Create a new session event channel.
#[must_use]
pub fn event_channel() -> (SessionEventSender, SessionEventReceiver)
{
    mpsc::channel()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_describe_stopped()
    {
        let event = SessionEvent::Stopped {
            pid: ProcessId(7),
            thread: Some(ThreadId(1)),
            pc: Some(Address::from(0x401000)),
            breakpoint: Some(BreakpointId::from_raw(2)),
        };
        assert_eq!(event.describe(), "process 7 stopped at 0x401000 (thread 1) on breakpoint 2");
    }

    #[test]
    fn test_describe_exit()
    {
        let event = SessionEvent::Exited {
            pid: ProcessId(7),
            status: Some(0),
        };
        assert_eq!(event.describe(), "process 7 exited with status 0");
    }
}
