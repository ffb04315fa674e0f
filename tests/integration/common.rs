// Scripted stand-ins for the OS seams

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use resmon::core::permissions::{MemoryPermissionStore, PermissionProbe};
use resmon::platform::command::{CommandOutput, CommandRunner};
use resmon::{Capability, ExecutionError, MonitorDeps, PermissionError, PermissionStatus};

pub const PS_SAMPLE: &str = "  PID  RSS COMM\n  100 2048 Safari\n  100 1024 Safari\n  200   50 Finder\n";

pub const EXTENDED_PS_SAMPLE: &str = "  PID  PPID    RSS  %CPU USER  COMM\n\
    1     0  20480   0.1 root  /sbin/launchd\n\
  300     1 512000  12.5 alice /Applications/Safari.app/Contents/MacOS/Safari\n\
  400     1 102400  40.0 alice /usr/bin/some tool\n\
  500     1   1024   0.0 alice /usr/libexec/tiny\n";

pub const VM_STAT_SAMPLE: &str = "Mach Virtual Memory Statistics: (page size of 4096 bytes)\n\
Pages free:                               1000.\n\
Pages active:                             2000.\n\
Pages inactive:                            500.\n\
Pages wired down:                          300.\n\
Pages occupied by compressor:              200.\n";

pub const PHYSICAL_BYTES: u64 = 4096 * 4000;

#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    Failed { code: i32, stderr: String },
    TimedOut,
}

/// Runner that answers from a table instead of spawning anything.
///
/// A reply matches when its key equals the program or appears inside one
/// of the arguments, so privileged commands wrapped in a shell or an
/// AppleScript are matched by the inner tool path. Queued replies are
/// handed out in order and the last one repeats.
#[derive(Default)]
pub struct FakeRunner {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(self, key: &str, reply: Reply) -> Self {
        self.set_reply(key, reply);
        self
    }

    pub fn set_reply(&self, key: &str, reply: Reply) {
        self.replies
            .lock()
            .insert(key.to_string(), VecDeque::from(vec![reply]));
    }

    pub fn then_reply(self, key: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_matching(&self, key: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(program, args)| matches_key(key, program, args))
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lookup(&self, program: &str, args: &[String]) -> Reply {
        let mut replies = self.replies.lock();
        let queue = replies
            .iter_mut()
            .find(|(key, _)| matches_key(key, program, args))
            .map(|(_, queue)| queue);
        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Stdout(String::new())),
            None => Reply::Stdout(String::new()),
        }
    }
}

fn matches_key(key: &str, program: &str, args: &[String]) -> bool {
    program == key || args.iter().any(|arg| arg.contains(key))
}

impl CommandRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecutionError>> {
        Box::pin(async move {
            self.calls.lock().push((program.to_string(), args.to_vec()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.lookup(program, args) {
                Reply::Stdout(stdout) => Ok(CommandOutput {
                    stdout,
                    stderr: String::new(),
                    exit_code: Some(0),
                }),
                Reply::Failed { code, stderr } => Err(ExecutionError::Failed {
                    program: program.to_string(),
                    code: Some(code),
                    stderr,
                }),
                Reply::TimedOut => Err(ExecutionError::TimedOut {
                    program: program.to_string(),
                    timeout,
                }),
            }
        })
    }
}

/// Probe with fixed answers
pub struct FakeProbe {
    pub check: Mutex<Option<PermissionStatus>>,
    pub answer: Mutex<PermissionStatus>,
    pub requests: AtomicUsize,
}

impl FakeProbe {
    pub fn new(check: Option<PermissionStatus>, answer: PermissionStatus) -> Self {
        Self {
            check: Mutex::new(check),
            answer: Mutex::new(answer),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PermissionProbe for FakeProbe {
    fn check<'a>(
        &'a self,
        _capability: &'a Capability,
    ) -> BoxFuture<'a, Result<Option<PermissionStatus>, PermissionError>> {
        let status = *self.check.lock();
        Box::pin(async move { Ok(status) })
    }

    fn request<'a>(
        &'a self,
        _capability: &'a Capability,
    ) -> BoxFuture<'a, Result<PermissionStatus, PermissionError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock();
        Box::pin(async move { Ok(answer) })
    }
}

pub fn fake_deps(runner: Arc<FakeRunner>, probe: Arc<FakeProbe>) -> MonitorDeps {
    MonitorDeps {
        runner,
        probe,
        store: Arc::new(MemoryPermissionStore::new()),
    }
}
