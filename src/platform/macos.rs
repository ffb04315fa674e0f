//! macOS permission probe built on stock command-line tools.
//!
//! All checks and prompts go through the command gateway:
//!
//! | capability         | check (no UI)                     | request (shows UI)                      |
//! |--------------------|-----------------------------------|-----------------------------------------|
//! | elevated execution | root, or `sudo -n true`           | `osascript ... with administrator privileges` |
//! | accessibility      | JXA `AXIsProcessTrusted()`        | JXA `AXIsProcessTrustedWithOptions`     |
//! | full disk access   | read one byte of the TCC database | open the Privacy & Security pane        |
//! | automation         | none                              | AppleScript `tell application`          |

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use super::command::CommandRunner;
use super::elevation::{is_elevated, is_user_cancelled, privileged_command};
use crate::core::permissions::{Capability, PermissionProbe, PermissionStatus};
use crate::error::{ExecutionError, PermissionError};

pub const PS: &str = "/bin/ps";
pub const VM_STAT: &str = "/usr/bin/vm_stat";
pub const SYSCTL: &str = "/usr/sbin/sysctl";
pub const KILL: &str = "/bin/kill";
pub const PURGE: &str = "/usr/sbin/purge";

const OSASCRIPT: &str = "/usr/bin/osascript";
const SUDO: &str = "/usr/bin/sudo";
const HEAD: &str = "/usr/bin/head";
const OPEN: &str = "/usr/bin/open";
const TCC_DATABASE: &str = "/Library/Application Support/com.apple.TCC/TCC.db";
const FULL_DISK_ACCESS_PANE: &str =
    "x-apple.systempreferences:com.apple.preference.security?Privacy_AllFiles";

const AX_CHECK: &str = "ObjC.import('ApplicationServices'); $.AXIsProcessTrusted()";
const AX_PROMPT: &str = "ObjC.import('ApplicationServices'); \
    $.AXIsProcessTrustedWithOptions($({AXTrustedCheckOptionPrompt: true}))";

/// AppleScript "not authorized to send Apple events"
const ERR_NOT_AUTHORIZED: &str = "(-1743)";

pub struct SystemPermissionProbe {
    runner: Arc<dyn CommandRunner>,
    check_timeout: Duration,
    prompt_timeout: Duration,
}

impl SystemPermissionProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, check_timeout: Duration, prompt_timeout: Duration) -> Self {
        Self {
            runner,
            check_timeout,
            prompt_timeout,
        }
    }

    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<String, ExecutionError> {
        self.runner
            .run(program, args, timeout)
            .await
            .map(|output| output.stdout)
    }

    async fn check_elevated(&self) -> Result<Option<PermissionStatus>, PermissionError> {
        if is_elevated() {
            return Ok(Some(PermissionStatus::Granted));
        }
        match self.run(SUDO, &args(&["-n", "true"]), self.check_timeout).await {
            Ok(_) => Ok(Some(PermissionStatus::Granted)),
            // No cached credentials says nothing about consent
            Err(ExecutionError::Failed { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn check_accessibility(&self) -> Result<Option<PermissionStatus>, PermissionError> {
        let stdout = self
            .run(OSASCRIPT, &args(&["-l", "JavaScript", "-e", AX_CHECK]), self.check_timeout)
            .await?;
        Ok(Some(trusted_status(&stdout)))
    }

    async fn check_full_disk_access(&self) -> Result<Option<PermissionStatus>, PermissionError> {
        match self.run(HEAD, &args(&["-c", "1", TCC_DATABASE]), self.check_timeout).await {
            Ok(stdout) if !stdout.is_empty() => Ok(Some(PermissionStatus::Granted)),
            Ok(_) | Err(ExecutionError::Failed { .. }) => Ok(Some(PermissionStatus::NotDetermined)),
            Err(e) => Err(e.into()),
        }
    }

    async fn request_elevated(&self) -> Result<PermissionStatus, PermissionError> {
        let (program, argv) = privileged_command("/usr/bin/true");
        match self.run(&program, &argv, self.prompt_timeout).await {
            Ok(_) => Ok(PermissionStatus::Granted),
            Err(ExecutionError::Failed { stderr, .. })
                if is_user_cancelled(&stderr) =>
            {
                Ok(PermissionStatus::Denied)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn request_accessibility(&self) -> Result<PermissionStatus, PermissionError> {
        let stdout = self
            .run(OSASCRIPT, &args(&["-l", "JavaScript", "-e", AX_PROMPT]), self.prompt_timeout)
            .await?;
        // `false` means the system dialog is up; the next check confirms
        Ok(match trusted_status(&stdout) {
            PermissionStatus::Granted => PermissionStatus::Granted,
            _ => PermissionStatus::NotDetermined,
        })
    }

    async fn request_full_disk_access(&self) -> Result<PermissionStatus, PermissionError> {
        match self.run(OPEN, &args(&[FULL_DISK_ACCESS_PANE]), self.check_timeout).await {
            Ok(_) => Ok(PermissionStatus::NotDetermined),
            Err(e) => Err(e.into()),
        }
    }

    async fn request_automation(&self, target: &str) -> Result<PermissionStatus, PermissionError> {
        let script = format!(
            "if application \"{0}\" is running then tell application \"{0}\" to get name",
            target
        );
        match self.run(OSASCRIPT, &args(&["-e", script.as_str()]), self.prompt_timeout).await {
            Ok(stdout) if !stdout.trim().is_empty() => Ok(PermissionStatus::Granted),
            Ok(_) => Ok(PermissionStatus::NotDetermined),
            Err(ExecutionError::Failed { stderr, .. })
                if stderr.contains(ERR_NOT_AUTHORIZED)
                    || is_user_cancelled(&stderr) =>
            {
                Ok(PermissionStatus::Denied)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl PermissionProbe for SystemPermissionProbe {
    fn check<'a>(
        &'a self,
        capability: &'a Capability,
    ) -> BoxFuture<'a, Result<Option<PermissionStatus>, PermissionError>> {
        Box::pin(async move {
            match capability {
                Capability::ElevatedExecution => self.check_elevated().await,
                Capability::Accessibility => self.check_accessibility().await,
                Capability::FullDiskAccess => self.check_full_disk_access().await,
                Capability::Automation(_) => Ok(None),
            }
        })
    }

    fn request<'a>(
        &'a self,
        capability: &'a Capability,
    ) -> BoxFuture<'a, Result<PermissionStatus, PermissionError>> {
        Box::pin(async move {
            capability.validate()?;
            match capability {
                Capability::ElevatedExecution => self.request_elevated().await,
                Capability::Accessibility => self.request_accessibility().await,
                Capability::FullDiskAccess => self.request_full_disk_access().await,
                Capability::Automation(target) => self.request_automation(target).await,
            }
        })
    }
}

fn trusted_status(stdout: &str) -> PermissionStatus {
    if stdout.trim() == "true" {
        PermissionStatus::Granted
    } else {
        PermissionStatus::NotDetermined
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
