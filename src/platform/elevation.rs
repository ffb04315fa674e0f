/// Whether this process already runs with root privileges.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

/// Build the command line that runs `shell_command` with administrator
/// rights.
///
/// As root the command runs directly through `/bin/sh`. Otherwise it goes
/// through `osascript`, which shows the system password dialog; the user
/// cancelling it surfaces as AppleScript error -128.
pub fn privileged_command(shell_command: &str) -> (String, Vec<String>) {
    if is_elevated() {
        (
            "/bin/sh".to_string(),
            vec!["-c".to_string(), shell_command.to_string()],
        )
    } else {
        (
            "/usr/bin/osascript".to_string(),
            vec![
                "-e".to_string(),
                format!(
                    "do shell script \"{}\" with administrator privileges",
                    escape_applescript(shell_command)
                ),
            ],
        )
    }
}

/// Whether command stderr reports the user dismissing a consent dialog.
pub fn is_user_cancelled(stderr: &str) -> bool {
    stderr.contains("(-128)") || stderr.contains("User canceled")
}

fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
