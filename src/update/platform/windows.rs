//! Windows swap script (batch file run through `cmd`).

use super::{Platform, SelfReplace, SwapPlan};
use std::fmt::Write as _;
use std::io;
use std::path::Path;
#[cfg(windows)]
use std::process::{Command, Stdio};

/// Batch-file strategy for Windows.
#[derive(Debug, Clone, Copy)]
pub struct WindowsReplace;

/// Backslash-separated, double-quoted path for `cmd`.
fn bat_quote(path: &Path) -> String {
    format!("\"{}\"", path.to_string_lossy().replace('/', "\\"))
}

impl SelfReplace for WindowsReplace {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn script_file_name(&self) -> &'static str {
        "update_integra.bat"
    }

    fn relaunch_command(&self, target: &Path) -> String {
        format!("start \"\" {}", bat_quote(target))
    }

    fn render_script(&self, plan: &SwapPlan) -> String {
        let new = bat_quote(&plan.new_binary);
        let target = bat_quote(&plan.target);
        let backup = bat_quote(&plan.backup);

        let mut s = String::new();
        let _ = writeln!(s, "@echo off");
        let _ = writeln!(s, "title Integra Update");
        let _ = writeln!(s, "echo Updating Integra Client Manager...");
        if let Some(dir) = plan.target.parent() {
            let _ = writeln!(s, "cd /d {}", bat_quote(dir));
        }
        let _ = writeln!(s);
        let _ = writeln!(s, "echo Waiting for application to close...");
        let _ = writeln!(s, "timeout /t {} /nobreak > nul", plan.grace.as_secs());
        let _ = writeln!(s);
        let _ = writeln!(s, "set /a attempt=0");
        let _ = writeln!(s, ":retry");
        let _ = writeln!(s, "set /a attempt+=1");
        let _ = writeln!(s, "echo Attempting to update executable (attempt %attempt%)...");
        let _ = writeln!(s, "copy /y {new} {target} >nul 2>&1");
        let _ = writeln!(s, "if not errorlevel 1 goto verify");
        let _ = writeln!(s, "if %attempt% geq {} goto restore", plan.attempts);
        let _ = writeln!(
            s,
            "timeout /t {} /nobreak > nul",
            plan.retry_delay.as_secs()
        );
        let _ = writeln!(s, "goto retry");
        let _ = writeln!(s);
        let _ = writeln!(s, ":verify");
        let _ = writeln!(s, "if not exist {target} goto restore");
        let _ = writeln!(s, "if exist {backup} del {backup} >nul 2>&1");
        let _ = writeln!(s, "echo Update completed! Restarting application...");
        let _ = writeln!(s, "{}", self.relaunch_command(&plan.target));
        let _ = writeln!(s, "del \"%~f0\" >nul 2>&1 & exit /b 0");
        let _ = writeln!(s);
        let _ = writeln!(s, ":restore");
        let _ = writeln!(s, "echo Update failed, restoring backup...");
        let _ = writeln!(s, "copy /y {backup} {target} >nul 2>&1");
        let _ = writeln!(s, "exit /b 1");
        s.replace('\n', "\r\n")
    }

    fn launch_detached(&self, script: &Path) -> io::Result<()> {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

            // `start` takes the first quoted argument as the window title, so
            // the command line is passed verbatim instead of re-quoted.
            let child = Command::new("cmd")
                .raw_arg(format!("/C start \"\" /min {}", bat_quote(script)))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
                .spawn()?;
            tracing::info!(pid = child.id(), script = %script.display(), "swap script launched");
            Ok(())
        }

        #[cfg(not(windows))]
        {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot run batch script {} on this OS", script.display()),
            ))
        }
    }
}
