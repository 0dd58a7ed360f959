//! Linux and macOS swap script (`/bin/sh`).

use super::{Platform, SelfReplace, SwapPlan};
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// POSIX shell strategy shared by Linux and macOS.
#[derive(Debug, Clone, Copy)]
pub struct PosixReplace {
    platform: Platform,
}

impl PosixReplace {
    pub fn linux() -> Self {
        Self {
            platform: Platform::Linux,
        }
    }

    pub fn macos() -> Self {
        Self {
            platform: Platform::MacOs,
        }
    }
}

/// Single-quote `path` for `sh`.
fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// The enclosing `.app` bundle, if `exe` lives in `Foo.app/Contents/MacOS/`.
fn app_bundle(exe: &Path) -> Option<PathBuf> {
    exe.ancestors()
        .find(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("app"))
        })
        .map(Path::to_path_buf)
}

impl SelfReplace for PosixReplace {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn script_file_name(&self) -> &'static str {
        "update_integra.sh"
    }

    fn relaunch_command(&self, target: &Path) -> String {
        match (self.platform, app_bundle(target)) {
            (Platform::MacOs, Some(bundle)) => format!("open {} &", sh_quote(&bundle)),
            _ => format!("nohup {} >/dev/null 2>&1 &", sh_quote(target)),
        }
    }

    fn render_script(&self, plan: &SwapPlan) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "#!/bin/sh");
        let _ = writeln!(s, "# Integra Client Manager update helper.");
        let _ = writeln!(s, "NEW={}", sh_quote(&plan.new_binary));
        let _ = writeln!(s, "TARGET={}", sh_quote(&plan.target));
        let _ = writeln!(s, "BACKUP={}", sh_quote(&plan.backup));
        let _ = writeln!(s);
        let _ = writeln!(s, "echo \"Waiting for Integra to close...\"");
        let _ = writeln!(s, "sleep {}", plan.grace.as_secs());
        let _ = writeln!(s);
        let _ = writeln!(s, "ok=0");
        let _ = writeln!(s, "i=1");
        let _ = writeln!(s, "while [ \"$i\" -le {} ]; do", plan.attempts);
        let _ = writeln!(s, "    echo \"Replacing executable (attempt $i)...\"");
        let _ = writeln!(s, "    if cp -f \"$NEW\" \"$TARGET\" 2>/dev/null; then");
        let _ = writeln!(s, "        ok=1");
        let _ = writeln!(s, "        break");
        let _ = writeln!(s, "    fi");
        let _ = writeln!(s, "    i=$((i + 1))");
        let _ = writeln!(
            s,
            "    [ \"$i\" -le {} ] && sleep {}",
            plan.attempts,
            plan.retry_delay.as_secs()
        );
        let _ = writeln!(s, "done");
        let _ = writeln!(s);
        let _ = writeln!(s, "if [ \"$ok\" -ne 1 ] || [ ! -f \"$TARGET\" ]; then");
        let _ = writeln!(s, "    echo \"Update failed, restoring backup...\"");
        let _ = writeln!(s, "    cp -f \"$BACKUP\" \"$TARGET\"");
        let _ = writeln!(s, "    exit 1");
        let _ = writeln!(s, "fi");
        let _ = writeln!(s);
        let _ = writeln!(s, "chmod 755 \"$TARGET\"");
        let _ = writeln!(s, "rm -f \"$BACKUP\"");
        let _ = writeln!(s, "echo \"Update completed, restarting...\"");
        let _ = writeln!(s, "{}", self.relaunch_command(&plan.target));
        let _ = writeln!(s, "rm -f \"$0\"");
        let _ = writeln!(s, "exit 0");
        s
    }

    fn launch_detached(&self, script: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755))?;
        }

        let mut cmd = Command::new("nohup");
        cmd.arg("/bin/sh")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        tracing::info!(pid = child.id(), script = %script.display(), "swap script launched");
        Ok(())
    }
}
