use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;

use crate::error::ProcessError;

/// Image name of the running Steam client as the process table reports it.
pub const CLIENT_IMAGE: &str = if cfg!(windows) {
    "steam.exe"
} else if cfg!(target_os = "macos") {
    "steam_osx"
} else {
    "steam"
};

/// A program to start, detached from this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    /// The Steam client under `steam_root`, optionally asked to log in as
    /// `login`.
    pub fn steam_client(steam_root: &Path, login: Option<&str>) -> Self {
        let (program, mut args) = if cfg!(windows) {
            (steam_root.join("steam.exe"), Vec::new())
        } else if cfg!(target_os = "macos") {
            (
                PathBuf::from("open"),
                vec!["-a".to_string(), "Steam".to_string(), "--args".to_string()],
            )
        } else {
            let script = steam_root.join("steam.sh");
            if script.exists() {
                (script, Vec::new())
            } else {
                (PathBuf::from("steam"), Vec::new())
            }
        };

        if let Some(account) = login {
            args.push("-login".to_string());
            args.push(account.to_string());
        }

        Self {
            program,
            args,
            working_dir: Some(steam_root.to_path_buf()),
        }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Stops every process named `image`. `NotRunning` when there was none.
    async fn terminate(&self, image: &str) -> Result<(), ProcessError>;

    /// Starts `spec` without waiting for it.
    async fn launch(&self, spec: &LaunchSpec) -> Result<(), ProcessError>;

    async fn is_running(&self, image: &str) -> Result<bool, ProcessError>;
}

/// Process control against the real OS process table.
pub struct SystemProcesses;

#[async_trait]
impl ProcessControl for SystemProcesses {
    async fn terminate(&self, image: &str) -> Result<(), ProcessError> {
        let image = image.to_string();
        tokio::task::spawn_blocking(move || table::terminate(&image)).await?
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<(), ProcessError> {
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || spawn_detached(&spec)).await?
    }

    async fn is_running(&self, image: &str) -> Result<bool, ProcessError> {
        let image = image.to_string();
        tokio::task::spawn_blocking(move || table::is_running(&image)).await?
    }
}

fn spawn_detached(spec: &LaunchSpec) -> Result<(), ProcessError> {
    let mut cmd = spec.command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    platform::detach(&mut cmd);

    tracing::debug!(command = %format_command(&cmd), "Launching");
    cmd.spawn()
        .map(drop)
        .map_err(|source| ProcessError::Launch {
            program: spec.program.display().to_string(),
            source,
        })
}

pub fn format_command(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| {
            let part_lossy = part.to_string_lossy();
            let part_owned = part_lossy.into_owned();
            match shlex::try_quote(part_owned.as_str()) {
                Ok(value) => value.into_owned(),
                Err(_) => part_owned,
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(unix)]
mod platform {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use nix::unistd::Pid;

    pub fn detach(cmd: &mut Command) {
        // Own process group so the client outlives this process and its
        // terminal's signals.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
                Ok(())
            });
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::os::windows::process::CommandExt;
    use std::process::Command;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const DETACHED_PROCESS: u32 = 0x0000_0008;

    pub fn detach(cmd: &mut Command) {
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }
}

#[cfg(target_os = "linux")]
mod table {
    use std::fs;

    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    use crate::error::ProcessError;

    pub fn terminate(image: &str) -> Result<(), ProcessError> {
        let pids = find_pids(image)?;
        if pids.is_empty() {
            return Err(ProcessError::NotRunning(image.to_string()));
        }

        for pid in pids {
            let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
                pid,
                message: "PID out of range".to_string(),
            })?;
            match kill(Pid::from_raw(raw), Signal::SIGTERM) {
                // Already gone.
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => {
                    return Err(ProcessError::Signal {
                        pid,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_running(image: &str) -> Result<bool, ProcessError> {
        Ok(!find_pids(image)?.is_empty())
    }

    fn find_pids(image: &str) -> Result<Vec<u32>, ProcessError> {
        let proc = fs::read_dir("/proc").map_err(|err| ProcessError::Query(err.to_string()))?;
        let own_pid = std::process::id();

        let mut pids = Vec::new();
        for entry in proc.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == own_pid {
                continue;
            }

            let comm = match fs::read_to_string(entry.path().join("comm")) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if comm.trim() == image {
                pids.push(pid);
            }
        }
        Ok(pids)
    }
}

#[cfg(not(target_os = "linux"))]
mod table {
    use sysinfo::{Process, ProcessesToUpdate, Signal, System};

    use crate::error::ProcessError;

    fn snapshot() -> System {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys
    }

    fn named<'a>(sys: &'a System, image: &'a str) -> impl Iterator<Item = &'a Process> {
        sys.processes()
            .values()
            .filter(move |p| p.name().to_string_lossy().eq_ignore_ascii_case(image))
    }

    pub fn terminate(image: &str) -> Result<(), ProcessError> {
        let sys = snapshot();
        let mut found = false;
        for process in named(&sys, image) {
            found = true;
            // Windows has no SIGTERM; `kill_with` is `None` there.
            let delivered = process.kill_with(Signal::Term).unwrap_or_else(|| process.kill());
            if !delivered {
                return Err(ProcessError::Signal {
                    pid: process.pid().as_u32(),
                    message: "signal was not delivered".to_string(),
                });
            }
        }

        if found {
            Ok(())
        } else {
            Err(ProcessError::NotRunning(image.to_string()))
        }
    }

    pub fn is_running(image: &str) -> Result<bool, ProcessError> {
        Ok(named(&snapshot(), image).next().is_some())
    }
}
