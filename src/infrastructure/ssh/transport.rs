//! Builds argument vectors for SSH invocations and runs one-shot/streaming
//! commands (§4.2). Neither shape performs shell quoting automatically.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

use crate::domain::errors::SshError;
use crate::domain::models::config::SshConfig;

pub struct SshTransport {
    cfg: SshConfig,
}

pub struct SshOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl SshTransport {
    pub fn new(cfg: SshConfig) -> Self {
        Self { cfg }
    }

    fn host(&self, vm_id: &str) -> String {
        format!("{vm_id}.{}", self.cfg.host_suffix)
    }

    fn base_args(&self, key_path: &Path, vm_id: &str) -> Vec<String> {
        let host = self.host(vm_id);
        let mut args = vec![
            "-i".to_string(),
            key_path.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.cfg.connect_timeout_secs),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.cfg.keepalive_interval_secs),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.cfg.keepalive_count_max),
        ];

        if let Some(template) = &self.cfg.proxy_command_template {
            let proxy_command = template.replace("{host}", &host);
            args.push("-o".to_string());
            args.push(format!("ProxyCommand={proxy_command}"));
        }

        args.push(format!("{}@{}", self.cfg.user, host));
        args
    }

    /// Spawn SSH, write nothing to stdin, collect stdout/stderr as buffered
    /// byte strings. Used for short synchronous commands.
    pub async fn exec_oneshot(&self, key_path: &Path, vm_id: &str, remote_cmd: &str) -> Result<SshOutput, SshError> {
        self.exec_oneshot_with_stdin(key_path, vm_id, remote_cmd, None).await
    }

    /// Like `exec_oneshot`, but writes `stdin_data` to the child's stdin
    /// before closing it. Used by the RPC channel's outbound `send` path
    /// (`cat > <in-fifo>`, §4.3).
    pub async fn exec_oneshot_with_stdin(
        &self,
        key_path: &Path,
        vm_id: &str,
        remote_cmd: &str,
        stdin_data: Option<&[u8]>,
    ) -> Result<SshOutput, SshError> {
        let mut args = self.base_args(key_path, vm_id);
        args.push(remote_cmd.to_string());

        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SshError::Io(e.to_string()))?;

        if let Some(data) = stdin_data {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(data).await;
                let _ = stdin.shutdown().await;
            }
        } else {
            drop(child.stdin.take());
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SshError::Io(e.to_string()))?;

        Ok(SshOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Spawn SSH, pipe its stdout/stderr line-by-line into `sender`, honour
    /// `cancel` and `deadline` by SIGTERMing the child.
    pub async fn exec_streaming(
        &self,
        key_path: &Path,
        vm_id: &str,
        remote_cmd: &str,
        sender: mpsc::Sender<Vec<u8>>,
        mut cancel: watch::Receiver<bool>,
        deadline: Option<Duration>,
    ) -> Result<i32, SshError> {
        let mut args = self.base_args(key_path, vm_id);
        args.push(remote_cmd.to_string());

        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SshError::Io(e.to_string()))?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stdout_sender = sender.clone();
        let stdout_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if stdout_sender.send(line.clone()).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if sender.send(line.clone()).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let deadline_sleep = async {
            if let Some(d) = deadline {
                tokio::time::sleep(d).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        let result = tokio::select! {
            status = child.wait() => {
                status.map(|s| s.code().unwrap_or(-1)).map_err(|e| SshError::Io(e.to_string()))
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    terminate(&mut child).await;
                    Err(SshError::Aborted)
                } else {
                    child.wait().await.map(|s| s.code().unwrap_or(-1)).map_err(|e| SshError::Io(e.to_string()))
                }
            }
            () = deadline_sleep => {
                let secs = deadline.map(|d| d.as_secs()).unwrap_or_default();
                terminate(&mut child).await;
                Err(SshError::Timeout(secs))
            }
        };

        let _ = stdout_task.await;
        let _ = stderr_task.await;
        result
    }
}

async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
    }
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_combines_vm_id_and_suffix() {
        let cfg = SshConfig {
            host_suffix: "vms.example.com".to_string(),
            ..SshConfig::default()
        };
        let transport = SshTransport::new(cfg);
        assert_eq!(transport.host("vm-123"), "vm-123.vms.example.com");
    }

    #[test]
    fn base_args_include_required_options() {
        let cfg = SshConfig {
            proxy_command_template: None,
            ..SshConfig::default()
        };
        let transport = SshTransport::new(cfg);
        let args = transport.base_args(Path::new("/tmp/key.pem"), "vm-1");
        assert!(args.iter().any(|a| a == "StrictHostKeyChecking=no"));
        assert!(args.iter().any(|a| a.starts_with("ConnectTimeout=")));
        assert!(args.last().unwrap().starts_with("root@"));
    }

    #[test]
    fn proxy_command_substitutes_host() {
        let cfg = SshConfig::default();
        let transport = SshTransport::new(cfg);
        let args = transport.base_args(Path::new("/tmp/key.pem"), "vm-1");
        let proxy_arg = args.iter().find(|a| a.starts_with("ProxyCommand=")).unwrap();
        assert!(proxy_arg.contains("vm-1.vms.internal.example.com:443"));
    }
}
