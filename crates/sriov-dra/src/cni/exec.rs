//! Plugin process execution

use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::CniError;

/// Captured result of one plugin run.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs CNI plugin binaries.
#[async_trait]
pub trait PluginExec: Send + Sync {
    async fn exec_plugin(
        &self,
        plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> io::Result<ExecOutput>;

    /// Locate `plugin` in the first directory of `paths` that contains it.
    fn find_in_path(&self, plugin: &str, paths: &[PathBuf]) -> Result<PathBuf, CniError> {
        if plugin.is_empty() || plugin.contains('/') {
            return Err(CniError::InvalidConfig(format!(
                "invalid plugin type {plugin:?}"
            )));
        }
        paths
            .iter()
            .map(|dir| dir.join(plugin))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CniError::PluginNotFound {
                plugin: plugin.to_string(),
                paths: paths.to_vec(),
            })
    }
}

/// Executes plugins as child processes.
///
/// The child is killed if the returned future is dropped before it exits.
#[derive(Debug, Clone, Default)]
pub struct RawExec;

#[async_trait]
impl PluginExec for RawExec {
    async fn exec_plugin(
        &self,
        plugin_path: &Path,
        stdin: &[u8],
        env: &[(String, String)],
    ) -> io::Result<ExecOutput> {
        let mut child = Command::new(plugin_path)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            match pipe.write_all(stdin).await {
                // The plugin may exit without reading its config.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                result => result?,
            }
        }

        let output = child.wait_with_output().await?;
        Ok(ExecOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use similar_asserts::assert_eq;
    use tempfile::TempDir;
    use test_log::test;

    use super::*;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test(tokio::test)]
    async fn raw_exec_pipes_stdin_and_env() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "echo-plugin", "cat; printf \" $CNI_COMMAND\"");

        let output = RawExec
            .exec_plugin(
                &script,
                b"{\"a\":1}",
                &[("CNI_COMMAND".to_string(), "ADD".to_string())],
            )
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(String::from_utf8(output.stdout).unwrap(), "{\"a\":1} ADD");
    }

    #[test(tokio::test)]
    async fn raw_exec_reports_failure_and_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "failing", "echo boom >&2; exit 1");

        let output = RawExec.exec_plugin(&script, b"", &[]).await.unwrap();

        assert!(!output.success);
        assert_eq!(String::from_utf8(output.stderr).unwrap(), "boom\n");
    }

    #[test]
    fn find_in_path_searches_directories_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let expected = write_script(second.path(), "sriov", "exit 0");

        let found = RawExec
            .find_in_path(
                "sriov",
                &[first.path().to_path_buf(), second.path().to_path_buf()],
            )
            .unwrap();

        assert_eq!(found, expected);
        assert!(matches!(
            RawExec.find_in_path("missing", &[first.path().to_path_buf()]),
            Err(CniError::PluginNotFound { .. })
        ));
        assert!(matches!(
            RawExec.find_in_path("../sriov", &[first.path().to_path_buf()]),
            Err(CniError::InvalidConfig(_))
        ));
    }
}
