//! Kubectl wrapper utilities and remote command execution on nodes

use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

/// Namespace holding the privileged helper pods, one per worker node
pub const PRIV_POD_NAMESPACE: &str = "cnfgotestpriv";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed on {node}: {command}\n{stderr}")]
    Failed {
        node: String,
        command: String,
        stderr: String,
    },

    #[error("command output was not valid UTF-8")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

/// Runs commands on cluster nodes
pub trait CommandRunner {
    /// Run `argv` on `node` and return its stdout
    fn run(
        &self,
        node: &str,
        argv: &[String],
    ) -> impl Future<Output = Result<String, CommandError>> + Send;
}

/// Name of the privileged helper pod scheduled on `node`
pub fn priv_pod_name(node: &str) -> String {
    format!("{}-{}", PRIV_POD_NAMESPACE, node)
}

/// Runs commands through `kubectl exec` in the privileged helper pod of each node
#[derive(Clone, Debug, Default)]
pub struct KubectlRunner {
    kubeconfig: Option<PathBuf>,
    namespace: String,
}

impl KubectlRunner {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self {
            kubeconfig,
            namespace: PRIV_POD_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Arguments passed to kubectl for running `argv` on `node`
    pub fn exec_args(&self, node: &str, argv: &[String]) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "-n".to_string(),
            self.namespace.clone(),
            priv_pod_name(node),
            "--".to_string(),
        ];
        args.extend(argv.iter().cloned());
        args
    }
}

impl CommandRunner for KubectlRunner {
    async fn run(&self, node: &str, argv: &[String]) -> Result<String, CommandError> {
        let args = self.exec_args(node, argv);
        tracing::debug!(node, command = %argv.join(" "), "exec in helper pod");
        run_kubectl_output(args.as_slice(), self.kubeconfig.as_deref())
            .await
            .map_err(|err| match err {
                CommandError::Failed { command, stderr, .. } => CommandError::Failed {
                    node: node.to_string(),
                    command,
                    stderr,
                },
                other => other,
            })
    }
}

/// Run kubectl and capture output
pub async fn run_kubectl_output<S: AsRef<str>>(
    args: &[S],
    kubeconfig: Option<&Path>,
) -> Result<String, CommandError> {
    let mut cmd = Command::new("kubectl");

    if let Some(kc) = kubeconfig {
        cmd.env("KUBECONFIG", kc);
    }

    let args: Vec<&str> = args.iter().map(|arg| arg.as_ref()).collect();
    cmd.args(&args);

    let output = cmd.output().await.map_err(|source| CommandError::Spawn {
        program: "kubectl".to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            node: "local".to_string(),
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8(output.stdout)?)
}

/// Wrap a shell snippet for execution through bash on the node
pub fn bash(script: impl Into<String>) -> Vec<String> {
    vec!["/bin/bash".to_string(), "-c".to_string(), script.into()]
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers commands from a table keyed by the joined argv
    #[derive(Default)]
    pub struct FakeRunner {
        pub responses: HashMap<String, String>,
        pub default_response: Option<String>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeRunner {
        pub fn respond(mut self, command: &str, output: &str) -> Self {
            self.responses.insert(command.to_string(), output.to_string());
            self
        }

        pub fn respond_to_all(mut self, output: &str) -> Self {
            self.default_response = Some(output.to_string());
            self
        }

        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        async fn run(&self, node: &str, argv: &[String]) -> Result<String, CommandError> {
            let command = argv.join(" ");
            self.calls
                .lock()
                .unwrap()
                .push((node.to_string(), command.clone()));

            self.responses
                .get(&command)
                .or(self.default_response.as_ref())
                .cloned()
                .ok_or(CommandError::Failed {
                    node: node.to_string(),
                    command,
                    stderr: "command not found".to_string(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_args_target_helper_pod() {
        let runner = KubectlRunner::new(None);
        let args = runner.exec_args("worker-0", &["uname".to_string(), "-r".to_string()]);
        assert_eq!(
            args,
            vec!["exec", "-n", "cnfgotestpriv", "cnfgotestpriv-worker-0", "--", "uname", "-r"]
        );
    }

    #[test]
    fn test_custom_namespace() {
        let runner = KubectlRunner::new(None).with_namespace("debug");
        assert_eq!(runner.exec_args("n", &[])[2], "debug");
    }

    #[test]
    fn test_bash_wrapper() {
        assert_eq!(bash("cat /proc/cmdline"), vec!["/bin/bash", "-c", "cat /proc/cmdline"]);
    }
}
