//! Command execution abstraction for testability.
//!
//! The iptables backend talks to the kernel only through [`CommandExecutor`], so
//! unit tests can assert on the exact argv it produces without running anything.

use anyhow::Result;
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Best diagnostic text for a failed command: stderr, else stdout, else the exit code.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// `Err` means the program could not be spawned at all; a program that ran and
/// exited non-zero is reported through [`CommandOutput::success`].
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes `&[String]`.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["-N", "AU_WHITELIST"]);
        assert_eq!(args, vec!["-N", "AU_WHITELIST"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = CommandOutput {
            stdout: "ignored".to_string(),
            stderr: "iptables: No chain/target/match by that name.\n".to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(
            output.diagnostic(),
            "iptables: No chain/target/match by that name."
        );
    }

    #[test]
    fn test_diagnostic_falls_back_to_exit_code() {
        let output = CommandOutput {
            code: Some(4),
            ..Default::default()
        };
        assert_eq!(output.diagnostic(), "exit status 4");
        assert_eq!(CommandOutput::default().diagnostic(), "terminated by signal");
    }

    #[test]
    fn test_real_command_executor_execute_echo() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_command_executor_execute_failure() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("ls", &args_to_strings(&["--invalid-flag"]))
            .unwrap();
        assert!(!output.success);
        assert!(!output.diagnostic().is_empty());
    }

    #[test]
    fn test_real_command_executor_missing_program() {
        let executor = RealCommandExecutor::new();
        let result = executor.execute("/nonexistent/geowall-test-binary", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_mock_command_executor() {
        let mut mock = MockCommandExecutor::new();

        mock.expect_execute()
            .withf(|cmd, args| cmd == "iptables" && args == ["-N".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let output = mock.execute("iptables", &["-N".to_string()]).unwrap();
        assert!(output.success);
    }
}
