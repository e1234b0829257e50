//! iptables backend implementation.

use tracing::debug;

use super::{BackendResult, FirewallBackend, Rule};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput, RealCommandExecutor};
use crate::error::BackendError;

const DEFAULT_PROGRAM: &str = "iptables";

/// iptables backend operating on the `filter` table.
pub struct IptablesBackend<E: CommandExecutor = RealCommandExecutor> {
    program: String,
    executor: E,
}

impl IptablesBackend {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Use a specific iptables binary (e.g. `/usr/sbin/iptables-legacy`).
    pub fn with_program(program: &str) -> Self {
        Self::with_executor(program, RealCommandExecutor::new())
    }
}

impl Default for IptablesBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> IptablesBackend<E> {
    pub fn with_executor(program: &str, executor: E) -> Self {
        Self {
            program: program.to_string(),
            executor,
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    /// Run iptables, mapping spawn failures to `Unavailable`.
    fn run(&self, args: Vec<String>) -> Result<CommandOutput, BackendError> {
        debug!("{}", self.command_line(&args));
        self.executor
            .execute(&self.program, &args)
            .map_err(|e| BackendError::Unavailable(format!("{}: {}", self.program, e)))
    }

    /// Run iptables and require a zero exit status.
    fn run_checked(&self, args: Vec<String>) -> BackendResult {
        let command = self.command_line(&args);
        let output = self.run(args)?;
        if output.success {
            Ok(())
        } else {
            Err(BackendError::Command {
                command,
                diagnostic: output.diagnostic(),
            })
        }
    }

    fn rule_args(op: &str, chain: &str, position: Option<u32>, rule: &Rule) -> Vec<String> {
        let mut args = vec![op.to_string(), chain.to_string()];
        if let Some(position) = position {
            args.push(position.to_string());
        }
        args.extend(rule.to_args());
        args
    }
}

impl<E: CommandExecutor> FirewallBackend for IptablesBackend<E> {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        self.run(args_to_strings(&["--version"]))
            .map(|o| o.success)
            .unwrap_or(false)
    }

    fn chain_exists(&self, chain: &str) -> bool {
        // -n -L exits 0 only when the chain exists
        self.run(args_to_strings(&["-n", "-L", chain]))
            .map(|o| o.success)
            .unwrap_or(false)
    }

    fn create_chain(&self, chain: &str) -> BackendResult {
        self.run_checked(args_to_strings(&["-N", chain]))
    }

    fn flush_chain(&self, chain: &str) -> BackendResult {
        self.run_checked(args_to_strings(&["-F", chain]))
    }

    fn delete_chain(&self, chain: &str) -> BackendResult {
        self.run_checked(args_to_strings(&["-X", chain]))
    }

    fn append_rule(&self, chain: &str, rule: &Rule) -> BackendResult {
        self.run_checked(Self::rule_args("-A", chain, None, rule))
    }

    fn insert_rule(&self, chain: &str, position: u32, rule: &Rule) -> BackendResult {
        self.run_checked(Self::rule_args("-I", chain, Some(position), rule))
    }

    fn delete_rule(&self, chain: &str, rule: &Rule) -> BackendResult {
        self.run_checked(Self::rule_args("-D", chain, None, rule))
    }

    fn rule_exists(&self, chain: &str, rule: &Rule) -> Result<bool, BackendError> {
        let output = self.run(Self::rule_args("-C", chain, None, rule))?;
        Ok(output.success)
    }

    fn list_rules(&self, chain: &str) -> Result<Vec<String>, BackendError> {
        let args = args_to_strings(&["-S", chain]);
        let command = self.command_line(&args);
        let output = self.run(args)?;
        if !output.success {
            return Err(BackendError::Command {
                command,
                diagnostic: output.diagnostic(),
            });
        }

        // -S prints the chain policy/declaration (-P/-N) before its rules
        Ok(output
            .stdout
            .lines()
            .filter(|line| line.starts_with("-A "))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::MockCommandExecutor;

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        }
    }

    fn expect_args(mock: &mut MockCommandExecutor, expected: &'static [&'static str], output: CommandOutput) {
        mock.expect_execute()
            .withf(move |cmd, args| cmd == "iptables" && args == expected)
            .times(1)
            .returning(move |_, _| Ok(output.clone()));
    }

    #[test]
    fn test_create_flush_delete_chain_args() {
        let mut mock = MockCommandExecutor::new();
        expect_args(&mut mock, &["-N", "AU_WHITELIST"], ok(""));
        expect_args(&mut mock, &["-F", "AU_WHITELIST"], ok(""));
        expect_args(&mut mock, &["-X", "AU_WHITELIST"], ok(""));
        let backend = IptablesBackend::with_executor("iptables", mock);

        assert!(backend.create_chain("AU_WHITELIST").is_ok());
        assert!(backend.flush_chain("AU_WHITELIST").is_ok());
        assert!(backend.delete_chain("AU_WHITELIST").is_ok());
    }

    #[test]
    fn test_append_accept_args() {
        let mut mock = MockCommandExecutor::new();
        expect_args(
            &mut mock,
            &["-A", "AU_WHITELIST", "-s", "1.2.3.0/24", "-j", "ACCEPT"],
            ok(""),
        );
        let backend = IptablesBackend::with_executor("iptables", mock);

        let rule = Rule::accept_from("1.2.3.0/24".parse().unwrap());
        assert!(backend.append_rule("AU_WHITELIST", &rule).is_ok());
    }

    #[test]
    fn test_insert_jump_at_head_args() {
        let mut mock = MockCommandExecutor::new();
        expect_args(&mut mock, &["-I", "INPUT", "1", "-j", "AU_WHITELIST"], ok(""));
        let backend = IptablesBackend::with_executor("iptables", mock);

        assert!(backend
            .insert_rule("INPUT", 1, &Rule::jump("AU_WHITELIST"))
            .is_ok());
    }

    #[test]
    fn test_delete_drop_failure_carries_diagnostic() {
        let mut mock = MockCommandExecutor::new();
        expect_args(
            &mut mock,
            &["-D", "INPUT", "-j", "DROP"],
            failed("iptables: Bad rule (does a matching rule exist in that chain?).\n"),
        );
        let backend = IptablesBackend::with_executor("iptables", mock);

        let err = backend.delete_rule("INPUT", &Rule::drop_all()).unwrap_err();
        assert_eq!(
            err,
            BackendError::Command {
                command: "iptables -D INPUT -j DROP".to_string(),
                diagnostic: "iptables: Bad rule (does a matching rule exist in that chain?)."
                    .to_string(),
            }
        );
    }

    #[test]
    fn test_spawn_failure_is_unavailable() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(anyhow::anyhow!("No such file or directory (os error 2)")));
        let backend = IptablesBackend::with_executor("iptables", mock);

        let err = backend.create_chain("AU_WHITELIST").unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(!backend.is_available());
        assert!(!backend.chain_exists("AU_WHITELIST"));
    }

    #[test]
    fn test_chain_exists_uses_exit_status() {
        let mut mock = MockCommandExecutor::new();
        expect_args(&mut mock, &["-n", "-L", "AU_WHITELIST"], ok("Chain AU_WHITELIST (1 references)\n"));
        expect_args(
            &mut mock,
            &["-n", "-L", "MISSING"],
            failed("iptables: No chain/target/match by that name.\n"),
        );
        let backend = IptablesBackend::with_executor("iptables", mock);

        assert!(backend.chain_exists("AU_WHITELIST"));
        assert!(!backend.chain_exists("MISSING"));
    }

    #[test]
    fn test_rule_exists() {
        let mut mock = MockCommandExecutor::new();
        expect_args(&mut mock, &["-C", "INPUT", "-j", "AU_WHITELIST"], ok(""));
        expect_args(&mut mock, &["-C", "INPUT", "-j", "DROP"], failed("iptables: Bad rule.\n"));
        let backend = IptablesBackend::with_executor("iptables", mock);

        assert!(backend
            .rule_exists("INPUT", &Rule::jump("AU_WHITELIST"))
            .unwrap());
        assert!(!backend.rule_exists("INPUT", &Rule::drop_all()).unwrap());
    }

    #[test]
    fn test_list_rules_skips_declaration() {
        let mut mock = MockCommandExecutor::new();
        expect_args(
            &mut mock,
            &["-S", "AU_WHITELIST"],
            ok("-N AU_WHITELIST\n-A AU_WHITELIST -s 127.0.0.0/8 -j ACCEPT\n-A AU_WHITELIST -s 1.2.3.0/24 -j ACCEPT\n"),
        );
        let backend = IptablesBackend::with_executor("iptables", mock);

        let rules = backend.list_rules("AU_WHITELIST").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], "-A AU_WHITELIST -s 127.0.0.0/8 -j ACCEPT");
    }

    #[test]
    fn test_custom_program_name() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "/usr/sbin/iptables-legacy" && args == ["--version".to_string()])
            .times(1)
            .returning(|_, _| Ok(ok("iptables v1.8.9 (legacy)\n")));
        let backend = IptablesBackend::with_executor("/usr/sbin/iptables-legacy", mock);

        assert!(backend.is_available());
        assert_eq!(backend.name(), "/usr/sbin/iptables-legacy");
    }
}
