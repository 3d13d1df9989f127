//! Process creation rules.
//!
//! Every exec and every fork is gated. The label only refines what the
//! backend is told about the program being started:
//! - shells and script interpreters get their own labels
//! - everything else is plain process execution

use std::path::Path;

use quorumgate_core::types::{InterceptedCall, OperationKind};

use crate::classification::Classification;

pub const EXEC_LABEL: &str = "Process execution";
pub const SHELL_LABEL: &str = "Shell execution";
pub const SCRIPT_LABEL: &str = "Script execution";
pub const FORK_LABEL: &str = "Process creation";

pub fn evaluate_process(call: &InterceptedCall) -> Classification {
    if call.kind == OperationKind::ProcessFork {
        return Classification::required("Process fork requires consensus", FORK_LABEL);
    }

    let program = call
        .path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    let label = if is_shell(&program) {
        SHELL_LABEL
    } else if is_script(&program) || call.metadata.args.iter().skip(1).any(|arg| is_script(arg)) {
        SCRIPT_LABEL
    } else {
        EXEC_LABEL
    };

    Classification::required(format!("Execution of {program} requires consensus"), label)
}

/// Checks if a program is a shell
fn is_shell(program: &str) -> bool {
    let shell_names = ["sh", "bash", "zsh", "fish", "dash", "csh", "tcsh", "ksh", "busybox"];

    let name = Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    shell_names.iter().any(|shell| name == *shell)
}

/// Checks if a program or argument is a script
fn is_script(program: &str) -> bool {
    let script_exts = [".sh", ".bash", ".zsh", ".fish", ".py", ".pl", ".rb", ".js"];

    let lower = program.to_lowercase();
    script_exts.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_detection() {
        assert!(is_shell("/bin/bash"));
        assert!(is_shell("sh"));
        assert!(!is_shell("/usr/bin/flash-player"));
        assert!(!is_shell("/usr/bin/ls"));
    }

    #[test]
    fn test_script_detection() {
        assert!(is_script("deploy.sh"));
        assert!(is_script("/opt/tool/run.py"));
        assert!(!is_script("/usr/bin/python3"));
    }

    #[test]
    fn every_exec_is_gated() {
        let call = InterceptedCall::on_path(OperationKind::ProcessExec, "/usr/bin/ls");
        let decision = evaluate_process(&call);
        assert!(decision.requires_consensus);
        assert_eq!(decision.tag(), EXEC_LABEL);

        let call = InterceptedCall::on_path(OperationKind::ProcessExec, "/usr/bin/python3")
            .with_args(vec!["python3".into(), "install.py".into()]);
        assert_eq!(evaluate_process(&call).tag(), SCRIPT_LABEL);

        let call = InterceptedCall::on_path(OperationKind::ProcessExec, "/bin/bash");
        assert_eq!(evaluate_process(&call).tag(), SHELL_LABEL);
    }

    #[test]
    fn every_fork_is_gated() {
        let call = InterceptedCall::new(OperationKind::ProcessFork, quorumgate_core::Resource::None)
            .with_pid(100);
        let decision = evaluate_process(&call);
        assert!(decision.requires_consensus);
        assert_eq!(decision.tag(), FORK_LABEL);
    }
}
