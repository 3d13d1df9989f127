use std::path::PathBuf;

use policy_engine::{decide, Classifier, ConsensusOutcome, Verdict};
use quorumgate_core::config::Config;
use quorumgate_core::types::{InterceptedCall, OperationKind, Resource};
use quorumgate_core::{ConsensusResponse, TransportError, Votes};

const SENSITIVE_PREFIXES: [&str; 8] = [
    "/etc/", "/boot/", "/bin/", "/sbin/", "/usr/", "/lib/", "/lib64/", "/root/",
];

const SUFFIXES: [&str; 6] = [
    "passwd",
    "grub/grub.cfg",
    "local/bin/tool",
    "x86_64-linux-gnu/libc.so.6",
    "deeply/nested/dir/file.conf",
    ".bashrc",
];

const WRITE_KINDS: [OperationKind; 4] = [
    OperationKind::FileWrite,
    OperationKind::FileDelete,
    OperationKind::PermissionChange,
    OperationKind::FileOpen,
];

fn classifier() -> Classifier {
    Classifier::from_config(&Config::default_config().classifier)
}

fn write_call(kind: OperationKind, path: PathBuf) -> InterceptedCall {
    let call = InterceptedCall::new(kind, Resource::Path(path));
    if kind == OperationKind::FileOpen {
        call.with_flags((libc::O_WRONLY | libc::O_CREAT) as i64)
    } else {
        call
    }
}

#[test]
fn writes_under_sensitive_prefixes_always_require_consensus() {
    let classifier = classifier();
    for prefix in SENSITIVE_PREFIXES {
        for suffix in SUFFIXES {
            for kind in WRITE_KINDS {
                let path = PathBuf::from(format!("{prefix}{suffix}"));
                let call = write_call(kind, path.clone());
                assert!(
                    classifier.requires_consensus(&call),
                    "{kind} on {} should require consensus",
                    path.display()
                );
            }
        }
    }
}

#[test]
fn reads_outside_secret_list_never_require_consensus() {
    let classifier = classifier();
    let secrets = &Config::default_config().classifier.secret_files;
    let roots = ["/etc/", "/usr/share/", "/home/alice/", "/tmp/", "/var/log/", "/root/"];
    for root in roots {
        for suffix in SUFFIXES {
            let path = format!("{root}{suffix}");
            if secrets.contains(&path) {
                continue;
            }
            let call = InterceptedCall::on_path(OperationKind::FileRead, path.clone());
            assert!(!classifier.requires_consensus(&call), "read of {path} should pass");
        }
    }
    for secret in secrets {
        let call = InterceptedCall::on_path(OperationKind::FileRead, secret.clone());
        assert!(classifier.requires_consensus(&call), "read of {secret} should be gated");
    }
}

#[test]
fn writes_outside_sensitive_prefixes_pass() {
    let classifier = classifier();
    let paths = ["/home/alice/report.txt", "/tmp/build/out.o", "/var/tmp/cache", "/srv/data/db"];
    for path in paths {
        for kind in WRITE_KINDS {
            let call = write_call(kind, PathBuf::from(path));
            assert!(!classifier.requires_consensus(&call), "{kind} on {path} should pass");
        }
    }
}

#[test]
fn prefix_matching_does_not_canonicalize() {
    let classifier = classifier();
    // Acknowledged weakness: relative and dot-dot spellings are not resolved.
    let call = write_call(OperationKind::FileWrite, PathBuf::from("/tmp/../etc/passwd"));
    assert!(!classifier.requires_consensus(&call));
    let call = write_call(OperationKind::FileWrite, PathBuf::from("etc/passwd"));
    assert!(!classifier.requires_consensus(&call));
}

#[test]
fn every_non_approval_outcome_denies() {
    let outcomes = [
        ConsensusOutcome::from_result(Ok(ConsensusResponse::denied("DENY"))),
        ConsensusOutcome::from_result(Ok(ConsensusResponse {
            approved: false,
            votes: Some(Votes { votes_for: 1, votes_against: 4 }),
            reason: None,
        })),
        ConsensusOutcome::from_result(Err(TransportError::Unavailable("refused".into()))),
        ConsensusOutcome::from_result(Err(TransportError::Timeout(10_000))),
        ConsensusOutcome::from_result(Err(TransportError::Protocol("empty".into()))),
    ];
    for outcome in &outcomes {
        for _ in 0..100 {
            assert_eq!(decide(true, Some(outcome)), Verdict::Deny);
        }
    }
}

#[test]
fn identical_inputs_yield_identical_verdicts() {
    let classifier = classifier();
    let call = write_call(OperationKind::FileWrite, PathBuf::from("/etc/fstab"));
    let outcome = ConsensusOutcome::from_result(Ok(ConsensusResponse::approved()));
    let first = decide(classifier.requires_consensus(&call), Some(&outcome));
    for _ in 0..50 {
        assert_eq!(decide(classifier.requires_consensus(&call), Some(&outcome)), first);
    }
    assert_eq!(first, Verdict::Allow);
}

#[test]
fn mmap_threshold_from_config() {
    let classifier = classifier();
    let small = InterceptedCall::new(OperationKind::MemoryMap, Resource::None).with_size(4096);
    let large = InterceptedCall::new(OperationKind::MemoryMap, Resource::None)
        .with_size(classifier.mmap_threshold() + 1);
    assert!(!classifier.requires_consensus(&small));
    assert!(classifier.requires_consensus(&large));
}
