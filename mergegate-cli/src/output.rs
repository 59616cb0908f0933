// Output formatting helpers for CLI commands
// Progress lines go to stderr; step stdout stays on stdout

use mergegate_core::{AggregateReport, AggregateStatus, DependencyVerdict};

/// Print a right-aligned action and its subject: "     Loading ci.yml"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// A passing item in a list, lighter than `success`
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// Print a dependency level header
pub fn level_header(level: usize, total_jobs: usize) {
    eprintln!("\x1b[1;34m  Level {}\x1b[0m ({} jobs)", level, total_jobs);
}

/// Step stdout, tagged with the instance that produced it
pub fn step_output(instance: &str, line: &str) {
    println!("        \x1b[2m[{}]\x1b[0m | {}", instance, line);
}

pub fn step_error(instance: &str, line: &str) {
    eprintln!("\x1b[31m        [{}] | {}\x1b[0m", instance, line);
}

/// One line per dependency followed by the gate verdict
pub fn gate_report(gate: Option<&str>, report: &AggregateReport) {
    for verdict in &report.dependencies {
        dependency_verdict(verdict);
    }
    eprintln!();
    gate_verdict(gate, report.status);
}

/// Print the final gate line: "  ✓ Gate 'ci-result' passed (exit 0)"
pub fn gate_verdict(gate: Option<&str>, status: AggregateStatus) {
    let subject = match gate {
        Some(name) => format!("Gate '{}'", name),
        None => "Gate".to_string(),
    };
    let code = status.exit_code();

    if status.is_success() {
        success(&format!("{} passed (exit {})", subject, code));
    } else {
        failure(&format!("{} failed (exit {})", subject, code));
    }
}

fn dependency_verdict(verdict: &DependencyVerdict) {
    if !verdict.reported {
        failure(&format!("{}: not reported", verdict.job));
        return;
    }

    let counts = verdict_counts(verdict);
    if !verdict.passed {
        failure(&format!("{}: {}", verdict.job, counts));
        for failed in &verdict.failed {
            dim_failure(&format!("      {}", failed));
        }
        for pending in &verdict.pending {
            dim_failure(&format!("      {}: still pending", pending));
        }
    } else if verdict.total == 0 {
        warning(&format!("{}: reported without instances", verdict.job));
    } else {
        check(&format!("{}: {}", verdict.job, counts));
    }
}

/// "2/3 succeeded, 1 skipped"
fn verdict_counts(verdict: &DependencyVerdict) -> String {
    let mut counts = format!("{}/{} succeeded", verdict.succeeded, verdict.total);
    if verdict.skipped > 0 {
        counts.push_str(&format!(", {} skipped", verdict.skipped));
    }
    let failed = verdict.failed.len() + verdict.pending.len();
    if failed > 0 {
        counts.push_str(&format!(", {} failed", failed));
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(succeeded: usize, skipped: usize, failed: &[&str]) -> DependencyVerdict {
        DependencyVerdict {
            job: "rstar".to_string(),
            passed: failed.is_empty(),
            reported: true,
            total: succeeded + skipped + failed.len(),
            succeeded,
            skipped,
            failed: failed.iter().map(|f| f.to_string()).collect(),
            pending: Vec::new(),
        }
    }

    #[test]
    fn test_verdict_counts() {
        assert_eq!(verdict_counts(&verdict(3, 0, &[])), "3/3 succeeded");
        assert_eq!(
            verdict_counts(&verdict(1, 1, &["rstar (img-c): cancelled"])),
            "1/3 succeeded, 1 skipped, 1 failed"
        );
    }
}
