use serde::Serialize;
use simpl_sry::SryConfig;
use simpl_transport::{FifoPair, Segment};

use crate::cmd::{Context, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::logging::log_file_writable;
use crate::output::{schema_id, OutputFormat};

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: String,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, ctx: &Context) -> CliResult<i32> {
    let checks = vec![
        fifo_dir_check(&ctx.sry_config),
        fifo_create_check(&ctx.sry_config),
        shared_memory_check(),
        liveness_probe_check(&ctx.sry_config),
        log_file_check(ctx.log_file.as_deref()),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        schema_id: schema_id("doctor-report"),
        checks,
        overall,
    };

    print_doctor(&output, ctx.format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("simpl doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<18} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn fifo_dir_check(config: &SryConfig) -> CheckResult {
    match config.registry().check_dir() {
        Ok(()) => CheckResult::new(
            "fifo_dir",
            CheckStatus::Pass,
            format!("{} is usable", config.fifo_dir.display()),
        ),
        Err(err) => CheckResult::new("fifo_dir", CheckStatus::Fail, err.to_string()),
    }
}

fn fifo_create_check(config: &SryConfig) -> CheckResult {
    let name = format!("simpl_doctor_{}", std::process::id());
    match FifoPair::create(&config.fifo_dir, &name, std::process::id()) {
        Ok(pair) => {
            pair.remove();
            CheckResult::new("fifo_create", CheckStatus::Pass, "fifo pair created and removed")
        }
        Err(err) => CheckResult::new("fifo_create", CheckStatus::Fail, err.to_string()),
    }
}

fn shared_memory_check() -> CheckResult {
    match Segment::allocate(1) {
        Ok(segment) => CheckResult::new(
            "shared_memory",
            CheckStatus::Pass,
            format!("allocated a {}-byte segment", segment.size()),
        ),
        Err(err) => CheckResult::new("shared_memory", CheckStatus::Fail, err.to_string()),
    }
}

fn liveness_probe_check(config: &SryConfig) -> CheckResult {
    let registry = config.registry();
    let probe = registry.probe();
    if probe.is_alive(std::process::id()) {
        CheckResult::new("liveness_probe", CheckStatus::Pass, probe.name())
    } else {
        CheckResult::new(
            "liveness_probe",
            CheckStatus::Warn,
            format!("{} does not see this process", probe.name()),
        )
    }
}

fn log_file_check(path: Option<&std::path::Path>) -> CheckResult {
    let Some(path) = path else {
        return CheckResult::new("log_file", CheckStatus::Skip, "log file disabled");
    };
    match log_file_writable(path) {
        Ok(()) => CheckResult::new(
            "log_file",
            CheckStatus::Pass,
            format!("{} is writable", path.display()),
        ),
        Err(err) => CheckResult::new(
            "log_file",
            CheckStatus::Warn,
            format!("{}: {err}", path.display()),
        ),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = Vec::new();
    if cfg!(feature = "surrogate") {
        features.push("surrogate");
    }
    if cfg!(feature = "cli") {
        features.push("cli");
    }
    CheckResult::new("compiled_features", CheckStatus::Info, features.join(", "))
}
