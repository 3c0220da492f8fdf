use cloudstage_engine::{ResourceOutcome, StageOutput, WorkflowResult, WorkflowStatus};
use cloudstage_provider::{ResourceKind, ResourceState};
use colored::Colorize;

fn field(state: &ResourceState, name: &str) -> String {
    state.field(name).unwrap_or_default()
}

pub fn server_line(state: &ResourceState) -> String {
    format!(
        "{}: IPv4: {} IPv6: {} username: {} password: {}",
        state.name,
        field(state, "ipv4"),
        field(state, "ipv6"),
        field(state, "username"),
        field(state, "password")
    )
}

pub fn print_servers<'a>(states: impl IntoIterator<Item = &'a ResourceState>) {
    for state in states {
        println!("{}", server_line(state));
    }
}

/// Line describing one record outcome; deletions print nothing
pub fn record_line(outcome: &ResourceOutcome) -> Option<String> {
    match outcome {
        ResourceOutcome::Ready(state) => Some(format!(
            "{} record created for {} -> {}",
            field(state, "record_type"),
            state.name.cyan(),
            field(state, "value")
        )),
        ResourceOutcome::Existing(state) => Some(format!(
            "Using existing {} record for {} -> {}",
            field(state, "record_type"),
            state.name.cyan(),
            field(state, "value")
        )),
        ResourceOutcome::AlreadyExists { name, .. } => {
            Some(format!("Record for {} already exists.", name).yellow().to_string())
        }
        ResourceOutcome::Deleted(_) => None,
    }
}

/// One line per record in a stage output
pub fn print_records(output: Option<&StageOutput>) {
    let Some(output) = output else {
        return;
    };
    for line in output.resources.iter().filter_map(record_line) {
        println!("{}", line);
    }
}

pub fn print_container(state: &ResourceState) {
    println!(
        "Container {} created, public URL: {}",
        state.name.cyan(),
        field(state, "public_url")
    );
}

/// Plain listing row, columns depend on the kind
pub fn listing_line(state: &ResourceState) -> String {
    let extra = match state.kind() {
        ResourceKind::Server => format!("{} {}", field(state, "ipv4"), field(state, "ipv6")),
        ResourceKind::Image => format!("from {}", field(state, "source_server_id")),
        ResourceKind::Container => field(state, "public_url"),
        ResourceKind::Object => format!("in {}", field(state, "container")),
        ResourceKind::Zone => field(state, "domain"),
        ResourceKind::Record => format!(
            "{} {}",
            field(state, "record_type"),
            field(state, "value")
        ),
    };
    format!("{:<36}  {:<24}  {:<8}  {}", state.id, state.name, state.status, extra)
        .trim_end()
        .to_string()
}

/// Report everything that went wrong and turn a failed run into an error
pub fn finish(result: &WorkflowResult) -> anyhow::Result<()> {
    for report in result.cleanup_errors() {
        eprintln!(
            "{} {}: {}",
            "warning:".yellow().bold(),
            report.stage_id,
            report.error.as_deref().unwrap_or("failed")
        );
    }

    match result.status() {
        WorkflowStatus::Completed => {
            eprintln!("{} in {:.1}s", "Completed".green(), result.duration().as_secs_f64());
            Ok(())
        }
        WorkflowStatus::CompletedWithCleanupErrors => {
            eprintln!(
                "{} in {:.1}s",
                "Completed with cleanup errors".yellow(),
                result.duration().as_secs_f64()
            );
            Ok(())
        }
        WorkflowStatus::Failed => {
            let Some(failure) = result.failure() else {
                anyhow::bail!("workflow failed");
            };
            eprintln!(
                "{} stage '{}': {}",
                "Failed at".red().bold(),
                failure.stage_id,
                failure.error
            );
            if let Some(state) = failure.error.last_state() {
                eprintln!("  last seen: {} {} ({})", state.kind(), state.name, state.status);
            }
            for cleanup in &failure.cleanups {
                match &cleanup.error {
                    None => eprintln!(
                        "  {} {} ({})",
                        "cleaned up".green(),
                        cleanup.stage_id,
                        cleanup.description
                    ),
                    Some(err) => eprintln!(
                        "  {} {} ({}): {}",
                        "cleanup failed".red(),
                        cleanup.stage_id,
                        cleanup.description,
                        err
                    ),
                }
            }
            for handle in &failure.orphaned {
                eprintln!("  {} {}", "left behind:".yellow(), handle);
            }
            anyhow::bail!("workflow failed at stage '{}'", failure.stage_id)
        }
    }
}
