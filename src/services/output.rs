use crate::domain::models::{ErrorBody, JsonErr, JsonOut, RestorationGuide, RunReport};
use serde::Serialize;

/// Prints `data` inside the `{"ok", "data"}` envelope, or as text via `text`.
pub fn print_one<T: Serialize>(
    json: bool,
    ok: bool,
    data: T,
    text: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok, data })?
        );
    } else {
        println!("{}", text(&data));
    }
    Ok(())
}

/// JSON failures go to stdout with a stable code; text failures to stderr.
pub fn print_error(json: bool, code: &str, message: &str) {
    if json {
        let body = JsonErr {
            ok: false,
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        };
        match serde_json::to_string_pretty(&body) {
            Ok(s) => println!("{s}"),
            Err(_) => eprintln!("error: {message}"),
        }
    } else {
        eprintln!("error: {message}");
    }
}

pub fn report_text(report: &RunReport) -> String {
    let mut lines = Vec::new();
    if let Some(variant) = report.variant {
        lines.push(format!("layout: {variant}"));
    }
    for s in &report.steps {
        lines.push(format!("{:<8} {:<22} {}", s.status.label(), s.name, s.message));
    }
    lines.push(format!("result: {:?}", report.final_state).to_lowercase());
    if !report.next_steps.is_empty() {
        lines.push(String::new());
        lines.push("next steps:".to_string());
        lines.extend(report.next_steps.iter().map(|n| format!("  - {n}")));
    }
    lines.join("\n")
}

pub fn guide_text(guide: &RestorationGuide) -> String {
    let mut lines = vec!["automatic uninstall is not supported; restore by hand:".to_string()];
    if let Some(dir) = &guide.backup_dir {
        lines.push(format!("newest backup run: {}", dir.display()));
    }
    lines.extend(
        guide
            .instructions
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{:>2}. {step}", i + 1)),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        FailurePolicy, InstallState, RunOutcome, StepRecord, StepStatus, TargetVariant,
    };

    #[test]
    fn report_text_lists_steps_and_next_steps() {
        let report = RunReport {
            outcome: RunOutcome::Done,
            final_state: InstallState::Done,
            variant: Some(TargetVariant::SettingsView),
            backup_dir: None,
            backups: Vec::new(),
            steps: vec![StepRecord {
                name: "register-route".to_string(),
                stage: InstallState::PatchingRegistries,
                policy: FailurePolicy::SkipIfMissing,
                status: StepStatus::Skipped,
                message: "not used".to_string(),
            }],
            next_steps: vec!["open settings".to_string()],
        };

        let text = report_text(&report);
        assert!(text.starts_with("layout: settings-view\n"));
        assert!(text.contains("skipped  register-route"));
        assert!(text.contains("result: done"));
        assert!(text.ends_with("  - open settings"));
    }
}
