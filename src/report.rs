use std::{fs::OpenOptions, io::BufWriter, path::Path};

use anyhow::Context;
use chrono::{DateTime, Local};
use log::info;
use serde::Serialize;

use crate::{applier::ApplyReport, planner::Plan};

#[derive(Serialize, Debug)]
struct Report<'a> {
    generated_at: DateTime<Local>,
    command: &'a str,
    applied: bool,
    plan: &'a Plan,
    result: Option<&'a ApplyReport>,
}

pub(crate) fn save_report(
    report_path: &Path,
    command: &str,
    plan: &Plan,
    result: Option<&ApplyReport>,
) -> anyhow::Result<()> {
    let report = Report {
        generated_at: Local::now(),
        command,
        applied: result.is_some(),
        plan,
        result,
    };

    let report_fd = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(report_path)
        .with_context(|| format!("while opening {:?}", report_path))?;
    let writer = BufWriter::new(report_fd);
    serde_json::to_writer_pretty(writer, &report)?;
    info!("Plan report written to {:?}", report_path);

    Ok(())
}
