use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use drmaa2::{JobInfo, JobTracker};
use log::warn;

use crate::{time_ext, Result};

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn format_time(value: Option<time::OffsetDateTime>) -> Result<Option<String>> {
    Ok(value.map(time_ext::format_local).transpose()?)
}

fn format_state(info: &JobInfo) -> String {
    if info.sub_state.is_empty() {
        info.state.to_string()
    } else {
        format!("{} ({})", info.state, info.sub_state)
    }
}

// The `Accessor` type and `accessor` function aid type inference. Without them the first closure determines the
// element type of the array and the other closures do not coerce to it.
type Accessor = fn(&JobInfo) -> Result<Option<String>>;

fn accessor(f: Accessor) -> Accessor {
    f
}

fn columns() -> [(&'static str, Accessor); 5] {
    [
        ("id", accessor(|info| Ok(Some(info.id.clone())))),
        ("state", accessor(|info| Ok(Some(format_state(info))))),
        ("submitted", accessor(|info| format_time(info.submission_time))),
        ("finished", accessor(|info| format_time(info.finish_time))),
        ("owner", accessor(|info| Ok(info.job_owner.clone()))),
    ]
}

/// Prints a table with one row per job of the session, newest first. Jobs that disappear while listing are
/// skipped.
pub fn list(tracker: &dyn JobTracker) -> Result<()> {
    let mut infos = Vec::new();
    for job_id in tracker.list_jobs()? {
        match tracker.job_info(&job_id) {
            Ok(info) => infos.push(info),
            Err(error) => warn!("skipping job {job_id:?}: {error}"),
        }
    }
    infos.sort_by(|a, b| a.submission_time.cmp(&b.submission_time).reverse());

    let (column_names, accessors): (Vec<_>, Vec<_>) = columns().into_iter().unzip();

    let mut table = table();
    table.set_header(
        column_names
            .into_iter()
            .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
    );

    for info in &infos {
        // Collect first, `Table::add_row` does not accept a Result.
        table.add_row(
            accessors
                .iter()
                .map(|f| f(info))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|value| value.unwrap_or_default()),
        );
    }

    println!("{table}");

    Ok(())
}

fn info_rows(info: &JobInfo) -> Result<Vec<(&'static str, String)>> {
    let time = |value: Option<time::OffsetDateTime>| -> Result<String> {
        Ok(format_time(value)?.unwrap_or_default())
    };
    Ok(vec![
        ("id", info.id.clone()),
        ("state", format_state(info)),
        (
            "exit status",
            info.exit_status
                .map(|status| status.to_string())
                .unwrap_or_default(),
        ),
        ("owner", info.job_owner.clone().unwrap_or_default()),
        ("namespace", info.queue_name.clone().unwrap_or_default()),
        ("submitted", time(info.submission_time)?),
        ("started", time(info.dispatch_time)?),
        ("finished", time(info.finish_time)?),
        (
            "wallclock time",
            info.wallclock_time
                .map(|duration| format!("{duration:?}"))
                .unwrap_or_default(),
        ),
    ])
}

/// Prints the job info record as a two column table.
pub fn info(tracker: &dyn JobTracker, job_id: &str) -> Result<()> {
    let info = tracker.job_info(job_id)?;

    let mut table = table();
    for (name, value) in info_rows(&info)? {
        table.add_row([Cell::new(name).add_attribute(Attribute::Bold), Cell::new(value)]);
    }

    println!("{table}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use drmaa2::JobState;
    use time::macros::datetime;

    use super::*;

    fn info() -> JobInfo {
        JobInfo {
            id: "nightly-00001".to_string(),
            state: JobState::Failed,
            sub_state: "BackoffLimitExceeded".to_string(),
            exit_status: Some(1),
            job_owner: Some("alice".to_string()),
            queue_name: Some("default".to_string()),
            submission_time: Some(datetime!(2024-05-01 10:00:00 UTC)),
            dispatch_time: None,
            finish_time: None,
            wallclock_time: Some(Duration::from_secs(90)),
        }
    }

    #[test]
    fn list_columns() {
        let info = info();
        let values: Vec<_> = columns()
            .iter()
            .map(|(_, f)| f(&info).unwrap())
            .collect();
        assert_eq!(values[0].as_deref(), Some("nightly-00001"));
        assert_eq!(values[1].as_deref(), Some("failed (BackoffLimitExceeded)"));
        assert!(values[2].is_some());
        assert_eq!(values[3], None);
        assert_eq!(values[4].as_deref(), Some("alice"));
    }

    #[test]
    fn info_table_rows() {
        let rows = info_rows(&info()).unwrap();
        let row = |name: &str| {
            rows.iter()
                .find(|(row, _)| *row == name)
                .map(|(_, value)| value.as_str())
                .unwrap()
        };
        assert_eq!(row("exit status"), "1");
        assert_eq!(row("namespace"), "default");
        assert_eq!(row("started"), "");
        assert_eq!(row("wallclock time"), "90s");
    }
}
