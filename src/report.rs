use crate::error::Result;
use crate::results::{TestResult, ThresholdPoint};
use crate::step::{Ear, ResponseStatus, TestType};
use chrono::Duration;
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    step_id: usize,
    frequency: u32,
    ear: &'a str,
    test_type: &'a str,
    level: Option<i32>,
    status: &'a str,
    confirmed: bool,
}

/// Write one CSV row per threshold, in protocol order
pub fn write_csv<W: Write>(result: &TestResult, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for point in &result.thresholds {
        let ear = point.ear.to_string();
        let test_type = point.test_type.to_string();
        let status = point.status.to_string();
        wtr.serialize(CsvRow {
            step_id: point.step_id,
            frequency: point.frequency,
            ear: &ear,
            test_type: &test_type,
            level: point.level,
            status: &status,
            confirmed: point.confirmed,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

fn cell(point: &ThresholdPoint) -> String {
    match (point.status, point.level) {
        (ResponseStatus::Threshold, Some(level)) if point.confirmed => level.to_string(),
        (ResponseStatus::Threshold, Some(level)) => format!("{}?", level),
        (ResponseStatus::NoResponse, Some(level)) => format!("NR{}", level),
        _ => "--".to_string(),
    }
}

/// "1m 05s" style duration
pub fn format_duration(ms: u64) -> String {
    let d = Duration::milliseconds(ms.min(i64::MAX as u64) as i64);
    let minutes = d.num_minutes();
    let seconds = d.num_seconds() - minutes * 60;
    if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Plain-text audiogram: one row per ear and conduction path, columns in
/// protocol order so the 1000 Hz retest shows up next to its neighbours.
///
/// `20?` marks a best-effort level that never met 2-of-3, `NR90` no response
/// up to 90 dB HL, `--` a point that was never tested.
pub fn render_table(result: &TestResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Patient {}  session {}\n",
        result.patient_id, result.session_id
    ));
    out.push_str(&format!(
        "Tested {}  duration {}\n",
        result.timestamp.format("%Y-%m-%d %H:%M"),
        format_duration(result.test_duration_ms)
    ));

    let rows = result
        .thresholds
        .iter()
        .into_group_map_by(|p| (p.ear, p.test_type));

    for key in [
        (Ear::Right, TestType::Air),
        (Ear::Right, TestType::Bone),
        (Ear::Left, TestType::Air),
        (Ear::Left, TestType::Bone),
    ] {
        let Some(points) = rows.get(&key) else {
            continue;
        };
        let header = points
            .iter()
            .map(|p| format!("{:>6}", p.frequency))
            .join("");
        let values = points.iter().map(|p| format!("{:>6}", cell(p))).join("");
        out.push('\n');
        out.push_str(&format!("{:<11}{}\n", format!("{} {}", key.0, key.1), header));
        out.push_str(&format!("{:<11}{}\n", "dB HL", values));
    }

    out.push('\n');
    if result.technical_errors.is_empty() {
        out.push_str("No technical errors\n");
    } else {
        out.push_str("Technical errors:\n");
        for err in &result.technical_errors {
            out.push_str(&format!("  - {}\n", err));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn point(step_id: usize, frequency: u32, level: Option<i32>, status: ResponseStatus, confirmed: bool) -> ThresholdPoint {
        ThresholdPoint {
            step_id,
            frequency,
            ear: Ear::Right,
            test_type: TestType::Air,
            level,
            status,
            confirmed,
        }
    }

    fn result() -> TestResult {
        TestResult {
            session_id: "s1".to_string(),
            patient_id: "p1".to_string(),
            timestamp: Local::now(),
            thresholds: vec![
                point(0, 1000, Some(20), ResponseStatus::Threshold, true),
                point(1, 2000, Some(30), ResponseStatus::Threshold, false),
                point(2, 4000, Some(120), ResponseStatus::NoResponse, false),
                point(3, 8000, None, ResponseStatus::NotTested, false),
            ],
            test_duration_ms: 65_000,
            technical_errors: vec!["Skipped frequency: 8000 Hz right air".to_string()],
        }
    }

    #[test]
    fn csv_has_header_and_rows() {
        let mut buf = Vec::new();
        write_csv(&result(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "step_id,frequency,ear,test_type,level,status,confirmed"
        );
        assert_eq!(lines[1], "0,1000,right,air,20,threshold,true");
        assert_eq!(lines[3], "2,4000,right,air,120,no_response,false");
        assert_eq!(lines[4], "3,8000,right,air,,not_tested,false");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn table_marks_status() {
        let table = render_table(&result());
        assert!(table.contains("right air"));
        assert!(table.contains("30?"));
        assert!(table.contains("NR120"));
        assert!(table.contains("--"));
        assert!(table.contains("duration 1m 05s"));
        assert!(table.contains("Skipped frequency"));
        assert!(!table.contains("left"));
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59_999), "59s");
        assert_eq!(format_duration(600_000), "10m 00s");
    }
}
