use crate::domain::model::{Notification, ObservationSnapshot, Subject};
use chrono::{DateTime, Local};

pub fn timestamp(now: DateTime<Local>) -> String {
    format!("[{}]", now.format("%Y-%m-%d %H:%M:%S"))
}

/// 整數不顯示小數點
fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

pub fn render(snapshot: &ObservationSnapshot) -> String {
    let mut out = format!("[{}]\n", snapshot.display_name);

    for item in &snapshot.items {
        out.push_str(&format!(
            "{}\t{}[{}]\n",
            number(item.score),
            item.course,
            number(item.credit)
        ));
    }

    match snapshot.weighted_mean {
        Some(mean) => out.push_str(&format!("Weighted average: {:.2}\n", mean)),
        None => out.push_str("Weighted average: n/a (total credit is zero)\n"),
    }

    if let Some(gpa) = snapshot.gpa {
        out.push_str(&format!("Current GPA: {:.2}\n", gpa));
    }

    out
}

pub fn notification(
    subject: &Subject,
    snapshot: &ObservationSnapshot,
    now: DateTime<Local>,
) -> Notification {
    Notification {
        subject_id: subject.id.clone(),
        recipient: subject.recipient.clone(),
        title: timestamp(now),
        body: render(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Credential, GradedItem};
    use chrono::TimeZone;

    fn snapshot(weighted_mean: Option<f64>, gpa: Option<f64>) -> ObservationSnapshot {
        ObservationSnapshot {
            display_name: "Alice".to_string(),
            items: vec![
                GradedItem {
                    score: 90.0,
                    credit: 3.0,
                    course: "Compilers".to_string(),
                    grade_point: Some(4.0),
                },
                GradedItem {
                    score: 80.0,
                    credit: 2.5,
                    course: "Databases".to_string(),
                    grade_point: Some(3.0),
                },
            ],
            weighted_mean,
            gpa,
            signature: String::new(),
        }
    }

    #[test]
    fn test_render_report() {
        let text = render(&snapshot(Some(86.0), Some(3.6)));
        assert_eq!(
            text,
            "[Alice]\n90\tCompilers[3]\n80\tDatabases[2.5]\nWeighted average: 86.00\nCurrent GPA: 3.60\n"
        );
    }

    #[test]
    fn test_render_undefined_average() {
        let text = render(&snapshot(None, None));
        assert!(text.contains("Weighted average: n/a"));
        assert!(!text.contains("NaN"));
        assert!(!text.contains("GPA"));
    }

    #[test]
    fn test_notification_carries_recipient_and_timestamp() {
        let subject = Subject {
            id: "0000000001".to_string(),
            credential: Credential::Inline("JSESSIONID=abc".to_string()),
            recipient: Some("alice".to_string()),
        };
        let now = Local.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();

        let n = notification(&subject, &snapshot(Some(86.0), None), now);
        assert_eq!(n.title, "[2026-10-19 08:30:00]");
        assert_eq!(n.recipient.as_deref(), Some("alice"));
        assert!(n.text().starts_with("[2026-10-19 08:30:00]\n[Alice]\n"));
    }
}
