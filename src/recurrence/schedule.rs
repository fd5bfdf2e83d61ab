//! Next-due computation for recurring templates.
//!
//! All arithmetic happens in the template's fixed-offset timezone, then
//! converts back to an absolute UTC instant for storage. Time-of-day is
//! carried over from the cursor. Monthly steps are anchored to the
//! configured day-of-month (falling back to the initial due date's day) and
//! clamp to the target month's last day, so Jan 31 → Feb 28/29 → Mar 31.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};

use crate::model::{RecurrenceKind, RecurringTemplate};

fn tz_of(template: &RecurringTemplate) -> FixedOffset {
    FixedOffset::east_opt(template.tz_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Add `months` to a local datetime, clamping the anchored day-of-month to
/// the target month's length.
fn add_months_clamped(
    local: DateTime<FixedOffset>,
    months: u32,
    anchor_day: u32,
) -> Option<DateTime<FixedOffset>> {
    let total = local.year() * 12 + local.month0() as i32 + months as i32;
    let (year, month) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
    let day = anchor_day.min(days_in_month(year, month));
    local
        .timezone()
        .with_ymd_and_hms(
            year,
            month,
            day,
            local.hour(),
            local.minute(),
            local.second(),
        )
        .single()
}

/// Next date after the cursor whose weekday is in the set: first a match
/// later in the cursor's own Mon–Sun week, otherwise the first set weekday
/// of the week `interval` weeks ahead.
fn next_weekly(
    local: DateTime<FixedOffset>,
    interval: u32,
    weekdays: &[u8],
) -> Option<DateTime<FixedOffset>> {
    if weekdays.is_empty() {
        return local.checked_add_signed(Duration::weeks(interval as i64));
    }
    let mut set: Vec<u8> = weekdays.to_vec();
    set.sort_unstable();
    set.dedup();

    let dow = local.weekday().number_from_monday() as u8; // 1 = Mon .. 7 = Sun
    for offset in 1..=(7 - dow) {
        if set.contains(&(dow + offset)) {
            return local.checked_add_signed(Duration::days(offset as i64));
        }
    }
    // Set exhausted for this week — jump `interval` weeks to its first day.
    let week_start = local.checked_add_signed(Duration::days(-((dow - 1) as i64)))?;
    let target_week = week_start.checked_add_signed(Duration::weeks(interval as i64))?;
    target_week.checked_add_signed(Duration::days((set[0] - 1) as i64))
}

/// Anchor day for monthly-style steps: explicit param, else the initial due
/// date's local day-of-month.
fn anchor_day(template: &RecurringTemplate) -> u32 {
    template
        .params
        .day_of_month
        .map(|d| d as u32)
        .unwrap_or_else(|| template.initial_due.with_timezone(&tz_of(template)).day())
}

/// The due instant following `cursor` (the previous instance's due time).
/// Returns `None` only when the calendar arithmetic cannot produce a valid
/// date, which a tick logs and skips.
pub fn advance(template: &RecurringTemplate, cursor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let tz = tz_of(template);
    let local = cursor.with_timezone(&tz);
    let interval = template.params.interval();

    let next_local = match template.kind {
        RecurrenceKind::Daily => local.checked_add_signed(Duration::days(interval as i64)),
        RecurrenceKind::Weekly => next_weekly(local, interval, &template.params.weekdays),
        RecurrenceKind::Monthly => add_months_clamped(local, interval, anchor_day(template)),
        RecurrenceKind::Quarterly => add_months_clamped(local, interval * 3, anchor_day(template)),
        RecurrenceKind::Custom => {
            // Evaluated by whichever parameters are present.
            if template.params.day_of_month.is_some() {
                add_months_clamped(local, interval, anchor_day(template))
            } else if !template.params.weekdays.is_empty() {
                next_weekly(local, interval, &template.params.weekdays)
            } else {
                local.checked_add_signed(Duration::days(interval as i64))
            }
        }
    };

    next_local.map(|dt| dt.with_timezone(&Utc))
}

/// The next instance this template owes: its initial due time when nothing
/// has been generated yet, otherwise one step past the cursor.
pub fn next_due(template: &RecurringTemplate) -> Option<DateTime<Utc>> {
    match template.last_generated_due {
        None => Some(template.initial_due),
        Some(cursor) => advance(template, cursor),
    }
}

/// The single due point a tick should materialize: the most recent due
/// point not after `now`. `None` when nothing is due yet. A scheduler that
/// was down for many periods gets exactly one catch-up instance here —
/// missed intermediates are never backfilled.
pub fn latest_due_not_after(
    template: &RecurringTemplate,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut due = next_due(template)?;
    if due > now {
        return None;
    }
    while let Some(next) = advance(template, due) {
        if next > now {
            break;
        }
        due = next;
    }
    Some(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RecurrenceParams, RecurringTemplate};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn template(kind: RecurrenceKind, params: RecurrenceParams, initial: DateTime<Utc>) -> RecurringTemplate {
        RecurringTemplate::new(
            "g1",
            "standup notes",
            "alice",
            kind,
            params,
            initial,
            0,
            BTreeSet::new(),
            None,
            initial,
        )
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn daily_steps_by_interval_days() {
        let tpl = template(
            RecurrenceKind::Daily,
            RecurrenceParams {
                interval: 3,
                ..Default::default()
            },
            utc(2025, 1, 1, 9),
        );
        assert_eq!(advance(&tpl, utc(2025, 1, 1, 9)), Some(utc(2025, 1, 4, 9)));
    }

    #[test]
    fn monthly_clamps_to_end_of_month_and_recovers() {
        let tpl = template(
            RecurrenceKind::Monthly,
            RecurrenceParams {
                interval: 1,
                day_of_month: Some(31),
                ..Default::default()
            },
            utc(2025, 1, 31, 10),
        );
        // Jan 31 → Feb 28 (2025 is not a leap year)
        let feb = advance(&tpl, utc(2025, 1, 31, 10)).unwrap();
        assert_eq!(feb, utc(2025, 2, 28, 10));
        // Feb 28 → Mar 31 (anchor day restores)
        let mar = advance(&tpl, feb).unwrap();
        assert_eq!(mar, utc(2025, 3, 31, 10));
        // Mar 31 → Apr 30
        let apr = advance(&tpl, mar).unwrap();
        assert_eq!(apr, utc(2025, 4, 30, 10));
    }

    #[test]
    fn monthly_leap_february() {
        let tpl = template(
            RecurrenceKind::Monthly,
            RecurrenceParams {
                interval: 1,
                day_of_month: Some(31),
                ..Default::default()
            },
            utc(2024, 1, 31, 8),
        );
        assert_eq!(
            advance(&tpl, utc(2024, 1, 31, 8)),
            Some(utc(2024, 2, 29, 8))
        );
    }

    #[test]
    fn monthly_anchor_falls_back_to_initial_day() {
        let tpl = template(
            RecurrenceKind::Monthly,
            RecurrenceParams {
                interval: 1,
                ..Default::default()
            },
            utc(2025, 1, 31, 10),
        );
        let feb = advance(&tpl, utc(2025, 1, 31, 10)).unwrap();
        assert_eq!(feb, utc(2025, 2, 28, 10));
        assert_eq!(advance(&tpl, feb), Some(utc(2025, 3, 31, 10)));
    }

    #[test]
    fn quarterly_is_three_months_per_interval() {
        let tpl = template(
            RecurrenceKind::Quarterly,
            RecurrenceParams {
                interval: 1,
                day_of_month: Some(15),
                ..Default::default()
            },
            utc(2025, 1, 15, 9),
        );
        assert_eq!(
            advance(&tpl, utc(2025, 1, 15, 9)),
            Some(utc(2025, 4, 15, 9))
        );
    }

    #[test]
    fn weekly_picks_next_weekday_in_set() {
        // Mon + Thu, weekly. Cursor Mon Jun 2 2025 → Thu Jun 5.
        let tpl = template(
            RecurrenceKind::Weekly,
            RecurrenceParams {
                interval: 1,
                weekdays: vec![1, 4],
                ..Default::default()
            },
            utc(2025, 6, 2, 9),
        );
        let thu = advance(&tpl, utc(2025, 6, 2, 9)).unwrap();
        assert_eq!(thu, utc(2025, 6, 5, 9));
        // Thu → next Monday (set wraps into the following week).
        assert_eq!(advance(&tpl, thu), Some(utc(2025, 6, 9, 9)));
    }

    #[test]
    fn weekly_wrap_honors_interval() {
        // Only Mondays, every 2 weeks. Cursor Mon Jun 2 → Mon Jun 16.
        let tpl = template(
            RecurrenceKind::Weekly,
            RecurrenceParams {
                interval: 2,
                weekdays: vec![1],
                ..Default::default()
            },
            utc(2025, 6, 2, 9),
        );
        assert_eq!(
            advance(&tpl, utc(2025, 6, 2, 9)),
            Some(utc(2025, 6, 16, 9))
        );
    }

    #[test]
    fn weekly_empty_set_behaves_like_interval_weeks() {
        let tpl = template(
            RecurrenceKind::Weekly,
            RecurrenceParams {
                interval: 2,
                ..Default::default()
            },
            utc(2025, 6, 2, 9),
        );
        assert_eq!(
            advance(&tpl, utc(2025, 6, 2, 9)),
            Some(utc(2025, 6, 16, 9))
        );
    }

    #[test]
    fn custom_dispatches_on_present_params() {
        // day_of_month present → monthly rules.
        let monthly = template(
            RecurrenceKind::Custom,
            RecurrenceParams {
                interval: 2,
                day_of_month: Some(10),
                ..Default::default()
            },
            utc(2025, 1, 10, 9),
        );
        assert_eq!(
            advance(&monthly, utc(2025, 1, 10, 9)),
            Some(utc(2025, 3, 10, 9))
        );

        // weekdays present → weekly rules.
        let weekly = template(
            RecurrenceKind::Custom,
            RecurrenceParams {
                interval: 1,
                weekdays: vec![5],
                ..Default::default()
            },
            utc(2025, 6, 2, 9),
        );
        assert_eq!(
            advance(&weekly, utc(2025, 6, 2, 9)),
            Some(utc(2025, 6, 6, 9))
        );

        // neither → daily rules.
        let daily = template(
            RecurrenceKind::Custom,
            RecurrenceParams {
                interval: 5,
                ..Default::default()
            },
            utc(2025, 6, 2, 9),
        );
        assert_eq!(
            advance(&daily, utc(2025, 6, 2, 9)),
            Some(utc(2025, 6, 7, 9))
        );
    }

    #[test]
    fn timezone_offset_shifts_month_boundaries() {
        // 23:30 UTC on Jan 30 is already Jan 31 07:30 in UTC+8; the monthly
        // anchor must be taken in template-local time.
        let mut tpl = template(
            RecurrenceKind::Monthly,
            RecurrenceParams {
                interval: 1,
                ..Default::default()
            },
            Utc.with_ymd_and_hms(2025, 1, 30, 23, 30, 0).unwrap(),
        );
        tpl.tz_offset_minutes = 8 * 60;
        // Local anchor day is 31 → next local due Feb 28 07:30 (+08:00),
        // which is Feb 27 23:30 UTC.
        assert_eq!(
            advance(&tpl, tpl.initial_due),
            Some(Utc.with_ymd_and_hms(2025, 2, 27, 23, 30, 0).unwrap())
        );
    }

    #[test]
    fn first_due_is_the_initial_due_itself() {
        let tpl = template(
            RecurrenceKind::Daily,
            RecurrenceParams::default(),
            utc(2025, 6, 1, 9),
        );
        assert_eq!(next_due(&tpl), Some(utc(2025, 6, 1, 9)));
    }

    #[test]
    fn catch_up_yields_single_most_recent_due_point() {
        let mut tpl = template(
            RecurrenceKind::Daily,
            RecurrenceParams::default(),
            utc(2025, 6, 1, 9),
        );
        tpl.last_generated_due = Some(utc(2025, 6, 1, 9));
        // Ten periods behind: only the most recent due point comes back.
        let now = utc(2025, 6, 11, 12);
        assert_eq!(latest_due_not_after(&tpl, now), Some(utc(2025, 6, 11, 9)));
        // Nothing due yet → None.
        assert_eq!(latest_due_not_after(&tpl, utc(2025, 6, 1, 10)), None);
    }
}
