//! Completion of recurring chores.
//!
//! A recurring task is a single row that keeps rolling its due date forward:
//! completing it moves `due_date` to the next occurrence and resets the
//! completion state, until the next occurrence would fall after the
//! recurrence end date.

use chrono::{DateTime, Duration, Months, Utc};

use crate::models::{RecurrencePattern, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recurrence {
    pub pattern: RecurrencePattern,
    pub interval: u32,
    pub end_date: Option<DateTime<Utc>>,
}

impl Recurrence {
    /// The recurrence in effect for `task`, if any.
    pub fn of(task: &Task) -> Option<Self> {
        if !task.is_recurring {
            return None;
        }
        let pattern = task.recurrence_pattern?;
        let interval = task
            .recurrence_interval
            .and_then(|i| u32::try_from(i).ok())
            .filter(|i| *i > 0)
            .unwrap_or(1);
        Some(Self {
            pattern,
            interval,
            end_date: task.recurrence_end_date,
        })
    }

    /// Advances `due` by one step. Month and year steps clamp to the last
    /// day of the target month (Jan 31 + 1 month = Feb 28/29).
    pub fn next_after(&self, due: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.pattern {
            RecurrencePattern::Daily => due.checked_add_signed(Duration::days(self.interval.into())),
            RecurrencePattern::Weekly => {
                due.checked_add_signed(Duration::days(i64::from(self.interval) * 7))
            }
            RecurrencePattern::Monthly => due.checked_add_months(Months::new(self.interval)),
            RecurrencePattern::Yearly => due.checked_add_months(Months::new(
                self.interval.checked_mul(12)?,
            )),
        }
    }

    /// Next due date if it is still inside the recurrence window.
    pub fn roll_forward(&self, due: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self.next_after(due)?;
        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }
}

/// Applies an `is_completed` change to `task`.
///
/// Completing a task that has no completion timestamp stamps `now`, then a
/// recurring task with a due date is rolled forward instead of staying done.
/// Un-completing always clears the timestamp.
pub fn set_completed(task: &mut Task, completed: bool, now: DateTime<Utc>) {
    task.is_completed = completed;

    if !completed {
        task.completed_at = None;
        return;
    }
    if task.completed_at.is_some() {
        return;
    }

    task.completed_at = Some(now);

    let next = Recurrence::of(task)
        .zip(task.due_date)
        .and_then(|(rule, due)| rule.roll_forward(due));

    if let Some(next) = next {
        tracing::debug!(task_id = task.id, next_due = %next, "rolling recurring task forward");
        task.due_date = Some(next);
        task.is_completed = false;
        task.completed_at = None;
    }
}
