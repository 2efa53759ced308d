//! Recurring rule engine
//!
//! Materializes due transactions from repeat rules. The catch-up walk is
//! deliberately lossy: however long the app was closed, a rule generates at
//! most one transaction per run, dated at the most recent due occurrence, and
//! the schedule pointer moves to the first strictly-future occurrence. Earlier
//! missed occurrences are discarded so a device that was off for months does
//! not flood the log on relaunch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::Mutex;

use crate::db::{
    AnnualTransactionRepository, Database, LibSqlAnnualTransactionRepository,
    LibSqlRecurringRuleRepository, LibSqlTransactionRepository, RecurringRuleRepository,
    TransactionRepository,
};
use crate::error::Result;
use crate::models::{AnnualTransaction, Frequency, RecurringRule, Transaction};
use crate::util::{local_naive_to_millis, millis_to_local_naive, unix_timestamp_millis};

/// Compute the occurrence following `after` for a rule's schedule.
///
/// Monthly and yearly steps clamp the day to the target month's length, so a
/// rule anchored to day 31 lands on Feb 28 (29 in a leap year) and stays
/// aligned to month ends rather than drifting.
#[must_use]
pub fn next_occurrence(after: NaiveDateTime, rule: &RecurringRule) -> NaiveDateTime {
    match rule.frequency {
        Frequency::Daily => after + Duration::days(1),
        Frequency::Weekly => after + Duration::days(7),
        Frequency::Monthly => {
            let (year, month) = if after.month() == 12 {
                (after.year() + 1, 1)
            } else {
                (after.year(), after.month() + 1)
            };
            let day = rule.day_of_month.unwrap_or_else(|| after.day());
            date_with_clamped_day(year, month, day).and_time(after.time())
        }
        Frequency::Yearly => {
            let year = after.year() + 1;
            let month = rule.month_of_year.unwrap_or_else(|| after.month());
            let day = rule.day_of_month.unwrap_or_else(|| after.day());
            date_with_clamped_day(year, month, day).and_time(after.time())
        }
    }
}

fn date_with_clamped_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let month = month.clamp(1, 12);
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

/// Result of collapsing a rule's overdue occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUp {
    /// The most recent occurrence at or before now, the one to generate
    pub occurrence: NaiveDateTime,
    /// The first occurrence strictly after now, the new schedule pointer
    pub next_due: NaiveDateTime,
}

/// Walk the schedule from `start` until it passes `now`.
#[must_use]
pub fn catch_up(start: NaiveDateTime, now: NaiveDateTime, rule: &RecurringRule) -> CatchUp {
    let mut current = start;
    let mut occurrence = start;

    while current <= now {
        occurrence = current;
        let next = next_occurrence(current, rule);
        if next <= current {
            // schedule failed to advance; bail out rather than spin
            break;
        }
        current = next;
    }

    CatchUp {
        occurrence,
        next_due: current,
    }
}

fn noon_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// One rule's failure during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    pub rule_id: String,
    pub message: String,
}

/// Outcome of one `run_due_rules` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Transactions generated (one per processed rule)
    pub generated: usize,
    /// Rules that failed; never aborts sibling rules
    pub failures: Vec<RuleFailure>,
}

/// Runs due recurring rules against the record store.
///
/// Invoked on launch and on regaining foreground visibility; overlapping
/// invocations are dropped, not queued.
pub struct RecurringRunner {
    db: Arc<Mutex<Database>>,
    running: AtomicBool,
}

impl RecurringRunner {
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            running: AtomicBool::new(false),
        }
    }

    /// Process every due rule, generating at most one transaction per rule.
    pub async fn run_due_rules(&self) -> RunReport {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Recurring run already in progress, dropping trigger");
            return RunReport::default();
        }

        let report = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);
        report
    }

    async fn run_inner(&self) -> RunReport {
        let now_ms = unix_timestamp_millis();

        let due = {
            let db = self.db.lock().await;
            let rules = LibSqlRecurringRuleRepository::new(db.connection());
            match rules.list_due(now_ms).await {
                Ok(due) => due,
                Err(error) => {
                    tracing::warn!("Failed to query due recurring rules: {error}");
                    return RunReport::default();
                }
            }
        };

        let mut report = RunReport::default();
        for rule in due {
            match self.process_rule(&rule, now_ms).await {
                Ok(()) => report.generated += 1,
                Err(error) => {
                    tracing::warn!("Recurring rule {} failed: {error}", rule.id);
                    report.failures.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }

        if report.generated > 0 {
            tracing::info!("Generated {} recurring transaction(s)", report.generated);
        }
        report
    }

    async fn process_rule(&self, rule: &RecurringRule, now_ms: i64) -> Result<()> {
        let plan = catch_up(
            millis_to_local_naive(rule.next_generation_at),
            millis_to_local_naive(now_ms),
            rule,
        );
        let occurrence_ms = local_naive_to_millis(noon_of(plan.occurrence.date()));

        let db = self.db.lock().await;

        if rule.is_annual {
            let repo = LibSqlAnnualTransactionRepository::new(db.connection());
            repo.create(AnnualTransaction::new(
                occurrence_ms,
                rule.amount,
                rule.is_income,
                rule.category_id.clone(),
                rule.description.clone(),
            ))
            .await?;
        } else {
            let repo = LibSqlTransactionRepository::new(db.connection());
            repo.create(Transaction::new(
                occurrence_ms,
                rule.amount,
                rule.is_income,
                rule.category_id.clone(),
                rule.description.clone(),
            ))
            .await?;
        }

        let mut advanced = rule.clone();
        advanced.next_generation_at = local_naive_to_millis(plan.next_due);
        advanced.last_generated_at = Some(now_ms);
        LibSqlRecurringRuleRepository::new(db.connection())
            .update(&advanced)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule_with(frequency: Frequency) -> RecurringRule {
        RecurringRule::new(1200, false, false, None, "Rent", frequency, 0)
    }

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
    }

    #[test]
    fn daily_and_weekly_steps_are_fixed() {
        let daily = rule_with(Frequency::Daily);
        assert_eq!(next_occurrence(at(2024, 3, 14), &daily), at(2024, 3, 15));

        let weekly = rule_with(Frequency::Weekly);
        assert_eq!(next_occurrence(at(2024, 3, 14), &weekly), at(2024, 3, 21));
    }

    #[test]
    fn monthly_clamps_day_31_into_february() {
        let mut rule = rule_with(Frequency::Monthly);
        rule.day_of_month = Some(31);

        let from_january = next_occurrence(at(2023, 1, 31), &rule);
        assert_eq!(from_january, at(2023, 2, 28));

        let leap_year = next_occurrence(at(2024, 1, 31), &rule);
        assert_eq!(leap_year, at(2024, 2, 29));

        // and snaps back out to the anchor when the month allows it
        let from_february = next_occurrence(at(2023, 2, 28), &rule);
        assert_eq!(from_february, at(2023, 3, 31));
    }

    #[test]
    fn monthly_without_anchor_clamps_to_current_day() {
        let rule = rule_with(Frequency::Monthly);
        assert_eq!(next_occurrence(at(2023, 1, 31), &rule), at(2023, 2, 28));
        assert_eq!(next_occurrence(at(2023, 4, 15), &rule), at(2023, 5, 15));
    }

    #[test]
    fn yearly_snaps_to_month_anchor_then_clamps_day() {
        let mut rule = rule_with(Frequency::Yearly);
        rule.month_of_year = Some(2);
        rule.day_of_month = Some(31);

        assert_eq!(next_occurrence(at(2023, 2, 28), &rule), at(2024, 2, 29));
        assert_eq!(next_occurrence(at(2024, 2, 29), &rule), at(2025, 2, 28));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let rule = rule_with(Frequency::Monthly);
        assert_eq!(next_occurrence(at(2023, 12, 15), &rule), at(2024, 1, 15));
    }

    #[test]
    fn catch_up_collapses_long_gap_to_single_occurrence() {
        let rule = rule_with(Frequency::Daily);
        let start = at(2024, 1, 1);
        let now = start + Duration::days(40) + Duration::hours(3);

        let plan = catch_up(start, now, &rule);

        // most recent due occurrence, not 40 separate ones
        assert_eq!(plan.occurrence, at(2024, 2, 10));
        assert!(plan.next_due > now);
        assert_eq!(plan.next_due, at(2024, 2, 11));
    }

    #[test]
    fn catch_up_keeps_exact_due_time() {
        let rule = rule_with(Frequency::Weekly);
        let start = at(2024, 3, 7);

        // due exactly now: generate for now, schedule one step ahead
        let plan = catch_up(start, start, &rule);
        assert_eq!(plan.occurrence, start);
        assert_eq!(plan.next_due, at(2024, 3, 14));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_generates_one_transaction_for_stale_daily_rule() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().await.unwrap()));
        let now_ms = unix_timestamp_millis();
        let forty_days_ms = 40 * 24 * 60 * 60 * 1000;

        let mut rule = RecurringRule::new(
            999,
            false,
            false,
            None,
            "Stale daily",
            Frequency::Daily,
            now_ms - forty_days_ms,
        );
        rule.day_of_month = None;
        {
            let guard = db.lock().await;
            LibSqlRecurringRuleRepository::new(guard.connection())
                .create(rule.clone())
                .await
                .unwrap();
        }

        let runner = RecurringRunner::new(Arc::clone(&db));
        let report = runner.run_due_rules().await;
        assert_eq!(report.generated, 1);
        assert!(report.failures.is_empty());

        let guard = db.lock().await;
        let generated = LibSqlTransactionRepository::new(guard.connection())
            .list_active()
            .await
            .unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].amount, 999);
        // dated within the last day
        assert!(now_ms - generated[0].transacted_at < 24 * 60 * 60 * 1000 + 12 * 60 * 60 * 1000);

        let advanced = LibSqlRecurringRuleRepository::new(guard.connection())
            .get(&rule.id)
            .await
            .unwrap()
            .unwrap();
        assert!(advanced.next_generation_at > now_ms);
        assert_eq!(advanced.last_generated_at, Some(now_ms));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_routes_annual_rules_to_annual_collection() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().await.unwrap()));
        let now_ms = unix_timestamp_millis();

        let rule = RecurringRule::new(
            5000,
            false,
            true,
            None,
            "Insurance",
            Frequency::Yearly,
            now_ms - 1000,
        );
        {
            let guard = db.lock().await;
            LibSqlRecurringRuleRepository::new(guard.connection())
                .create(rule)
                .await
                .unwrap();
        }

        let report = RecurringRunner::new(Arc::clone(&db)).run_due_rules().await;
        assert_eq!(report.generated, 1);

        let guard = db.lock().await;
        let annual = LibSqlAnnualTransactionRepository::new(guard.connection())
            .list_active()
            .await
            .unwrap();
        assert_eq!(annual.len(), 1);
        assert_eq!(annual[0].description, "Insurance");
        assert!(LibSqlTransactionRepository::new(guard.connection())
            .list_active()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runner_ignores_future_and_inactive_rules() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().await.unwrap()));
        let now_ms = unix_timestamp_millis();

        let future = RecurringRule::new(
            100,
            false,
            false,
            None,
            "Future",
            Frequency::Daily,
            now_ms + 60_000,
        );
        let mut paused = RecurringRule::new(
            100,
            false,
            false,
            None,
            "Paused",
            Frequency::Daily,
            now_ms - 60_000,
        );
        paused.is_active = false;
        {
            let guard = db.lock().await;
            let repo = LibSqlRecurringRuleRepository::new(guard.connection());
            repo.put_many(&[future, paused]).await.unwrap();
        }

        let report = RecurringRunner::new(Arc::clone(&db)).run_due_rules().await;
        assert_eq!(report.generated, 0);
    }
}
