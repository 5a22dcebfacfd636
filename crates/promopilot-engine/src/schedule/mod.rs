//! The schedule tick: fires due window edges against the marketplace,
//! exactly once per edge.
//!
//! Every edge goes through the same sequence: fresh campaign re-read,
//! [`plan_outcome`] decision, optional marketplace call, guarded state
//! write, then a schedule-row update that settles the edge one way or
//! another. A tick leaves no edge in an ambiguous state: each due row ends
//! `executed` (taken, untaken, or moot), `failed` (retrying the same edge
//! next tick), or still due because the run deadline cut the batch short.

pub mod window;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::prelude::ToPrimitive;

use promopilot_core::campaign::{
    next_state, CampaignState, CampaignWindow, ScheduleAction, StateEvent, StateSource,
};
use promopilot_core::validate;
use promopilot_db::{self as db, CampaignRow, ScheduleRow};
use promopilot_market::types::ActivatePromotion;
use promopilot_market::MarketError;

use crate::error::EngineError;
use crate::schedule::window::{next_window_start, window_end_for_start, WeeklyWindow};
use crate::worker::{EngineContext, Tally};

/// A campaign's arbitration-relevant fields, parsed out of the stored row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CampaignSnapshot {
    pub state: CampaignState,
    pub source: StateSource,
    pub state_updated_at: DateTime<Utc>,
    pub window: CampaignWindow,
}

impl CampaignSnapshot {
    fn of(row: &CampaignRow) -> Option<Self> {
        Some(Self {
            state: row.state.parse().ok()?,
            source: row.state_source.parse().ok()?,
            state_updated_at: row.state_updated_at,
            window: CampaignWindow {
                start_date: row.start_date,
                end_date: row.end_date,
            },
        })
    }
}

/// What one due edge should do, decided from a fresh campaign read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickDecision {
    /// The campaign's end date has passed; expire it and settle its rules.
    ExpireCampaign,
    /// The campaign is already terminal; settle the edge without acting.
    CampaignGone,
    /// The window closed before the engine reached the edge.
    WindowMissed,
    /// An operator changed state after this edge became due; the newer
    /// manual action wins and the edge yields.
    OverriddenByManual,
    /// The campaign is already in the state this action produces.
    AlreadyInState,
    /// The transition is not legal from the current state.
    NotApplicable,
    /// Call the marketplace and flip the state.
    Apply { from: CampaignState, to: CampaignState },
}

/// Decides a due edge. Checks run in severity order: expiry conditions
/// first, then window validity, then override arbitration, then the state
/// machine.
pub(crate) fn plan_outcome(
    campaign: &CampaignSnapshot,
    action: ScheduleAction,
    due_edge: DateTime<Utc>,
    window_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> TickDecision {
    if campaign.state == CampaignState::Expired {
        return TickDecision::CampaignGone;
    }
    if campaign.window.end_date <= now {
        return TickDecision::ExpireCampaign;
    }
    if now >= window_end {
        return TickDecision::WindowMissed;
    }
    if campaign.source == StateSource::Manual && campaign.state_updated_at > due_edge {
        return TickDecision::OverriddenByManual;
    }

    let desired = match action {
        ScheduleAction::Activate => CampaignState::Active,
        ScheduleAction::Pause => CampaignState::Paused,
    };
    if campaign.state == desired {
        return TickDecision::AlreadyInState;
    }

    match next_state(campaign.state, StateEvent::Schedule(action), campaign.window, now) {
        Ok(to) => TickDecision::Apply {
            from: campaign.state,
            to,
        },
        Err(_) => TickDecision::NotApplicable,
    }
}

/// Same-tick conflict arbitration. When one campaign has several due edges
/// with opposing actions, the rule starting earliest in the day (then lowest
/// id) wins; edges carrying the other action are settled untaken. Returns
/// the losing schedule ids.
pub(crate) fn arbitration_losers(due: &[ScheduleRow]) -> HashSet<i64> {
    let mut by_campaign: HashMap<i64, Vec<&ScheduleRow>> = HashMap::new();
    for schedule in due {
        by_campaign
            .entry(schedule.campaign_id)
            .or_default()
            .push(schedule);
    }

    let mut losers = HashSet::new();
    for rules in by_campaign.values() {
        if rules.len() < 2 || rules.iter().all(|r| r.action == rules[0].action) {
            continue;
        }
        let Some(winner) = rules.iter().min_by_key(|r| (r.start_time, r.id)) else {
            continue;
        };
        for rule in rules {
            if rule.action != winner.action {
                losers.insert(rule.id);
            }
        }
    }
    losers
}

/// One schedule tick over every due edge, oldest first.
pub(crate) async fn run_schedule_tick(ctx: &EngineContext) -> Result<Tally, EngineError> {
    let now = ctx.clock.now();
    let deadline = now + ctx.policy.worker_deadline();
    let mut tally = Tally::default();

    // Step 1: the expiry sweep. Campaigns past end_date flip to expired no
    // matter what their rules say, and their rules settle with them.
    let expired = db::expire_due_campaigns(&ctx.pool, now).await?;
    for campaign_id in &expired {
        let settled = db::moot_schedules_for_campaign(&ctx.pool, *campaign_id).await?;
        tracing::info!(campaign_id, settled, "campaign expired by sweep");
    }

    // Step 2: collect due edges and arbitrate same-tick conflicts.
    let due = db::list_due_schedules(&ctx.pool, now).await?;
    if due.is_empty() {
        return Ok(tally);
    }
    let losers = arbitration_losers(&due);
    tracing::info!(
        due = due.len(),
        conflict_losers = losers.len(),
        "processing due schedule edges"
    );

    // Step 3: fire edges one at a time. Each iteration re-reads its
    // campaign immediately before acting, and the loop checkpoints against
    // the deadline between edges, never mid-call.
    for (position, schedule) in due.iter().enumerate() {
        if ctx.clock.now() >= deadline {
            tracing::warn!(
                remaining = due.len() - position,
                "tick stopped at the run deadline; remaining edges stay due"
            );
            break;
        }
        process_edge(ctx, schedule, losers.contains(&schedule.id), &mut tally).await;
    }

    Ok(tally)
}

/// Handles one due edge end to end. Failures here are isolated: they log,
/// count against the run, and leave the other edges alone.
async fn process_edge(
    ctx: &EngineContext,
    schedule: &ScheduleRow,
    conflict_loser: bool,
    tally: &mut Tally,
) {
    let now = ctx.clock.now();

    let campaign = match db::get_campaign(&ctx.pool, schedule.campaign_id).await {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(schedule_id = schedule.id, campaign_id = schedule.campaign_id, error = %e, "campaign re-read failed; edge left for next tick");
            tally.failed += 1;
            return;
        }
    };

    let Some(snapshot) = CampaignSnapshot::of(&campaign) else {
        tracing::error!(schedule_id = schedule.id, campaign_id = campaign.id, state = %campaign.state, "stored campaign state does not parse; edge skipped");
        tally.failed += 1;
        return;
    };
    let Ok(action) = schedule.action.parse::<ScheduleAction>() else {
        tracing::error!(schedule_id = schedule.id, action = %schedule.action, "stored schedule action does not parse; edge skipped");
        tally.failed += 1;
        return;
    };
    let Ok(tz) = campaign.timezone.parse::<Tz>() else {
        tracing::error!(campaign_id = campaign.id, timezone = %campaign.timezone, "stored timezone does not parse; edge skipped");
        tally.failed += 1;
        return;
    };
    let weekly = match validate::weekday_from_index(schedule.day_of_week) {
        Ok(day_of_week) => WeeklyWindow {
            day_of_week,
            start_time: schedule.start_time,
            end_time: schedule.end_time,
        },
        Err(e) => {
            tracing::error!(schedule_id = schedule.id, error = %e, "stored day of week does not parse; edge skipped");
            tally.failed += 1;
            return;
        }
    };

    let window_end = window_end_for_start(&weekly, tz, schedule.next_execution);
    let next_edge = next_window_start(&weekly, tz, now);

    if conflict_loser {
        tracing::warn!(
            schedule_id = schedule.id,
            campaign_id = campaign.id,
            action = %action,
            "edge lost same-tick conflict arbitration; settled untaken"
        );
        if settle_untaken(ctx, schedule.id, next_edge).await {
            tally.processed += 1;
        } else {
            tally.failed += 1;
        }
        return;
    }

    match plan_outcome(&snapshot, action, schedule.next_execution, window_end, now) {
        TickDecision::CampaignGone => {
            tracing::debug!(schedule_id = schedule.id, campaign_id = campaign.id, "campaign already expired; edge settled");
            if settle_untaken(ctx, schedule.id, next_edge).await {
                tally.processed += 1;
            } else {
                tally.failed += 1;
            }
        }
        TickDecision::ExpireCampaign => {
            expire_mid_scan(ctx, &campaign, &snapshot, now, tally).await;
        }
        TickDecision::WindowMissed => {
            tracing::warn!(
                schedule_id = schedule.id,
                campaign_id = campaign.id,
                due_edge = %schedule.next_execution,
                window_end = %window_end,
                "window closed before the edge could run; resuming next week"
            );
            if settle_untaken(ctx, schedule.id, next_edge).await {
                tally.processed += 1;
            } else {
                tally.failed += 1;
            }
        }
        TickDecision::OverriddenByManual => {
            tracing::info!(
                schedule_id = schedule.id,
                campaign_id = campaign.id,
                overridden_at = %snapshot.state_updated_at,
                "manual override is newer than the due edge; edge yields"
            );
            if settle_untaken(ctx, schedule.id, next_edge).await {
                tally.processed += 1;
            } else {
                tally.failed += 1;
            }
        }
        TickDecision::AlreadyInState => {
            tracing::debug!(
                schedule_id = schedule.id,
                campaign_id = campaign.id,
                state = %snapshot.state,
                "campaign already in the target state; edge settled without a call"
            );
            match db::mark_schedule_executed(&ctx.pool, schedule.id, now, next_edge).await {
                Ok(()) => tally.processed += 1,
                Err(e) => {
                    tracing::error!(schedule_id = schedule.id, error = %e, "could not settle edge");
                    tally.failed += 1;
                }
            }
        }
        TickDecision::NotApplicable => {
            tracing::warn!(
                schedule_id = schedule.id,
                campaign_id = campaign.id,
                state = %snapshot.state,
                action = %action,
                "action is not applicable to the campaign's current state; edge settled untaken"
            );
            if settle_untaken(ctx, schedule.id, next_edge).await {
                tally.processed += 1;
            } else {
                tally.failed += 1;
            }
        }
        TickDecision::Apply { from, to } => {
            apply_edge(ctx, &campaign, schedule, action, from, to, now, next_edge, tally).await;
        }
    }
}

/// Expires a campaign that crossed its end date between the sweep and this
/// edge, settling every rule it owns.
async fn expire_mid_scan(
    ctx: &EngineContext,
    campaign: &CampaignRow,
    snapshot: &CampaignSnapshot,
    now: DateTime<Utc>,
    tally: &mut Tally,
) {
    let flipped = match db::set_campaign_state(
        &ctx.pool,
        campaign.id,
        CampaignState::Expired.as_str(),
        StateSource::System.as_str(),
        snapshot.state.as_str(),
        now,
    )
    .await
    {
        Ok(flipped) => flipped,
        Err(e) => {
            tracing::error!(campaign_id = campaign.id, error = %e, "mid-scan expiry write failed");
            tally.failed += 1;
            return;
        }
    };

    if !flipped {
        // Someone else changed state first; the next tick re-evaluates.
        tracing::warn!(campaign_id = campaign.id, "mid-scan expiry lost a concurrent state change; edge left for next tick");
        tally.failed += 1;
        return;
    }

    match db::moot_schedules_for_campaign(&ctx.pool, campaign.id).await {
        Ok(settled) => {
            tracing::info!(campaign_id = campaign.id, settled, "campaign expired mid-scan; rules settled");
            tally.processed += 1;
        }
        Err(e) => {
            tracing::error!(campaign_id = campaign.id, error = %e, "could not settle rules after mid-scan expiry");
            tally.failed += 1;
        }
    }
}

/// Fires the marketplace call for an applicable edge and records the result.
#[allow(clippy::too_many_arguments)]
async fn apply_edge(
    ctx: &EngineContext,
    campaign: &CampaignRow,
    schedule: &ScheduleRow,
    action: ScheduleAction,
    from: CampaignState,
    to: CampaignState,
    now: DateTime<Utc>,
    next_edge: DateTime<Utc>,
    tally: &mut Tally,
) {
    let result = match action {
        ScheduleAction::Activate => {
            let Some(discount_percentage) = campaign.discount_percentage.to_f64() else {
                tracing::error!(campaign_id = campaign.id, discount = %campaign.discount_percentage, "discount does not convert for the wire; edge will retry");
                record_call_failure(
                    ctx,
                    schedule,
                    next_edge,
                    &MarketError::Api {
                        code: "invalid_discount".to_owned(),
                        message: "discount percentage not representable".to_owned(),
                    },
                    tally,
                )
                .await;
                return;
            };
            let request = ActivatePromotion {
                discount_percentage,
                campaign_ref: campaign.public_id.to_string(),
                end_date: campaign.end_date,
            };
            ctx.market.activate_promotion(&campaign.item_id, &request).await
        }
        ScheduleAction::Pause => ctx.market.pause_promotion(&campaign.item_id).await,
    };

    match result {
        Ok(_ack) => {
            match db::set_campaign_state(
                &ctx.pool,
                campaign.id,
                to.as_str(),
                StateSource::Schedule.as_str(),
                from.as_str(),
                now,
            )
            .await
            {
                Ok(true) => {}
                Ok(false) => {
                    // The optimistic write lost to a concurrent change. The
                    // marketplace call already happened (idempotent), so the
                    // edge still settles; the newer state stands.
                    tracing::warn!(
                        campaign_id = campaign.id,
                        schedule_id = schedule.id,
                        "state changed concurrently after the marketplace call; keeping the newer state"
                    );
                }
                Err(e) => {
                    tracing::error!(campaign_id = campaign.id, schedule_id = schedule.id, error = %e, "state write failed after the marketplace call; edge will retry");
                    record_call_failure(
                        ctx,
                        schedule,
                        next_edge,
                        &MarketError::Api {
                            code: "state_write_failed".to_owned(),
                            message: e.to_string(),
                        },
                        tally,
                    )
                    .await;
                    return;
                }
            }

            match db::mark_schedule_executed(&ctx.pool, schedule.id, now, next_edge).await {
                Ok(()) => {
                    tally.processed += 1;
                    tracing::info!(
                        campaign_id = campaign.id,
                        schedule_id = schedule.id,
                        action = %action,
                        from = %from,
                        to = %to,
                        next_edge = %next_edge,
                        "schedule edge executed"
                    );
                }
                Err(e) => {
                    tracing::error!(schedule_id = schedule.id, error = %e, "edge executed but not recorded; it may refire next tick");
                    tally.failed += 1;
                }
            }
        }
        Err(e) => record_call_failure(ctx, schedule, next_edge, &e, tally).await,
    }
}

/// Books a failed attempt against the edge: bounded retry for transient
/// trouble, immediate escalation for rejected credentials, and an alert
/// once the retry budget is spent.
async fn record_call_failure(
    ctx: &EngineContext,
    schedule: &ScheduleRow,
    next_edge: DateTime<Utc>,
    error: &MarketError,
    tally: &mut Tally,
) {
    tally.failed += 1;

    if matches!(error, MarketError::Auth { .. }) {
        tracing::error!(
            schedule_id = schedule.id,
            campaign_id = schedule.campaign_id,
            error = %error,
            "marketplace rejected credentials; escalating the edge without retry"
        );
        if let Err(db_err) = db::mark_schedule_escalated(&ctx.pool, schedule.id, next_edge).await {
            tracing::error!(schedule_id = schedule.id, error = %db_err, "could not record escalation");
        }
        return;
    }

    match db::mark_schedule_failed(&ctx.pool, schedule.id).await {
        Ok(failures) if failures >= ctx.policy.schedule_max_failures => {
            tracing::error!(
                schedule_id = schedule.id,
                campaign_id = schedule.campaign_id,
                failures,
                error = %error,
                "edge abandoned after repeated failures; operator attention needed"
            );
            if let Err(db_err) =
                db::mark_schedule_escalated(&ctx.pool, schedule.id, next_edge).await
            {
                tracing::error!(schedule_id = schedule.id, error = %db_err, "could not record escalation");
            }
        }
        Ok(failures) => {
            tracing::warn!(
                schedule_id = schedule.id,
                campaign_id = schedule.campaign_id,
                failures,
                error = %error,
                "marketplace call failed; the same edge retries next tick"
            );
        }
        Err(db_err) => {
            tracing::error!(schedule_id = schedule.id, error = %db_err, "could not record schedule failure");
        }
    }
}

/// Settles an edge that fires no action, advancing it to the next weekly
/// occurrence. Returns whether the write stuck.
async fn settle_untaken(ctx: &EngineContext, schedule_id: i64, next_edge: DateTime<Utc>) -> bool {
    match db::mark_schedule_moot(&ctx.pool, schedule_id, next_edge).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(schedule_id, error = %e, "could not settle schedule edge");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn utc(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, mi, 0).unwrap()
    }

    fn june_campaign(state: CampaignState) -> CampaignSnapshot {
        CampaignSnapshot {
            state,
            source: StateSource::System,
            state_updated_at: utc(1, 0, 0),
            window: CampaignWindow {
                start_date: utc(1, 0, 0),
                end_date: utc(30, 0, 0),
            },
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn due_row(id: i64, campaign_id: i64, action: &str, start: NaiveTime) -> ScheduleRow {
        ScheduleRow {
            id,
            campaign_id,
            day_of_week: 0,
            start_time: start,
            end_time: t(23, 0),
            action: action.to_owned(),
            status: "pending".to_owned(),
            failure_count: 0,
            last_executed: None,
            next_execution: utc(2, 9, 0),
            created_at: utc(1, 0, 0),
            updated_at: utc(1, 0, 0),
        }
    }

    // ========================================================================
    // plan_outcome
    // ========================================================================

    #[test]
    fn expired_campaign_settles_the_edge_quietly() {
        let decision = plan_outcome(
            &june_campaign(CampaignState::Expired),
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::CampaignGone);
    }

    #[test]
    fn campaign_past_end_date_expires_before_anything_fires() {
        let mut campaign = june_campaign(CampaignState::Active);
        campaign.window.end_date = utc(2, 8, 0);
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Pause,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::ExpireCampaign);
    }

    #[test]
    fn edge_reached_after_its_window_closed_is_missed() {
        let decision = plan_outcome(
            &june_campaign(CampaignState::Scheduled),
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 18, 0), // exactly at window end
        );
        assert_eq!(decision, TickDecision::WindowMissed);
    }

    #[test]
    fn manual_override_newer_than_the_edge_wins() {
        let mut campaign = june_campaign(CampaignState::Paused);
        campaign.source = StateSource::Manual;
        campaign.state_updated_at = utc(2, 9, 30); // after the 09:00 edge
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::OverriddenByManual);
    }

    #[test]
    fn schedules_retake_control_once_their_window_is_newer() {
        // The operator paused on Sunday; Monday's activate edge proceeds.
        let mut campaign = june_campaign(CampaignState::Paused);
        campaign.source = StateSource::Manual;
        campaign.state_updated_at = utc(1, 15, 0); // before the Monday edge
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(
            decision,
            TickDecision::Apply {
                from: CampaignState::Paused,
                to: CampaignState::Active
            }
        );
    }

    #[test]
    fn activating_an_already_active_campaign_is_a_no_op() {
        let decision = plan_outcome(
            &june_campaign(CampaignState::Active),
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::AlreadyInState);
    }

    #[test]
    fn pausing_a_never_activated_campaign_is_not_applicable() {
        let decision = plan_outcome(
            &june_campaign(CampaignState::Scheduled),
            ScheduleAction::Pause,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::NotApplicable);
    }

    #[test]
    fn activate_before_the_campaign_window_opens_is_not_applicable() {
        let mut campaign = june_campaign(CampaignState::Scheduled);
        campaign.window.start_date = utc(20, 0, 0);
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(decision, TickDecision::NotApplicable);
    }

    #[test]
    fn activate_and_pause_follow_the_state_machine() {
        let decision = plan_outcome(
            &june_campaign(CampaignState::Scheduled),
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(
            decision,
            TickDecision::Apply {
                from: CampaignState::Scheduled,
                to: CampaignState::Active
            }
        );

        let decision = plan_outcome(
            &june_campaign(CampaignState::Active),
            ScheduleAction::Pause,
            utc(2, 18, 0),
            utc(2, 23, 59),
            utc(2, 18, 1),
        );
        assert_eq!(
            decision,
            TickDecision::Apply {
                from: CampaignState::Active,
                to: CampaignState::Paused
            }
        );
    }

    #[test]
    fn monday_business_hours_week_plays_out() {
        // Activate 09:00-18:00, pause 18:00-midnight, nothing on Tuesday.
        let mut campaign = june_campaign(CampaignState::Scheduled);

        // Monday 10:00: the activate edge applies.
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Activate,
            utc(2, 9, 0),
            utc(2, 18, 0),
            utc(2, 10, 0),
        );
        assert_eq!(
            decision,
            TickDecision::Apply {
                from: CampaignState::Scheduled,
                to: CampaignState::Active
            }
        );
        campaign.state = CampaignState::Active;
        campaign.source = StateSource::Schedule;
        campaign.state_updated_at = utc(2, 10, 0);

        // Monday 18:01: the pause edge applies.
        let decision = plan_outcome(
            &campaign,
            ScheduleAction::Pause,
            utc(2, 18, 0),
            utc(2, 23, 59),
            utc(2, 18, 1),
        );
        assert_eq!(
            decision,
            TickDecision::Apply {
                from: CampaignState::Active,
                to: CampaignState::Paused
            }
        );
        // Tuesday: both edges advanced to next Monday, so nothing is due
        // and the campaign stays paused.
    }

    // ========================================================================
    // Conflict arbitration
    // ========================================================================

    #[test]
    fn opposing_due_edges_lose_to_the_earliest_start_time() {
        let due = vec![
            due_row(1, 77, "activate", t(9, 0)),
            due_row(2, 77, "pause", t(10, 0)),
        ];
        let losers = arbitration_losers(&due);
        assert_eq!(losers, HashSet::from([2]));
    }

    #[test]
    fn same_action_edges_do_not_conflict() {
        let due = vec![
            due_row(1, 77, "activate", t(9, 0)),
            due_row(2, 77, "activate", t(10, 0)),
        ];
        assert!(arbitration_losers(&due).is_empty());
    }

    #[test]
    fn conflicts_are_scoped_per_campaign() {
        let due = vec![
            due_row(1, 77, "activate", t(9, 0)),
            due_row(2, 88, "pause", t(10, 0)),
        ];
        assert!(arbitration_losers(&due).is_empty());
    }

    #[test]
    fn all_edges_with_the_losing_action_yield() {
        let due = vec![
            due_row(1, 77, "pause", t(8, 0)),
            due_row(2, 77, "activate", t(9, 0)),
            due_row(3, 77, "activate", t(11, 0)),
        ];
        let losers = arbitration_losers(&due);
        assert_eq!(losers, HashSet::from([2, 3]));
    }

    #[test]
    fn start_time_tie_breaks_on_schedule_id() {
        let due = vec![
            due_row(5, 77, "pause", t(9, 0)),
            due_row(3, 77, "activate", t(9, 0)),
        ];
        // Same start time: id 3 wins, so the pause edge yields.
        let losers = arbitration_losers(&due);
        assert_eq!(losers, HashSet::from([5]));
    }
}
