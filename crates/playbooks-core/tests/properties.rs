//! Property tests for the timestamp cascade, item moves, idempotent
//! transitions, resolution derivation, filter validation and reminder
//! delays.

use playbooks_core::checklist::{Checklist, ChecklistItem};
use playbooks_core::clock::{Clock, ManualClock, SystemClock};
use playbooks_core::filter::PlaybookRunFilterOptions;
use playbooks_core::mutation::{self, ItemEdit, Stamp};
use playbooks_core::run::{PlaybookRun, StatusPost};
use playbooks_core::service::reminder_at;
use playbooks_core::task_action::{Action, TaskAction, Trigger};
use playbooks_core::types::{ChecklistItemState, RunStatus};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Between one and four checklists, each with one to five items.
fn checklist_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=5, 1..=4)
}

fn build(sizes: &[usize]) -> Vec<Checklist> {
    sizes
        .iter()
        .enumerate()
        .map(|(c, &n)| {
            let mut checklist = Checklist::new(format!("list {c}"));
            checklist.id = format!("c{c}");
            checklist.update_at = 1;
            for i in 0..n {
                let mut item = ChecklistItem::new(format!("item {c}.{i}"));
                item.id = format!("i{c}.{i}");
                item.update_at = 1;
                item.state_modified = 1;
                checklist.items.push(item);
            }
            checklist
        })
        .collect()
}

/// A (checklist, item) pair valid for `sizes`.
fn target(sizes: &[usize], c: usize, i: usize) -> (usize, usize) {
    let c = c % sizes.len();
    (c, i % sizes[c])
}

fn any_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Reported),
        Just(RunStatus::Active),
        Just(RunStatus::InProgress),
        Just(RunStatus::Finished),
        Just(RunStatus::Resolved),
        Just(RunStatus::Archived),
    ]
}

/// Apply mutation `kind` to item (c, i) and return true if it stamps the
/// item itself (removal only stamps the checklist).
fn apply(kind: u8, lists: &mut Vec<Checklist>, c: usize, i: usize, stamp: Stamp<'_>) -> bool {
    match kind % 8 {
        0 => {
            mutation::edit_checklist_item(lists, c, i, ItemEdit::rename("renamed"), stamp).unwrap();
            true
        }
        1 => {
            mutation::add_checklist_item(lists, c, ChecklistItem::new("new"), stamp).unwrap();
            true
        }
        2 => {
            mutation::remove_checklist_item(lists, c, i, stamp).unwrap();
            false
        }
        3 => {
            mutation::modify_checked_state(lists, c, i, ChecklistItemState::Closed, stamp).unwrap();
            true
        }
        4 => {
            mutation::set_assignee(lists, c, i, "someone", stamp).unwrap();
            true
        }
        5 => {
            mutation::set_command(lists, c, i, "/echo hi", stamp).unwrap();
            true
        }
        6 => {
            mutation::set_due_date(lists, c, i, 42, stamp).unwrap();
            true
        }
        _ => {
            let actions = vec![TaskAction::new(Trigger::new("t", "{}"), vec![Action::new("a", "{}")])];
            mutation::set_task_actions(lists, c, i, actions, stamp).unwrap();
            true
        }
    }
}

/// The item a mutation touched: the appended one for adds, else (c, i).
fn touched(kind: u8, lists: &[Checklist], c: usize, i: usize) -> &ChecklistItem {
    if kind % 8 == 1 {
        lists[c].items.last().unwrap()
    } else {
        &lists[c].items[i]
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn explicit_timestamp_reaches_item_and_checklist(
        sizes in checklist_sizes(),
        c in 0usize..8,
        i in 0usize..8,
        kind in 0u8..8,
        ts in 2i64..i64::MAX / 2,
    ) {
        let mut lists = build(&sizes);
        let (c, i) = target(&sizes, c, i);
        let clock = ManualClock::new(7);
        let stamps_item = apply(kind, &mut lists, c, i, Stamp::at(ts, &clock));

        prop_assert_eq!(lists[c].update_at, ts);
        if stamps_item {
            prop_assert_eq!(touched(kind, &lists, c, i).update_at, ts);
        }
        // Other checklists are untouched.
        for (other, list) in lists.iter().enumerate() {
            if other != c {
                prop_assert_eq!(list.update_at, 1);
            }
        }
        prop_assert_eq!(clock.peek(), 7);
    }

    #[test]
    fn zero_timestamp_reads_clock_once(
        sizes in checklist_sizes(),
        c in 0usize..8,
        i in 0usize..8,
        kind in 0u8..8,
    ) {
        let mut lists = build(&sizes);
        let (c, i) = target(&sizes, c, i);
        let before = SystemClock.now_millis();
        let stamps_item = apply(kind, &mut lists, c, i, Stamp::now(&SystemClock));
        let after = SystemClock.now_millis();

        let checklist_ts = lists[c].update_at;
        prop_assert!(checklist_ts >= before && checklist_ts <= after);
        if stamps_item {
            prop_assert_eq!(touched(kind, &lists, c, i).update_at, checklist_ts);
        }
    }

    #[test]
    fn ticking_clock_still_gives_equal_stamps(
        sizes in checklist_sizes(),
        c in 0usize..8,
        i in 0usize..8,
        kind in prop_oneof![Just(0u8), Just(3u8), Just(4u8), Just(5u8), Just(6u8), Just(7u8)],
    ) {
        let mut lists = build(&sizes);
        let (c, i) = target(&sizes, c, i);
        let clock = ManualClock::ticking(1_000, 1);
        apply(kind, &mut lists, c, i, Stamp::now(&clock));
        prop_assert_eq!(lists[c].update_at, 1_000);
        prop_assert_eq!(lists[c].items[i].update_at, 1_000);
        prop_assert_eq!(clock.peek(), 1_001);
    }
}

// ---------------------------------------------------------------------------
// Moves and idempotence
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn moving_never_modifies_items(
        sizes in checklist_sizes(),
        src in (0usize..8, 0usize..8),
        dest in (0usize..8, 0usize..8),
        ts in 2i64..1_000_000,
    ) {
        let mut lists = build(&sizes);
        let (sc, si) = target(&sizes, src.0, src.1);
        let dc = dest.0 % sizes.len();
        let dest_len = if dc == sc { sizes[dc] } else { sizes[dc] + 1 };
        let di = dest.1 % dest_len;

        let snapshot: Vec<ChecklistItem> = lists.iter().flat_map(|l| l.items.clone()).collect();
        let clock = ManualClock::new(0);
        mutation::move_checklist_item(&mut lists, sc, si, dc, di, Stamp::at(ts, &clock)).unwrap();

        let moved_id = format!("i{sc}.{si}");
        prop_assert_eq!(&lists[dc].items[di].id, &moved_id);
        for item in lists.iter().flat_map(|l| &l.items) {
            let original = snapshot.iter().find(|s| s.id == item.id).unwrap();
            prop_assert_eq!(item, original);
        }
        let total: usize = lists.iter().map(|l| l.items.len()).sum();
        prop_assert_eq!(total, snapshot.len());
        prop_assert_eq!(lists[sc].update_at, ts);
        prop_assert_eq!(lists[dc].update_at, ts);
    }

    #[test]
    fn repeating_a_transition_changes_nothing(
        sizes in checklist_sizes(),
        c in 0usize..8,
        i in 0usize..8,
        state in prop_oneof![Just(ChecklistItemState::InProgress), Just(ChecklistItemState::Closed)],
        first in 2i64..1_000,
        second in 1_000i64..2_000,
    ) {
        let mut lists = build(&sizes);
        let (c, i) = target(&sizes, c, i);
        let clock = ManualClock::new(0);

        mutation::modify_checked_state(&mut lists, c, i, state, Stamp::at(first, &clock)).unwrap();
        mutation::set_assignee(&mut lists, c, i, "alice", Stamp::at(first, &clock)).unwrap();
        let after_first = lists.clone();

        let s = mutation::modify_checked_state(&mut lists, c, i, state, Stamp::at(second, &clock)).unwrap();
        let a = mutation::set_assignee(&mut lists, c, i, "alice", Stamp::at(second, &clock)).unwrap();
        prop_assert!(!s.is_applied());
        prop_assert!(!a.is_applied());
        prop_assert_eq!(lists, after_first);
    }

    #[test]
    fn out_of_range_is_an_error_not_a_panic(
        sizes in checklist_sizes(),
        c in 0usize..10,
        i in 0usize..10,
    ) {
        let mut lists = build(&sizes);
        let clock = ManualClock::new(5);
        let valid = c < sizes.len() && i < sizes[c];
        let result = mutation::set_due_date(&mut lists, c, i, 9, Stamp::now(&clock));
        prop_assert_eq!(result.is_ok(), valid);
        if !valid {
            prop_assert!(result.unwrap_err().is_not_found());
            prop_assert_eq!(lists, build(&sizes));
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution derivation
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn later_activity_undoes_resolution(
        history in prop::collection::vec((any_status(), any::<bool>()), 0..8),
        active in prop_oneof![
            Just(RunStatus::Reported),
            Just(RunStatus::Active),
            Just(RunStatus::InProgress),
            Just(RunStatus::Finished),
        ],
    ) {
        let mut run = PlaybookRun::default();
        for (n, (status, deleted)) in history.iter().enumerate() {
            let mut post = StatusPost::new(*status, 10 + n as i64);
            if *deleted {
                post.delete_at = 1;
            }
            run.status_posts.push(post);
        }
        run.status_posts.push(StatusPost::new(active, 1_000));
        prop_assert_eq!(run.resolved_at(), 0);

        run.status_posts.push(StatusPost::new(RunStatus::Resolved, 2_000));
        prop_assert_eq!(run.resolved_at(), 2_000);

        let mut deleted = StatusPost::new(RunStatus::Active, 2_500);
        deleted.delete_at = 1;
        run.status_posts.push(deleted);
        run.status_posts.push(StatusPost::new(RunStatus::Archived, 3_000));
        prop_assert_eq!(run.resolved_at(), 2_000);
    }

    #[test]
    fn derivation_is_pure(
        history in prop::collection::vec(any_status(), 0..8),
    ) {
        let mut run = PlaybookRun::default();
        for (n, status) in history.iter().enumerate() {
            run.status_posts.push(StatusPost::new(*status, 10 + n as i64));
        }
        let snapshot = run.clone();
        let first = run.resolved_at();
        prop_assert_eq!(run.resolved_at(), first);
        prop_assert_eq!(run, snapshot);
    }
}

// ---------------------------------------------------------------------------
// Filter validation
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn validate_never_mutates_input(
        per_page in -1_000i64..1_000,
        sort in prop_oneof![Just(""), Just("NAME"), Just("end_at"), Just("bogus")],
        direction in prop_oneof![Just(""), Just("desc"), Just("ASC"), Just("sideways")],
        gte in -100i64..100,
    ) {
        let opts = PlaybookRunFilterOptions {
            per_page,
            sort: sort.to_string(),
            direction: direction.to_string(),
            active_gte: gte,
            statuses: vec!["Active".to_string()],
            ..Default::default()
        };
        let copy = opts.clone();
        let result = opts.validate();
        prop_assert_eq!(&opts, &copy);

        let bad = sort == "bogus" || direction == "sideways";
        prop_assert_eq!(result.is_err(), bad);
        if let Ok(v) = result {
            prop_assert!(v.per_page > 0);
            if per_page <= 0 {
                prop_assert_eq!(v.per_page, 1000);
            }
            prop_assert!(v.active_gte >= 0);
            prop_assert_eq!(v.sort.clone(), v.sort.to_lowercase());
            prop_assert_eq!(v.direction.clone(), v.direction.to_uppercase());
        }
    }

    #[test]
    fn reminder_delays_never_wrap(now in 0i64..=i64::MAX, seconds in any::<i64>()) {
        let exact = i128::from(now) + i128::from(seconds) * 1000;
        match reminder_at(now, seconds) {
            Ok(at) => {
                prop_assert!(seconds >= 0);
                prop_assert!(at >= now);
                prop_assert_eq!(i128::from(at), exact);
            }
            Err(_) => prop_assert!(seconds < 0 || exact > i128::from(i64::MAX)),
        }
    }
}
